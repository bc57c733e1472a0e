use thiserror::Error;

/// Main error type for the vigil supervisor
#[derive(Debug, Error)]
pub enum VigilError {
    // Workload lifecycle errors
    #[error("Workload exited immediately after launch: {0}")]
    StartError(String),

    #[error("Failed to launch workload: {0}")]
    SpawnError(String),

    #[error("Graceful termination exceeded {0}s")]
    TerminationTimeout(u64),

    #[error("Process state could not be determined: {0}")]
    LivenessAmbiguous(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    // Health and policy
    #[error("Resource sample unavailable: {0}")]
    ResourceSampleUnavailable(String),

    #[error("Restart budget exhausted: {0} restarts within window")]
    RestartBudgetExhausted(usize),

    // Startup prerequisites
    #[error("Missing prerequisite: {0}")]
    Prerequisite(String),

    #[error("Supervisor already running (PID {0})")]
    AlreadyRunning(u32),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Persisted state
    #[error("State error: {0}")]
    StateError(String),

    // Log access
    #[error("Log error: {0}")]
    LogError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("{0}")]
    Other(String),
}

impl VigilError {
    /// Whether the error means the supervisor cannot run at all
    pub fn is_prerequisite(&self) -> bool {
        matches!(
            self,
            VigilError::Prerequisite(_)
                | VigilError::ConfigError(_)
                | VigilError::InvalidConfig(_)
                | VigilError::ConfigValidationError(_)
        )
    }
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;
