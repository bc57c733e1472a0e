use crate::error::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "vigil.toml";

/// Complete supervisor configuration, built once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    pub workload: WorkloadConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub termination: TerminationConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// How to launch and recognise the supervised workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Human-readable workload name
    pub name: String,

    /// Executable that starts the workload
    pub launcher: PathBuf,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the workload
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Environment variables handed to the launcher
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Command-line substring identifying the workload in the process table.
    /// Defaults to the launcher file name.
    #[serde(default)]
    pub identity: Option<String>,

    /// Patterns for auxiliary processes the workload forks
    #[serde(default)]
    pub aux_patterns: Vec<String>,

    /// Optional script sourced before the launcher runs
    #[serde(default)]
    pub activate: Option<PathBuf>,
}

/// Health evaluation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Fixed polling interval for every check (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// A log untouched for longer than this is considered hung (in seconds)
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Number of trailing log lines scanned for failure markers
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// System-wide CPU usage percentage above which ticks are skipped
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f32,

    /// System-wide memory usage percentage above which ticks are skipped
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f32,

    /// Additional workload output logs to watch
    #[serde(default)]
    pub logs: Vec<PathBuf>,
}

/// Restart rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum restarts within the window before cooldown
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,

    /// Sliding window for counting restarts (in seconds)
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Pause after the budget is exhausted (in seconds)
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Warm-up period during which only death triggers a restart (in seconds)
    #[serde(default = "default_stable_run")]
    pub stable_run_secs: u64,
}

/// Start confirmation and two-phase stop timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationConfig {
    #[serde(default = "default_grace")]
    pub grace_secs: u64,

    #[serde(default = "default_force")]
    pub force_secs: u64,

    #[serde(default = "default_settle")]
    pub settle_secs: u64,

    /// How long to wait after launch before confirming the workload is up
    #[serde(default = "default_start_confirm")]
    pub start_confirm_secs: u64,
}

/// On-disk locations for persisted state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

// Default value functions for serde
fn default_poll_interval() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    300
}

fn default_tail_lines() -> usize {
    50
}

fn default_cpu_threshold() -> f32 {
    90.0
}

fn default_memory_threshold() -> f32 {
    90.0
}

fn default_max_restarts() -> usize {
    5
}

fn default_window() -> u64 {
    3600
}

fn default_cooldown() -> u64 {
    1800
}

fn default_stable_run() -> u64 {
    600
}

fn default_grace() -> u64 {
    30
}

fn default_force() -> u64 {
    10
}

fn default_settle() -> u64 {
    2
}

fn default_start_confirm() -> u64 {
    5
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/tmp/vigil")
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            stale_after_secs: default_stale_after(),
            tail_lines: default_tail_lines(),
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            logs: Vec::new(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            window_secs: default_window(),
            cooldown_secs: default_cooldown(),
            stable_run_secs: default_stable_run(),
        }
    }
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace(),
            force_secs: default_force(),
            settle_secs: default_settle(),
            start_confirm_secs: default_start_confirm(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl VigilConfig {
    /// Build a configuration for a launcher with every other setting defaulted
    pub fn for_launcher(name: &str, launcher: impl Into<PathBuf>) -> Self {
        Self {
            workload: WorkloadConfig {
                name: name.to_string(),
                launcher: launcher.into(),
                args: Vec::new(),
                cwd: None,
                env: HashMap::new(),
                identity: None,
                aux_patterns: Vec::new(),
                activate: None,
            },
            health: HealthConfig::default(),
            policy: PolicyConfig::default(),
            termination: TerminationConfig::default(),
            paths: PathsConfig::default(),
        }
    }

    /// Load the configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<VigilConfig> {
        if !path.exists() {
            return Err(VigilError::Prerequisite(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| VigilError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(VigilError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<VigilConfig> {
        toml::from_str(contents)
            .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<VigilConfig> {
        serde_json::from_str(contents)
            .map_err(|e| VigilError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration values (not the presence of files)
    pub fn validate(&self) -> Result<()> {
        if self.workload.name.is_empty() {
            return Err(VigilError::ConfigValidationError(
                "workload.name must not be empty".to_string(),
            ));
        }

        if self.workload.launcher.as_os_str().is_empty() {
            return Err(VigilError::ConfigValidationError(
                "workload.launcher must not be empty".to_string(),
            ));
        }

        let identity = self.identity();
        if identity.trim().is_empty() {
            return Err(VigilError::ConfigValidationError(
                "workload.identity must not be empty".to_string(),
            ));
        }
        if is_generic_program(&identity) {
            return Err(VigilError::ConfigValidationError(format!(
                "workload.identity '{}' would match unrelated processes; \
                 set it to something specific to this workload, e.g. \"python train.py\"",
                identity.trim()
            )));
        }

        if self.workload.aux_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(VigilError::ConfigValidationError(
                "workload.aux_patterns must not contain empty patterns".to_string(),
            ));
        }

        if self.health.poll_interval_secs == 0 {
            return Err(VigilError::ConfigValidationError(
                "health.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        if self.health.tail_lines == 0 {
            return Err(VigilError::ConfigValidationError(
                "health.tail_lines must be at least 1".to_string(),
            ));
        }

        for (field, value) in [
            ("health.cpu_threshold", self.health.cpu_threshold),
            ("health.memory_threshold", self.health.memory_threshold),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(VigilError::ConfigValidationError(format!(
                    "{} must be within (0, 100], got {}",
                    field, value
                )));
            }
        }

        if self.policy.max_restarts == 0 {
            return Err(VigilError::ConfigValidationError(
                "policy.max_restarts must be at least 1".to_string(),
            ));
        }

        if self.policy.window_secs == 0 {
            return Err(VigilError::ConfigValidationError(
                "policy.window_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Check that the files the workload needs are actually present
    pub fn check_prerequisites(&self) -> Result<()> {
        if !self.workload.launcher.exists() {
            return Err(VigilError::Prerequisite(format!(
                "launcher not found: {}",
                self.workload.launcher.display()
            )));
        }

        if let Some(ref cwd) = self.workload.cwd {
            if !cwd.is_dir() {
                return Err(VigilError::Prerequisite(format!(
                    "working directory not found: {}",
                    cwd.display()
                )));
            }
        }

        Ok(())
    }

    /// Expand environment variables in configuration fields
    fn expand_env_vars(&mut self) {
        let workload = &mut self.workload;
        workload.launcher = expand_env_in_path(&workload.launcher);
        workload.cwd = workload.cwd.as_deref().map(expand_env_in_path);
        workload.activate = workload.activate.as_deref().map(expand_env_in_path);
        workload.args = workload
            .args
            .iter()
            .map(|arg| expand_env_in_string(arg))
            .collect();
        workload.env = workload
            .env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_in_string(v)))
            .collect();

        self.health.logs = self
            .health
            .logs
            .iter()
            .map(|p| expand_env_in_path(p))
            .collect();
        self.paths.state_dir = expand_env_in_path(&self.paths.state_dir);
    }

    /// Pattern that identifies the workload in the process table
    pub fn identity(&self) -> String {
        match self.workload.identity {
            Some(ref identity) => identity.clone(),
            None => self
                .workload
                .launcher
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Every log the health evaluator watches, own output log first
    pub fn watched_logs(&self) -> Vec<PathBuf> {
        let mut logs = vec![self.workload_log_path()];
        for log in &self.health.logs {
            if !logs.contains(log) {
                logs.push(log.clone());
            }
        }
        logs
    }

    pub fn workload_pid_path(&self) -> PathBuf {
        self.paths.state_dir.join("workload.pid")
    }

    pub fn supervisor_pid_path(&self) -> PathBuf {
        self.paths.state_dir.join("supervisor.pid")
    }

    pub fn history_path(&self) -> PathBuf {
        self.paths.state_dir.join("restarts.log")
    }

    pub fn monitor_log_path(&self) -> PathBuf {
        self.paths.state_dir.join("monitor.log")
    }

    pub fn workload_log_path(&self) -> PathBuf {
        self.paths.state_dir.join("workload.log")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.health.poll_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.health.stale_after_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.policy.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.policy.cooldown_secs)
    }

    pub fn stable_run_time(&self) -> Duration {
        Duration::from_secs(self.policy.stable_run_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.termination.grace_secs)
    }

    pub fn force(&self) -> Duration {
        Duration::from_secs(self.termination.force_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.termination.settle_secs)
    }

    pub fn start_confirm(&self) -> Duration {
        Duration::from_secs(self.termination.start_confirm_secs)
    }
}

/// Interpreters and shells that many unrelated processes run under
const GENERIC_PROGRAMS: &[&str] = &[
    "python", "pypy", "node", "deno", "ruby", "perl", "php", "java", "bash", "sh", "zsh",
    "dash", "fish", "env",
];

/// Whether `identity` is a bare interpreter name such as `python3.11`
fn is_generic_program(identity: &str) -> bool {
    let base = identity
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    GENERIC_PROGRAMS.contains(&base)
}

/// Expand `$VAR` and `${VAR}` references in a string
fn expand_env_in_string(s: &str) -> String {
    let mut result = s.to_string();

    // Longest names first so $HOME_DIR is not clobbered by $HOME
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    for (key, value) in vars {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}
