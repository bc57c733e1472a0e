use crate::error::{Result, VigilError};
use std::collections::BTreeSet;
use std::sync::Mutex;
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// Signals the supervisor sends to workload processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Ask the process to shut down (SIGTERM)
    Terminate,
    /// Kill the process outright (SIGKILL)
    Kill,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Access to the OS process table
///
/// Everything the supervisor knows about running processes goes through this
/// trait, so the state machine can be driven by a test double.
pub trait ProcessInspector: Send + Sync {
    /// PIDs of live (non-zombie) processes whose command line contains `pattern`
    fn list_matching(&self, pattern: &str) -> Result<BTreeSet<u32>>;

    /// Deliver `kind` to `pid`. A process that is already gone is not an error.
    fn signal(&self, pid: u32, kind: SignalKind) -> Result<()>;
}

/// `ProcessInspector` backed by sysinfo and kill(2)
pub struct SystemInspector {
    system: Mutex<System>,
    own_pid: u32,
}

impl SystemInspector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            own_pid: std::process::id(),
        }
    }
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SystemInspector {
    fn list_matching(&self, pattern: &str) -> Result<BTreeSet<u32>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| VigilError::LivenessAmbiguous("process table lock poisoned".into()))?;

        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new().with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let matching = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != self.own_pid)
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter(|(_, process)| {
                !matches!(
                    process.status(),
                    ProcessStatus::Zombie | ProcessStatus::Dead
                )
            })
            .filter(|(_, process)| {
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                if cmdline.is_empty() {
                    process.name().to_string_lossy().contains(pattern)
                } else {
                    cmdline.contains(pattern)
                }
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();

        Ok(matching)
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, kind: SignalKind) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| VigilError::SignalError(format!("PID out of range: {}", pid)))?;
        let signal = match kind {
            SignalKind::Terminate => Signal::SIGTERM,
            SignalKind::Kill => Signal::SIGKILL,
        };

        match kill(Pid::from_raw(raw), signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(VigilError::SignalError(format!(
                "Failed to send {} to {}: {}",
                kind, pid, e
            ))),
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, pid: u32, kind: SignalKind) -> Result<()> {
        Err(VigilError::SignalError(format!(
            "Cannot send {} to {}: signals are only supported on Unix",
            kind, pid
        )))
    }
}
