use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use std::fs::{self, OpenOptions};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Result of launching the workload
#[derive(Debug)]
pub struct LaunchedWorkload {
    /// Process ID assigned by the OS
    pub pid: u32,

    /// Child handle, when the launcher owns one
    pub child: Option<Child>,
}

/// Starts the workload executable. Treated as opaque once started.
pub trait Launcher: Send + Sync {
    fn launch(&self, config: &VigilConfig) -> Result<LaunchedWorkload>;
}

/// Launches the workload with `tokio::process::Command`
///
/// The workload gets its own process group, a closed stdin, and its stdout
/// and stderr appended to the workload log under the state directory.
#[derive(Debug, Default)]
pub struct CommandLauncher;

impl CommandLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Build the command, wrapping it in a shell when an activator is configured
    fn build_command(config: &VigilConfig) -> Command {
        let workload = &config.workload;

        let mut command = match workload.activate {
            Some(ref activate) if activate.exists() => {
                debug!(activate = %activate.display(), "Sourcing environment activator");
                let mut script = format!(
                    ". {} && exec {}",
                    shell_quote(&activate.to_string_lossy()),
                    shell_quote(&workload.launcher.to_string_lossy())
                );
                for arg in &workload.args {
                    script.push(' ');
                    script.push_str(&shell_quote(arg));
                }
                let mut command = Command::new("/bin/sh");
                command.arg("-c").arg(script);
                command
            }
            Some(ref activate) => {
                warn!(
                    activate = %activate.display(),
                    "Environment activator not found, launching without it"
                );
                Self::direct(config)
            }
            None => Self::direct(config),
        };

        if let Some(ref cwd) = workload.cwd {
            command.current_dir(cwd);
        }

        for (key, value) in &workload.env {
            command.env(key, value);
        }

        command
    }

    fn direct(config: &VigilConfig) -> Command {
        let mut command = Command::new(&config.workload.launcher);
        command.args(&config.workload.args);
        command
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, config: &VigilConfig) -> Result<LaunchedWorkload> {
        let log_path = config.workload_log_path();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                VigilError::SpawnError(format!(
                    "Failed to open workload log {}: {}",
                    log_path.display(),
                    e
                ))
            })?;
        let stderr = stdout.try_clone()?;

        let mut command = Self::build_command(config);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Keep terminal interrupts aimed at the supervisor away from the workload
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            VigilError::SpawnError(format!(
                "Failed to spawn workload '{}': {}",
                config.workload.name, e
            ))
        })?;

        let pid = child.id().ok_or_else(|| {
            VigilError::SpawnError(format!(
                "Failed to get PID for workload '{}'",
                config.workload.name
            ))
        })?;

        Ok(LaunchedWorkload {
            pid,
            child: Some(child),
        })
    }
}

/// Single-quote a string for /bin/sh
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
