use crate::error::{Result, VigilError};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter, e.g. `VIGIL_LOG=vigil=debug`
pub const LOG_ENV: &str = "VIGIL_LOG";

/// Install the global subscriber
///
/// Events go to stderr and, when `monitor_log` is given, are appended without
/// colour codes to that file as well.
pub fn init(monitor_log: Option<&Path>, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let file_layer = match monitor_log {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    VigilError::LogError(format!(
                        "Failed to open monitor log {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| VigilError::Other(format!("Failed to initialise logging: {}", e)))
}
