// CLI module - User-facing command-line interface

mod commands;
mod output;

pub use output::print_error;

use crate::config::{VigilConfig, DEFAULT_CONFIG_FILE};
use crate::error::Result;
use crate::telemetry;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// vigil - keep one long-running workload alive, unattended
#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the workload and supervise it until interrupted
    Start {
        /// Mirror the watched logs to the console
        #[arg(long)]
        real_time: bool,
    },

    /// Stop the supervisor and the workload
    Stop,

    /// Stop the workload and start it again once, without supervising
    Restart,

    /// Show workload health, resources and restart history
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print recent lines of every watched log
    Logs {
        /// Number of lines per log
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },

    /// Follow every watched log until interrupted
    Tail,
}

impl Cli {
    /// Parse the command line
    ///
    /// `--help` and `--version` exit 0; any usage error, including an
    /// unknown verb, exits 1.
    pub fn parse_or_exit() -> Self {
        match Cli::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let code = if e.use_stderr() { 1 } else { 0 };
                let _ = e.print();
                std::process::exit(code);
            }
        }
    }

    /// Execute the parsed command
    pub async fn execute(self) -> Result<()> {
        let config = Arc::new(VigilConfig::from_file(&self.config)?);

        match self.command {
            Commands::Start { real_time } => {
                telemetry::init(Some(&config.monitor_log_path()), self.verbose)?;
                commands::start(config, real_time).await
            }
            Commands::Stop => {
                telemetry::init(Some(&config.monitor_log_path()), self.verbose)?;
                commands::stop(config).await
            }
            Commands::Restart => {
                telemetry::init(Some(&config.monitor_log_path()), self.verbose)?;
                commands::restart(config).await
            }
            Commands::Status { json } => {
                telemetry::init(None, self.verbose)?;
                commands::status(config, json).await
            }
            Commands::Logs { lines } => {
                telemetry::init(None, self.verbose)?;
                commands::logs(&config, lines)
            }
            Commands::Tail => {
                telemetry::init(None, self.verbose)?;
                commands::tail(&config).await
            }
        }
    }
}
