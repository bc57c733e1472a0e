// Verb implementations for the vigil CLI

use super::output;
use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::logs::{FileLogReader, LogReader, LogStream, StartAt};
use crate::process::{
    CommandLauncher, LifecycleManager, ProcessInspector, SignalKind, SystemInspector,
};
use crate::state::PidFile;
use crate::supervisor::{cancelled, shutdown_signal, Collaborators, StatusReport, Supervisor};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Extra time allowed for a supervisor to finish its own shutdown
const SUPERVISOR_EXIT_MARGIN: Duration = Duration::from_secs(5);

/// Run the supervision loop in the foreground until SIGINT or SIGTERM
pub async fn start(config: Arc<VigilConfig>, real_time: bool) -> Result<()> {
    let cancel = shutdown_signal()?;
    let mut supervisor = Supervisor::new(Arc::clone(&config), Collaborators::system())?;

    let mirror = real_time.then(|| {
        let logs = config.watched_logs();
        tokio::spawn(async move {
            let mut stream = LogStream::new(logs, StartAt::End).await;
            while let Some(line) = stream.next().await {
                output::print_log_line(&line);
            }
        })
    });

    let result = supervisor.run(cancel).await;

    if let Some(mirror) = mirror {
        mirror.abort();
    }
    result
}

/// Stop a running supervisor, if any, then make sure the workload is gone
pub async fn stop(config: Arc<VigilConfig>) -> Result<()> {
    let spinner = output::create_progress_bar("Stopping workload...");

    match stop_inner(config).await {
        Ok(message) => {
            output::finish_progress_success(spinner, &message);
            Ok(())
        }
        Err(e) => {
            output::finish_progress_error(spinner, "Stop failed");
            Err(e)
        }
    }
}

async fn stop_inner(config: Arc<VigilConfig>) -> Result<String> {
    let inspector: Arc<dyn ProcessInspector> = Arc::new(SystemInspector::new());

    stop_supervisor(&config, inspector.as_ref()).await;

    let mut lifecycle = LifecycleManager::new(
        Arc::clone(&config),
        inspector,
        Arc::new(CommandLauncher::new()),
    );
    lifecycle.adopt();
    let report = lifecycle.stop(config.grace(), config.force()).await?;

    Ok(output::describe_stop(&report))
}

/// Ask a live supervisor to shut down and wait for it to exit
async fn stop_supervisor(config: &VigilConfig, inspector: &dyn ProcessInspector) {
    let registration = PidFile::with_path(config.supervisor_pid_path());
    let Some(pid) = registration.read_optional() else {
        return;
    };
    if pid == std::process::id() || !registration.is_process_running() {
        return;
    }

    info!(pid, "Signalling running supervisor");
    if let Err(e) = inspector.signal(pid, SignalKind::Terminate) {
        warn!(pid, "Failed to signal supervisor: {}", e);
        return;
    }

    let deadline =
        Instant::now() + config.grace() + config.force() + config.settle() + SUPERVISOR_EXIT_MARGIN;
    while registration.is_process_running() && Instant::now() < deadline {
        sleep(Duration::from_millis(250)).await;
    }

    if registration.is_process_running() {
        warn!(pid, "Supervisor still running, stopping workload directly");
    }
}

/// Stop, then start the workload once without supervising it
pub async fn restart(config: Arc<VigilConfig>) -> Result<()> {
    config.check_prerequisites()?;
    stop(Arc::clone(&config)).await?;

    let spinner = output::create_progress_bar("Starting workload...");
    let mut lifecycle = LifecycleManager::new(
        Arc::clone(&config),
        Arc::new(SystemInspector::new()),
        Arc::new(CommandLauncher::new()),
    );

    match lifecycle.start().await {
        Ok(pid) => {
            output::finish_progress_success(spinner, &format!("Workload started (PID {})", pid));
            Ok(())
        }
        Err(e) => {
            output::finish_progress_error(spinner, "Start failed");
            Err(e)
        }
    }
}

/// Print verdict, uptime, resources and restart budget
pub async fn status(config: Arc<VigilConfig>, json: bool) -> Result<()> {
    let collaborators = Collaborators::system();
    // CPU usage is measured between two refreshes
    sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

    let report = StatusReport::collect(config, &collaborators, SystemTime::now())?;

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| VigilError::SerializationError(e.to_string()))?;
        println!("{}", rendered);
    } else {
        output::print_status(&report);
    }
    Ok(())
}

/// Print the last `lines` lines of every watched log
pub fn logs(config: &VigilConfig, lines: usize) -> Result<()> {
    let reader = FileLogReader::new();

    for log in config.watched_logs() {
        match reader.recent_lines(&log, lines) {
            Ok(recent) => output::print_log_section(&log, recent.as_deref()),
            Err(e) => output::print_error(&e.to_string()),
        }
    }
    Ok(())
}

/// Mirror every watched log until interrupted
pub async fn tail(config: &VigilConfig) -> Result<()> {
    let mut cancel = shutdown_signal()?;
    let logs = config.watched_logs();
    output::print_info(&format!("Following {} log(s), Ctrl-C to stop", logs.len()));

    let mut stream = LogStream::new(logs, StartAt::End).await;
    loop {
        tokio::select! {
            line = stream.next() => match line {
                Some(line) => output::print_log_line(&line),
                None => break,
            },
            _ = cancelled(&mut cancel) => break,
        }
    }
    Ok(())
}
