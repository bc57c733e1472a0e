// Supervisor module - The control loop tying health, policy and lifecycle together

mod signals;
mod status;

pub use signals::{cancelled, shutdown_signal, sleep_or_cancel};
pub use status::StatusReport;

use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::health::{HealthEvaluator, HealthVerdict, ResourceSampler, SystemSampler};
use crate::logs::{FileLogReader, LogReader};
use crate::process::{
    CommandLauncher, Launcher, LifecycleManager, LivenessProber, ProcessInspector, RestartDecision,
    RestartEngine, RestartPolicy, StopReport, SystemInspector,
};
use crate::state::PidFile;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Where the control loop is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Starting,
    Running,
    /// A restart is in progress
    Degraded,
    CoolingDown,
    Stopped,
}

impl fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorPhase::Starting => write!(f, "starting"),
            SupervisorPhase::Running => write!(f, "running"),
            SupervisorPhase::Degraded => write!(f, "degraded"),
            SupervisorPhase::CoolingDown => write!(f, "cooling down"),
            SupervisorPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// What one pass of the loop did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing to do
    Healthy,
    /// Host overloaded; policy not consulted
    Skipped { verdict: HealthVerdict },
    /// Restart held back by the stability period
    Suppressed {
        verdict: HealthVerdict,
        remaining: Duration,
    },
    /// Workload was stopped and started again; `pid` is `None` if the start failed
    Restarted {
        verdict: HealthVerdict,
        pid: Option<u32>,
    },
    /// Restart budget exhausted; the loop must wait until `until`
    Cooldown {
        verdict: HealthVerdict,
        until: SystemTime,
    },
}

/// The supervisor's connections to the outside world
#[derive(Clone)]
pub struct Collaborators {
    pub inspector: Arc<dyn ProcessInspector>,
    pub launcher: Arc<dyn Launcher>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub logs: Arc<dyn LogReader>,
}

impl Collaborators {
    /// Real process table, real launcher, sysinfo sampling, plain log files
    pub fn system() -> Self {
        Self {
            inspector: Arc::new(SystemInspector::new()),
            launcher: Arc::new(CommandLauncher::new()),
            sampler: Arc::new(SystemSampler::new()),
            logs: Arc::new(FileLogReader::new()),
        }
    }
}

/// Keeps one workload alive
///
/// Single owner of the restart engine and the lifecycle manager; nothing else
/// mutates supervision state.
pub struct Supervisor {
    config: Arc<VigilConfig>,
    lifecycle: LifecycleManager,
    evaluator: HealthEvaluator,
    engine: RestartEngine,
    phase: SupervisorPhase,
    shutdown_started: bool,
}

impl Supervisor {
    /// Build a supervisor, loading persisted restart history from the state directory
    pub fn new(config: Arc<VigilConfig>, collaborators: Collaborators) -> Result<Self> {
        let engine = RestartEngine::open(
            RestartPolicy::from_config(&config),
            config.history_path(),
            SystemTime::now(),
        )?;

        let evaluator = HealthEvaluator::new(
            Arc::clone(&config),
            LivenessProber::new(Arc::clone(&collaborators.inspector)),
            collaborators.sampler,
            collaborators.logs,
        );

        let lifecycle = LifecycleManager::new(
            Arc::clone(&config),
            collaborators.inspector,
            collaborators.launcher,
        );

        Ok(Self {
            config,
            lifecycle,
            evaluator,
            engine,
            phase: SupervisorPhase::Starting,
            shutdown_started: false,
        })
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    pub fn engine(&self) -> &RestartEngine {
        &self.engine
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Initial launch, or takeover of a workload an earlier run left behind.
    /// A failure here is fatal to the loop.
    pub async fn start_workload(&mut self) -> Result<u32> {
        self.phase = SupervisorPhase::Starting;
        self.evaluator.mark_start();

        match self.lifecycle.start().await {
            Ok(pid) => {
                let started_at = self
                    .lifecycle
                    .current()
                    .map(|workload| workload.started_at)
                    .unwrap_or_else(SystemTime::now);
                self.engine.record_start(started_at);
                self.phase = SupervisorPhase::Running;
                Ok(pid)
            }
            Err(e) => {
                self.phase = SupervisorPhase::Stopped;
                Err(e)
            }
        }
    }

    /// One pass of the loop at time `now`
    ///
    /// The resource gate runs first so an overloaded host never leads to a
    /// restart, whatever state the workload is in.
    pub async fn tick(&mut self, now: SystemTime) -> TickOutcome {
        let sample = self.evaluator.sample();
        if let Some(verdict) = self.evaluator.resource_gate(&sample) {
            warn!(
                cpu = sample.cpu_percent,
                memory = sample.memory_percent,
                "Host under resource pressure, skipping health check"
            );
            self.phase = SupervisorPhase::Running;
            return TickOutcome::Skipped { verdict };
        }

        self.lifecycle.reap();
        let verdict = self
            .evaluator
            .evaluate_with_sample(self.lifecycle.current(), &sample, now);

        if verdict.is_healthy() {
            self.engine.observe(now);
            self.phase = SupervisorPhase::Running;
            debug!("Workload healthy");
            return TickOutcome::Healthy;
        }

        let decision = self.engine.may_restart(now, &verdict);
        if !decision.is_allowed() {
            debug!(verdict = %verdict, "{}", decision.reason());
        }

        match decision {
            RestartDecision::NotApplicable => TickOutcome::Skipped { verdict },
            RestartDecision::Suppressed { remaining } => {
                info!(
                    verdict = %verdict,
                    remaining_secs = remaining.as_secs(),
                    "Within stability period, not restarting"
                );
                self.phase = SupervisorPhase::Running;
                TickOutcome::Suppressed { verdict, remaining }
            }
            RestartDecision::Cooldown { until } => {
                self.phase = SupervisorPhase::CoolingDown;
                TickOutcome::Cooldown { verdict, until }
            }
            RestartDecision::Allow => {
                warn!(verdict = %verdict, "Restarting workload");
                self.phase = SupervisorPhase::Degraded;
                let pid = self.restart(now).await;
                self.phase = SupervisorPhase::Running;
                TickOutcome::Restarted { verdict, pid }
            }
        }
    }

    /// Stop whatever is left of the workload and start it again
    async fn restart(&mut self, now: SystemTime) -> Option<u32> {
        if let Err(e) = self.engine.record_restart(now) {
            warn!("Failed to persist restart event: {}", e);
        }

        if let Err(e) = self
            .lifecycle
            .stop(self.config.grace(), self.config.force())
            .await
        {
            warn!("Failed to stop workload cleanly: {}", e);
        }

        self.evaluator.mark_start();
        match self.lifecycle.start().await {
            Ok(pid) => {
                self.engine.record_start(SystemTime::now());
                Some(pid)
            }
            Err(e) => {
                error!("Restart failed: {}", e);
                None
            }
        }
    }

    /// Leave the cooldown and wipe restart history
    pub fn finish_cooldown(&mut self) {
        if let Err(e) = self.engine.finish_cooldown() {
            warn!("Failed to clear restart history: {}", e);
        }
        self.phase = SupervisorPhase::Running;
    }

    /// Run until `cancel` flips to true, then stop the workload once
    pub async fn run(&mut self, mut cancel: watch::Receiver<bool>) -> Result<()> {
        let registration = PidFile::with_path(self.config.supervisor_pid_path());
        if let Some(pid) = registration.read_optional() {
            if pid != std::process::id() && registration.is_process_running() {
                return Err(VigilError::AlreadyRunning(pid));
            }
        }
        registration.write_current()?;

        let result = self.supervise(&mut cancel).await;

        if let Err(e) = self.shutdown().await {
            error!("Failed to stop workload during shutdown: {}", e);
        }
        if let Err(e) = registration.remove() {
            warn!("Failed to remove supervisor PID file: {}", e);
        }

        info!("Supervisor stopped");
        result
    }

    async fn supervise(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<()> {
        info!(
            workload = %self.config.workload.name,
            poll_interval_secs = self.config.health.poll_interval_secs,
            max_restarts = self.config.policy.max_restarts,
            window_secs = self.config.policy.window_secs,
            "Supervisor starting"
        );

        let started = tokio::select! {
            result = self.start_workload() => Some(result),
            _ = cancelled(cancel) => None,
        };
        match started {
            None => return Ok(()),
            Some(Err(e)) => {
                error!("Initial start failed: {}", e);
                return Err(e);
            }
            Some(Ok(_)) => {}
        }

        loop {
            if !sleep_or_cancel(cancel, self.config.poll_interval()).await {
                return Ok(());
            }

            let now = SystemTime::now();
            let outcome = tokio::select! {
                outcome = self.tick(now) => Some(outcome),
                _ = cancelled(cancel) => None,
            };
            let Some(outcome) = outcome else {
                return Ok(());
            };

            if let TickOutcome::Cooldown { verdict, until } = outcome {
                let wait = until
                    .duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO);
                warn!(
                    verdict = %verdict,
                    cooldown_secs = wait.as_secs(),
                    "Restart budget exhausted, cooling down"
                );
                if !sleep_or_cancel(cancel, wait).await {
                    return Ok(());
                }
                self.finish_cooldown();
            }
        }
    }

    /// Final stop; later calls are no-ops
    pub async fn shutdown(&mut self) -> Result<Option<StopReport>> {
        if self.shutdown_started {
            debug!("Shutdown already in progress");
            return Ok(None);
        }
        self.shutdown_started = true;
        self.phase = SupervisorPhase::Stopped;

        info!("Stopping workload before exit");
        let report = self
            .lifecycle
            .stop(self.config.grace(), self.config.force())
            .await?;
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(SupervisorPhase::CoolingDown.to_string(), "cooling down");
        assert_eq!(SupervisorPhase::Running.to_string(), "running");
    }

    #[test]
    fn test_system_collaborators_construct() {
        let collaborators = Collaborators::system();
        let _ = collaborators.sampler.sample();
    }
}
