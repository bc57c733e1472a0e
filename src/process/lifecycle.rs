use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::process::inspector::{ProcessInspector, SignalKind};
use crate::process::liveness::LivenessProber;
use crate::process::spawner::Launcher;
use crate::process::workload::WorkloadProcess;
use crate::state::PidFile;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// How often `stop` re-checks whether targets have exited
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a `stop` call had to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Processes that matched the workload identity or an auxiliary pattern
    pub matched: usize,
    /// Processes that exited after SIGTERM
    pub graceful: usize,
    /// Processes that needed SIGKILL
    pub forced: usize,
    /// Processes still present after the force window
    pub survivors: usize,
}

impl StopReport {
    pub fn was_running(&self) -> bool {
        self.matched > 0
    }
}

/// Owns the current workload process: starts it, stops it, records its PID
pub struct LifecycleManager {
    config: Arc<VigilConfig>,
    inspector: Arc<dyn ProcessInspector>,
    launcher: Arc<dyn Launcher>,
    prober: LivenessProber,
    pid_file: PidFile,
    current: Option<WorkloadProcess>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<VigilConfig>,
        inspector: Arc<dyn ProcessInspector>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let pid_file = PidFile::with_path(config.workload_pid_path());
        Self {
            prober: LivenessProber::new(Arc::clone(&inspector)),
            config,
            inspector,
            launcher,
            pid_file,
            current: None,
        }
    }

    /// Take over a workload recorded in the PID file by an earlier run
    pub fn adopt(&mut self) -> Option<&WorkloadProcess> {
        if self.current.is_none() {
            let pid = self.pid_file.read_optional()?;
            let started_at = self.pid_file.modified().unwrap_or_else(SystemTime::now);
            debug!(pid, "Adopting workload from PID file");
            self.current = Some(WorkloadProcess::adopted(
                pid,
                started_at,
                self.config.identity(),
            ));
        }
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&WorkloadProcess> {
        self.current.as_ref()
    }

    /// Whether the current workload is still alive
    pub fn is_alive(&mut self) -> bool {
        match self.current.as_mut() {
            Some(workload) => {
                workload.reap();
                self.prober.is_workload_alive(workload)
            }
            None => false,
        }
    }

    /// Collect the exit status of an owned child that has exited
    pub fn reap(&mut self) {
        if let Some(workload) = self.current.as_mut() {
            workload.reap();
        }
    }

    /// Forget a workload that has been observed dead
    pub fn invalidate(&mut self) {
        if let Some(mut workload) = self.current.take() {
            workload.reap();
            info!(
                pid = workload.pid,
                adopted = workload.is_adopted(),
                "Workload process is gone"
            );
        }
    }

    /// Launch the workload and confirm it survives the confirmation window
    ///
    /// # Returns
    /// * `Ok(pid)` - The workload is up and matches its identity
    /// * `Err(VigilError::StartError)` - It exited during the confirmation window
    pub async fn start(&mut self) -> Result<u32> {
        // A workload left behind by an earlier run is taken over, never duplicated
        self.adopt();
        if self.is_alive() {
            if let Some(ref workload) = self.current {
                warn!(pid = workload.pid, "Workload already running, not starting another");
                return Ok(workload.pid);
            }
        }
        self.invalidate();

        self.config.check_prerequisites()?;

        let identity = self.config.identity();
        info!(
            workload = %self.config.workload.name,
            launcher = %self.config.workload.launcher.display(),
            "Starting workload"
        );

        let launched = self.launcher.launch(&self.config)?;
        let pid = launched.pid;
        self.pid_file.write(pid)?;
        self.current = Some(WorkloadProcess::new(
            pid,
            SystemTime::now(),
            identity,
            launched.child,
        ));

        let confirm = self.config.start_confirm();
        debug!(pid, "Waiting {:?} to confirm workload start", confirm);
        sleep(confirm).await;

        if !self.is_alive() {
            self.invalidate();
            self.pid_file.remove()?;
            return Err(VigilError::StartError(format!(
                "PID {} was gone after {}s",
                pid,
                confirm.as_secs()
            )));
        }

        info!(pid, "Workload started");
        Ok(pid)
    }

    /// Stop every process belonging to the workload with SIGTERM, then SIGKILL
    ///
    /// Total time spent is bounded by `grace + force + settle`. Safe to call
    /// when nothing is running.
    pub async fn stop(&mut self, grace: Duration, force: Duration) -> Result<StopReport> {
        let mut report = StopReport::default();
        let targets = self.matching_pids();
        report.matched = targets.len();

        if targets.is_empty() {
            debug!("No workload processes to stop");
            self.invalidate();
            self.pid_file.remove()?;
            return Ok(report);
        }

        info!(pids = ?targets, "Stopping workload gracefully");
        self.send_all(&targets, SignalKind::Terminate);

        let survivors = self.wait_for_exit(&targets, grace).await;
        report.graceful = targets.len() - survivors.len();

        if !survivors.is_empty() {
            let timeout = VigilError::TerminationTimeout(grace.as_secs());
            warn!(pids = ?survivors, "{}; sending SIGKILL", timeout);
            self.send_all(&survivors, SignalKind::Kill);

            let remaining = self.wait_for_exit(&survivors, force).await;
            report.forced = survivors.len() - remaining.len();
            report.survivors = remaining.len();
            if !remaining.is_empty() {
                warn!(pids = ?remaining, "Processes survived SIGKILL");
            }
        }

        let settle = self.config.settle();
        if !settle.is_zero() {
            sleep(settle).await;
        }

        self.invalidate();
        self.pid_file.remove()?;

        info!(
            graceful = report.graceful,
            forced = report.forced,
            "Workload stopped"
        );
        Ok(report)
    }

    /// Every PID matching the workload identity or an auxiliary pattern
    fn matching_pids(&self) -> BTreeSet<u32> {
        let mut pids = BTreeSet::new();

        for pattern in self.patterns() {
            match self.inspector.list_matching(&pattern) {
                Ok(found) => pids.extend(found),
                Err(e) => warn!(pattern = %pattern, "Failed to enumerate processes: {}", e),
            }
        }

        pids
    }

    fn patterns(&self) -> Vec<String> {
        let mut patterns = vec![self.config.identity()];
        patterns.extend(self.config.workload.aux_patterns.iter().cloned());
        patterns
    }

    fn send_all(&self, pids: &BTreeSet<u32>, kind: SignalKind) {
        for &pid in pids {
            if let Err(e) = self.inspector.signal(pid, kind) {
                warn!(pid, "Failed to send {}: {}", kind, e);
            }
        }
    }

    /// Poll until all `targets` are gone or `timeout` elapses; returns survivors
    async fn wait_for_exit(&mut self, targets: &BTreeSet<u32>, timeout: Duration) -> BTreeSet<u32> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(workload) = self.current.as_mut() {
                workload.reap();
            }

            let live = self.matching_pids_quiet();
            let survivors: BTreeSet<u32> = targets.intersection(&live).copied().collect();
            if survivors.is_empty() {
                return survivors;
            }

            let now = Instant::now();
            if now >= deadline {
                return survivors;
            }
            sleep(STOP_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn matching_pids_quiet(&self) -> BTreeSet<u32> {
        self.patterns()
            .iter()
            .filter_map(|pattern| self.inspector.list_matching(pattern).ok())
            .flatten()
            .collect()
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }
}
