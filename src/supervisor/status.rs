use super::Collaborators;
use crate::config::VigilConfig;
use crate::error::Result;
use crate::health::{HealthEvaluator, HealthVerdict, ResourceSample};
use crate::process::{HistorySummary, LifecycleManager, LivenessProber, RestartPolicy};
use crate::state::{PidFile, RestartHistory};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

/// Point-in-time view of the workload for `vigil status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub workload: String,
    pub running: bool,
    /// PID from the PID file, even if that process is gone
    pub pid: Option<u32>,
    /// Local time, RFC 3339
    pub started_at: Option<String>,
    pub uptime_secs: Option<u64>,
    /// `None` when no workload has been recorded
    pub verdict: Option<HealthVerdict>,
    pub resources: ResourceSample,
    pub supervisor_pid: Option<u32>,
    pub restarts: HistorySummary,
}

impl StatusReport {
    /// Inspect persisted state and the live process table without changing anything
    pub fn collect(
        config: Arc<VigilConfig>,
        collaborators: &Collaborators,
        now: SystemTime,
    ) -> Result<Self> {
        let mut lifecycle = LifecycleManager::new(
            Arc::clone(&config),
            Arc::clone(&collaborators.inspector),
            Arc::clone(&collaborators.launcher),
        );
        let evaluator = HealthEvaluator::new(
            Arc::clone(&config),
            LivenessProber::new(Arc::clone(&collaborators.inspector)),
            Arc::clone(&collaborators.sampler),
            Arc::clone(&collaborators.logs),
        );

        let resources = evaluator.sample();
        let recorded = lifecycle.adopt().map(|w| (w.pid, w.started_at));
        let running = lifecycle.is_alive();

        let verdict = recorded.map(|_| {
            evaluator.evaluate_with_sample(lifecycle.current(), &resources, now)
        });

        let (pid, started_at, uptime_secs) = match recorded {
            Some((pid, started)) if running => (
                Some(pid),
                Some(DateTime::<Local>::from(started).to_rfc3339()),
                Some(now.duration_since(started).unwrap_or_default().as_secs()),
            ),
            Some((pid, _)) => (Some(pid), None, None),
            None => (None, None, None),
        };

        let history = RestartHistory::load(config.history_path())?;
        let restarts =
            HistorySummary::from_history(&history, &RestartPolicy::from_config(&config), now);

        let supervisor = PidFile::with_path(config.supervisor_pid_path());
        let supervisor_pid = supervisor
            .is_process_running()
            .then(|| supervisor.read_optional())
            .flatten();

        Ok(Self {
            workload: config.workload.name.clone(),
            running,
            pid,
            started_at,
            uptime_secs,
            verdict,
            resources,
            supervisor_pid,
            restarts,
        })
    }

    /// One-line summary
    pub fn headline(&self) -> String {
        match (self.running, self.pid) {
            (true, Some(pid)) => format!("{} is running (PID {})", self.workload, pid),
            (false, Some(pid)) => format!("{} is not running (stale PID {})", self.workload, pid),
            _ => format!("{} is not running", self.workload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(temp_dir: &TempDir) -> Arc<VigilConfig> {
        let mut config = VigilConfig::for_launcher("trainer", "/bin/sleep");
        config.workload.identity = Some("vigil-status-test-7731".to_string());
        config.paths.state_dir = temp_dir.path().to_path_buf();
        Arc::new(config)
    }

    #[test]
    fn test_status_without_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let report =
            StatusReport::collect(config_in(&temp_dir), &Collaborators::system(), SystemTime::now())
                .unwrap();

        assert!(!report.running);
        assert_eq!(report.pid, None);
        assert!(report.verdict.is_none());
        assert_eq!(report.headline(), "trainer is not running");
        assert_eq!(report.restarts.restarts_in_window, 0);
    }

    #[test]
    fn test_status_with_stale_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        PidFile::with_path(config.workload_pid_path())
            .write(3_999_999)
            .unwrap();

        let report =
            StatusReport::collect(config, &Collaborators::system(), SystemTime::now()).unwrap();

        assert!(!report.running);
        assert_eq!(report.pid, Some(3_999_999));
        assert_eq!(report.verdict, Some(HealthVerdict::Dead));
        assert!(report.headline().contains("stale PID 3999999"));
    }

    #[test]
    fn test_status_serializes_to_json() {
        let temp_dir = TempDir::new().unwrap();
        let report =
            StatusReport::collect(config_in(&temp_dir), &Collaborators::system(), SystemTime::now())
                .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["workload"], "trainer");
    }
}
