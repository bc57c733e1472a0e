// Health module - Per-tick workload health verdicts

mod patterns;
mod resources;

pub use patterns::{match_line, scan_lines, FailureKind, FailureMatch};
pub use resources::{ResourceSample, ResourceSampler, SystemSampler};

use crate::config::VigilConfig;
use crate::logs::LogReader;
use crate::process::{LivenessProber, WorkloadProcess};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Outcome of one health evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    /// The workload process is gone or no longer matches its identity
    Dead,
    /// A watched log has not been written to for too long
    Unresponsive { log: PathBuf, idle: Duration },
    /// A failure marker appeared in the tail of a watched log
    ErrorDetected { log: PathBuf, failure: FailureMatch },
    /// The host is overloaded; restarting now would not help
    ResourceExhausted { sample: ResourceSample },
}

impl HealthVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthVerdict::Healthy)
    }

    /// Whether this verdict calls for a restart at all
    pub fn triggers_restart(&self) -> bool {
        matches!(
            self,
            HealthVerdict::Dead
                | HealthVerdict::Unresponsive { .. }
                | HealthVerdict::ErrorDetected { .. }
        )
    }

    /// Whether a restart for this verdict must wait out the stability period
    pub fn requires_stability(&self) -> bool {
        matches!(
            self,
            HealthVerdict::Unresponsive { .. } | HealthVerdict::ErrorDetected { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Dead => "dead",
            HealthVerdict::Unresponsive { .. } => "unresponsive",
            HealthVerdict::ErrorDetected { .. } => "error detected",
            HealthVerdict::ResourceExhausted { .. } => "resource exhausted",
        }
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthVerdict::Healthy | HealthVerdict::Dead => write!(f, "{}", self.label()),
            HealthVerdict::Unresponsive { log, idle } => write!(
                f,
                "unresponsive: {} idle for {}s",
                log.display(),
                idle.as_secs()
            ),
            HealthVerdict::ErrorDetected { log, failure } => {
                write!(f, "error detected in {}: {}", log.display(), failure)
            }
            HealthVerdict::ResourceExhausted { sample } => write!(
                f,
                "resource exhausted: cpu {:.1}%, memory {:.1}%",
                sample.cpu_percent, sample.memory_percent
            ),
        }
    }
}

/// Combines liveness, log freshness, log contents and host load into a verdict
pub struct HealthEvaluator {
    config: Arc<VigilConfig>,
    prober: LivenessProber,
    sampler: Arc<dyn ResourceSampler>,
    logs: Arc<dyn LogReader>,
}

impl HealthEvaluator {
    pub fn new(
        config: Arc<VigilConfig>,
        prober: LivenessProber,
        sampler: Arc<dyn ResourceSampler>,
        logs: Arc<dyn LogReader>,
    ) -> Self {
        Self {
            config,
            prober,
            sampler,
            logs,
        }
    }

    pub fn sample(&self) -> ResourceSample {
        self.sampler.sample()
    }

    /// `ResourceExhausted` if `sample` is over either threshold
    pub fn resource_gate(&self, sample: &ResourceSample) -> Option<HealthVerdict> {
        let health = &self.config.health;
        sample
            .exceeds(health.cpu_threshold, health.memory_threshold)
            .then(|| HealthVerdict::ResourceExhausted { sample: *sample })
    }

    pub fn evaluate(&self, workload: Option<&WorkloadProcess>, now: SystemTime) -> HealthVerdict {
        let sample = self.sample();
        self.evaluate_with_sample(workload, &sample, now)
    }

    /// Ordered checks, first match wins: liveness, resources, logs
    pub fn evaluate_with_sample(
        &self,
        workload: Option<&WorkloadProcess>,
        sample: &ResourceSample,
        now: SystemTime,
    ) -> HealthVerdict {
        let Some(workload) = workload else {
            return HealthVerdict::Dead;
        };
        if !self.prober.is_workload_alive(workload) {
            return HealthVerdict::Dead;
        }

        if let Some(verdict) = self.resource_gate(sample) {
            return verdict;
        }

        self.check_logs(workload.started_at, now)
            .unwrap_or(HealthVerdict::Healthy)
    }

    /// Staleness then failure markers, log by log
    ///
    /// A log's idle time is measured from its last write or from the workload
    /// start, whichever is later.
    pub fn check_logs(&self, started_at: SystemTime, now: SystemTime) -> Option<HealthVerdict> {
        let stale_after = self.config.stale_after();

        for log in self.config.watched_logs() {
            let Some(modified) = self.read_or_skip(&log, |logs| logs.last_modified(&log)) else {
                continue;
            };

            let idle = now
                .duration_since(modified.max(started_at))
                .unwrap_or(Duration::ZERO);
            if idle > stale_after {
                return Some(HealthVerdict::Unresponsive { log, idle });
            }

            let tail_lines = self.config.health.tail_lines;
            let Some(lines) = self.read_or_skip(&log, |logs| logs.recent_lines(&log, tail_lines))
            else {
                continue;
            };

            if let Some(failure) = scan_lines(&lines) {
                return Some(HealthVerdict::ErrorDetected { log, failure });
            }
        }

        None
    }

    /// Hide everything already in the watched logs from later checks
    pub fn mark_start(&self) {
        self.logs.mark_start(&self.config.watched_logs());
    }

    fn read_or_skip<T>(
        &self,
        log: &Path,
        read: impl FnOnce(&dyn LogReader) -> crate::error::Result<Option<T>>,
    ) -> Option<T> {
        match read(self.logs.as_ref()) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!(log = %log.display(), "Watched log does not exist yet");
                None
            }
            Err(e) => {
                warn!(log = %log.display(), "Skipping unreadable log: {}", e);
                None
            }
        }
    }
}
