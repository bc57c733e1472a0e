use std::time::{Duration, SystemTime};
use tokio::process::Child;

/// The currently tracked workload process
#[derive(Debug)]
pub struct WorkloadProcess {
    pub pid: u32,
    pub started_at: SystemTime,
    /// Command-line pattern the process must still match to count as ours
    pub identity: String,
    /// Handle kept when this supervisor launched the process, used for reaping
    child: Option<Child>,
}

impl WorkloadProcess {
    pub fn new(pid: u32, started_at: SystemTime, identity: String, child: Option<Child>) -> Self {
        Self {
            pid,
            started_at,
            identity,
            child,
        }
    }

    /// Process recorded by an earlier supervisor run (no child handle)
    pub fn adopted(pid: u32, started_at: SystemTime, identity: String) -> Self {
        Self::new(pid, started_at, identity, None)
    }

    pub fn uptime(&self, now: SystemTime) -> Duration {
        now.duration_since(self.started_at)
            .unwrap_or(Duration::from_secs(0))
    }

    /// Collect the exit status if our child has exited, so it does not linger as a zombie
    pub fn reap(&mut self) -> bool {
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(Some(status))) => {
                tracing::debug!(pid = self.pid, %status, "Workload exit status collected");
                self.child = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_adopted(&self) -> bool {
        self.child.is_none()
    }
}
