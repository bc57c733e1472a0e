use crate::error::VigilError;
use crate::process::inspector::ProcessInspector;
use crate::process::workload::WorkloadProcess;
use std::sync::Arc;
use tracing::warn;

/// Answers "is the workload we started still the process behind this PID?"
#[derive(Clone)]
pub struct LivenessProber {
    inspector: Arc<dyn ProcessInspector>,
}

impl LivenessProber {
    pub fn new(inspector: Arc<dyn ProcessInspector>) -> Self {
        Self { inspector }
    }

    /// True only when `pid` is in the process table and its command line
    /// matches `identity`. Anything undeterminable counts as dead.
    pub fn is_alive(&self, pid: u32, identity: &str) -> bool {
        if pid == 0 || identity.is_empty() {
            return false;
        }

        match self.inspector.list_matching(identity) {
            Ok(pids) => pids.contains(&pid),
            Err(e) => {
                let err = VigilError::LivenessAmbiguous(e.to_string());
                warn!(pid, identity, "{}; treating workload as dead", err);
                false
            }
        }
    }

    pub fn is_workload_alive(&self, workload: &WorkloadProcess) -> bool {
        self.is_alive(workload.pid, &workload.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::process::inspector::SignalKind;
    use std::collections::{BTreeSet, HashMap};
    use std::time::SystemTime;

    struct TableInspector {
        table: HashMap<u32, String>,
        broken: bool,
    }

    impl ProcessInspector for TableInspector {
        fn list_matching(&self, pattern: &str) -> Result<BTreeSet<u32>> {
            if self.broken {
                return Err(VigilError::Other("/proc unreadable".to_string()));
            }
            Ok(self
                .table
                .iter()
                .filter(|(_, cmd)| cmd.contains(pattern))
                .map(|(pid, _)| *pid)
                .collect())
        }

        fn signal(&self, _pid: u32, _kind: SignalKind) -> Result<()> {
            Ok(())
        }
    }

    fn prober(entries: &[(u32, &str)], broken: bool) -> LivenessProber {
        let table = entries
            .iter()
            .map(|(pid, cmd)| (*pid, cmd.to_string()))
            .collect();
        LivenessProber::new(Arc::new(TableInspector { table, broken }))
    }

    #[test]
    fn test_alive_when_pid_matches_identity() {
        let prober = prober(&[(100, "python train.py --epochs 10")], false);
        assert!(prober.is_alive(100, "train.py"));
    }

    #[test]
    fn test_dead_when_pid_missing() {
        let prober = prober(&[(100, "python train.py")], false);
        assert!(!prober.is_alive(101, "train.py"));
    }

    #[test]
    fn test_dead_when_pid_reused_by_other_program() {
        let prober = prober(&[(100, "/usr/sbin/sshd -D")], false);
        assert!(!prober.is_alive(100, "train.py"));
    }

    #[test]
    fn test_dead_when_table_unreadable() {
        let prober = prober(&[(100, "python train.py")], true);
        assert!(!prober.is_alive(100, "train.py"));
    }

    #[test]
    fn test_workload_helper() {
        let prober = prober(&[(7, "run.sh")], false);
        let workload = WorkloadProcess::adopted(7, SystemTime::now(), "run.sh".to_string());
        assert!(prober.is_workload_alive(&workload));
    }

    #[test]
    fn test_empty_identity_is_dead() {
        let prober = prober(&[(7, "run.sh")], false);
        assert!(!prober.is_alive(7, ""));
    }
}
