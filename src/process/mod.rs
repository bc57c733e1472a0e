// Process module - Workload lifecycle, liveness and restart policy

pub mod inspector;
pub mod lifecycle;
pub mod liveness;
pub mod restart;
pub mod spawner;
mod workload;

pub use inspector::{ProcessInspector, SignalKind, SystemInspector};
pub use lifecycle::{LifecycleManager, StopReport};
pub use liveness::LivenessProber;
pub use restart::{
    HistorySummary, RestartDecision, RestartEngine, RestartPolicy, SupervisorState,
};
pub use spawner::{CommandLauncher, LaunchedWorkload, Launcher};
pub use workload::WorkloadProcess;
