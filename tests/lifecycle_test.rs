// Integration tests for starting and stopping the workload

mod common;

use common::Harness;
use std::sync::Arc;
use vigil::error::VigilError;
use vigil::process::{LifecycleManager, SignalKind};
use vigil::state::PidFile;

fn lifecycle(harness: &Harness) -> LifecycleManager {
    LifecycleManager::new(
        Arc::clone(&harness.config),
        harness.inspector.clone(),
        harness.launcher.clone(),
    )
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill() {
    let harness = Harness::new();
    let mut manager = lifecycle(&harness);
    let pid = manager.start().await.unwrap();
    harness.inspector.ignore_sigterm(pid);

    let report = manager
        .stop(harness.config.grace(), harness.config.force())
        .await
        .unwrap();

    assert_eq!(report.matched, 1);
    assert_eq!(report.graceful, 0);
    assert_eq!(report.forced, 1);
    assert_eq!(report.survivors, 0);
    assert_eq!(
        harness.inspector.signals(),
        vec![(pid, SignalKind::Terminate), (pid, SignalKind::Kill)]
    );
    assert!(!harness.inspector.is_running(pid));
}

#[tokio::test]
async fn test_stop_includes_auxiliary_processes() {
    let harness = Harness::with_config(|config| {
        config.workload.aux_patterns = vec!["tensorboard".to_string()];
    });
    harness.inspector.spawn(42, "tensorboard --logdir runs");
    harness.inspector.spawn(43, "vim notes.txt");

    let mut manager = lifecycle(&harness);
    let pid = manager.start().await.unwrap();

    let report = manager
        .stop(harness.config.grace(), harness.config.force())
        .await
        .unwrap();

    assert_eq!(report.matched, 2);
    assert_eq!(report.graceful, 2);
    assert!(!harness.inspector.is_running(pid));
    assert!(!harness.inspector.is_running(42));
    assert!(harness.inspector.is_running(43));
}

#[tokio::test]
async fn test_stop_catches_orphans_not_in_pid_file() {
    let harness = Harness::new();
    harness
        .inspector
        .spawn(77, "/opt/old/run_training.sh --epochs 90");

    let mut manager = lifecycle(&harness);
    let report = manager
        .stop(harness.config.grace(), harness.config.force())
        .await
        .unwrap();

    assert_eq!(report.matched, 1);
    assert!(harness.inspector.running().is_empty());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let harness = Harness::new();
    let mut manager = lifecycle(&harness);
    manager.start().await.unwrap();

    let first = manager
        .stop(harness.config.grace(), harness.config.force())
        .await
        .unwrap();
    let second = manager
        .stop(harness.config.grace(), harness.config.force())
        .await
        .unwrap();

    assert!(first.was_running());
    assert!(!second.was_running());
    assert!(!manager.pid_file().exists());
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_start_writes_pid_file() {
    let harness = Harness::new();
    let mut manager = lifecycle(&harness);

    let pid = manager.start().await.unwrap();

    assert_eq!(manager.pid_file().read().unwrap(), pid);
    assert_eq!(manager.current().map(|w| w.pid), Some(pid));
}

#[tokio::test]
async fn test_start_adopts_workload_from_earlier_run() {
    let harness = Harness::new();
    harness
        .inspector
        .spawn(42, "/srv/job/run_training.sh --epochs 90");
    PidFile::with_path(harness.config.workload_pid_path())
        .write(42)
        .unwrap();

    let mut manager = lifecycle(&harness);
    let pid = manager.start().await.unwrap();

    assert_eq!(pid, 42);
    assert_eq!(harness.launcher.launches(), 0);
    assert_eq!(harness.inspector.running(), vec![42]);
    assert_eq!(manager.pid_file().read().unwrap(), 42);
}

#[tokio::test]
async fn test_start_replaces_stale_pid_file() {
    let harness = Harness::new();
    // PID 42 now belongs to an unrelated program
    harness.inspector.spawn(42, "vim notes.txt");
    PidFile::with_path(harness.config.workload_pid_path())
        .write(42)
        .unwrap();

    let mut manager = lifecycle(&harness);
    let pid = manager.start().await.unwrap();

    assert_ne!(pid, 42);
    assert_eq!(harness.launcher.launches(), 1);
    assert!(harness.inspector.is_running(42));
    assert_eq!(manager.pid_file().read().unwrap(), pid);
}

#[tokio::test]
async fn test_start_when_already_running_keeps_process() {
    let harness = Harness::new();
    let mut manager = lifecycle(&harness);

    let first = manager.start().await.unwrap();
    let second = manager.start().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.launcher.launches(), 1);
}

#[tokio::test]
async fn test_start_failure_leaves_no_pid_file() {
    let harness = Harness::new();
    harness.launcher.set_dies_on_launch(true);
    let mut manager = lifecycle(&harness);

    let result = manager.start().await;

    assert!(matches!(result, Err(VigilError::StartError(_))));
    assert!(!manager.pid_file().exists());
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_start_requires_launcher() {
    let harness = Harness::with_config(|config| {
        config.workload.launcher = "/nonexistent/run_training.sh".into();
    });
    let mut manager = lifecycle(&harness);

    let result = manager.start().await;

    assert!(matches!(result, Err(ref e) if e.is_prerequisite()));
    assert_eq!(harness.launcher.launches(), 0);
}

#[tokio::test]
async fn test_adopt_reads_pid_file() {
    let harness = Harness::new();
    harness
        .inspector
        .spawn(555, "/srv/job/run_training.sh --epochs 90");
    PidFile::with_path(harness.config.workload_pid_path())
        .write(555)
        .unwrap();

    let mut manager = lifecycle(&harness);
    let adopted = manager.adopt().map(|w| w.pid);

    assert_eq!(adopted, Some(555));
    assert!(manager.is_alive());
}
