// Integration tests against real child processes

#![cfg(unix)]

mod common;

use common::FixedSampler;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;
use vigil::config::VigilConfig;
use vigil::error::VigilError;
use vigil::health::{FailureKind, HealthEvaluator, HealthVerdict};
use vigil::logs::{FileLogReader, LogReader};
use vigil::process::{
    CommandLauncher, LifecycleManager, LivenessProber, ProcessInspector, SystemInspector,
};

fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config_for(temp_dir: &TempDir, launcher: &Path) -> Arc<VigilConfig> {
    let mut config = VigilConfig::for_launcher("worker", launcher);
    config.paths.state_dir = temp_dir.path().join("state");
    config.termination.start_confirm_secs = 1;
    config.termination.grace_secs = 5;
    config.termination.force_secs = 2;
    config.termination.settle_secs = 0;
    Arc::new(config)
}

#[tokio::test]
async fn test_real_workload_traceback_detected_then_stopped() {
    let temp_dir = TempDir::new().unwrap();
    let launcher = write_script(
        temp_dir.path(),
        "vigil_it_worker.sh",
        concat!(
            "echo 'epoch 1 step 1'\n",
            "echo 'Traceback (most recent call last):'\n",
            "while true; do sleep 1; done\n",
        ),
    );
    let config = config_for(&temp_dir, &launcher);

    let inspector: Arc<dyn ProcessInspector> = Arc::new(SystemInspector::new());
    let logs: Arc<dyn LogReader> = Arc::new(FileLogReader::new());
    let evaluator = HealthEvaluator::new(
        Arc::clone(&config),
        LivenessProber::new(Arc::clone(&inspector)),
        Arc::new(FixedSampler::new()),
        logs,
    );
    let mut manager = LifecycleManager::new(
        Arc::clone(&config),
        Arc::clone(&inspector),
        Arc::new(CommandLauncher::new()),
    );

    evaluator.mark_start();
    let pid = manager.start().await.unwrap();
    assert!(manager.is_alive());

    match evaluator.evaluate(manager.current(), SystemTime::now()) {
        HealthVerdict::ErrorDetected { log, failure } => {
            assert_eq!(log, config.workload_log_path());
            assert_eq!(failure.kind, FailureKind::StackTrace);
        }
        other => panic!("Expected a detected traceback, got {:?}", other),
    }

    let report = manager.stop(config.grace(), config.force()).await.unwrap();

    assert!(report.matched >= 1);
    assert_eq!(report.survivors, 0);
    assert!(!inspector
        .list_matching("vigil_it_worker.sh")
        .unwrap()
        .contains(&pid));
    assert!(!manager.pid_file().exists());
}

#[tokio::test]
async fn test_real_workload_exiting_early_fails_start() {
    let temp_dir = TempDir::new().unwrap();
    let launcher = write_script(temp_dir.path(), "vigil_it_crasher.sh", "exit 3\n");
    let config = config_for(&temp_dir, &launcher);

    let mut manager = LifecycleManager::new(
        Arc::clone(&config),
        Arc::new(SystemInspector::new()),
        Arc::new(CommandLauncher::new()),
    );

    let result = manager.start().await;

    assert!(matches!(result, Err(VigilError::StartError(_))));
    assert!(!manager.pid_file().exists());
}
