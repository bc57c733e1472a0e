// Shared fakes for process-free supervisor tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::TempDir;
use vigil::config::VigilConfig;
use vigil::error::Result;
use vigil::health::{ResourceSample, ResourceSampler};
use vigil::logs::LogReader;
use vigil::process::{LaunchedWorkload, Launcher, ProcessInspector, SignalKind};
use vigil::supervisor::Collaborators;

/// In-memory process table
#[derive(Default)]
pub struct FakeInspector {
    table: Mutex<BTreeMap<u32, String>>,
    ignores_term: Mutex<BTreeSet<u32>>,
    signals: Mutex<Vec<(u32, SignalKind)>>,
}

impl FakeInspector {
    pub fn spawn(&self, pid: u32, cmdline: &str) {
        self.table.lock().unwrap().insert(pid, cmdline.to_string());
    }

    /// Simulate a crash
    pub fn kill(&self, pid: u32) {
        self.table.lock().unwrap().remove(&pid);
    }

    pub fn kill_all(&self) {
        self.table.lock().unwrap().clear();
    }

    pub fn ignore_sigterm(&self, pid: u32) {
        self.ignores_term.lock().unwrap().insert(pid);
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.table.lock().unwrap().contains_key(&pid)
    }

    pub fn running(&self) -> Vec<u32> {
        self.table.lock().unwrap().keys().copied().collect()
    }

    pub fn signals(&self) -> Vec<(u32, SignalKind)> {
        self.signals.lock().unwrap().clone()
    }
}

impl ProcessInspector for FakeInspector {
    fn list_matching(&self, pattern: &str) -> Result<BTreeSet<u32>> {
        Ok(self
            .table
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cmdline)| cmdline.contains(pattern))
            .map(|(pid, _)| *pid)
            .collect())
    }

    fn signal(&self, pid: u32, kind: SignalKind) -> Result<()> {
        self.signals.lock().unwrap().push((pid, kind));

        let ignores = self.ignores_term.lock().unwrap().contains(&pid);
        if kind == SignalKind::Kill || !ignores {
            self.kill(pid);
        }
        Ok(())
    }
}

/// Launcher that registers a new PID in a `FakeInspector`
pub struct FakeLauncher {
    inspector: Arc<FakeInspector>,
    next_pid: AtomicU32,
    launches: AtomicUsize,
    dies_on_launch: AtomicBool,
}

impl FakeLauncher {
    pub fn new(inspector: Arc<FakeInspector>) -> Self {
        Self {
            inspector,
            next_pid: AtomicU32::new(1000),
            launches: AtomicUsize::new(0),
            dies_on_launch: AtomicBool::new(false),
        }
    }

    /// Make subsequent launches exit before the confirmation window ends
    pub fn set_dies_on_launch(&self, dies: bool) {
        self.dies_on_launch.store(dies, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, config: &VigilConfig) -> Result<LaunchedWorkload> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.launches.fetch_add(1, Ordering::SeqCst);

        if !self.dies_on_launch.load(Ordering::SeqCst) {
            let cmdline = format!(
                "{} {}",
                config.workload.launcher.display(),
                config.workload.args.join(" ")
            );
            self.inspector.spawn(pid, cmdline.trim());
        }

        Ok(LaunchedWorkload { pid, child: None })
    }
}

/// Sampler returning whatever the test last set
pub struct FixedSampler {
    sample: Mutex<ResourceSample>,
}

impl FixedSampler {
    pub fn new() -> Self {
        Self {
            sample: Mutex::new(ResourceSample::neutral()),
        }
    }

    pub fn set(&self, cpu_percent: f32, memory_percent: f32) {
        *self.sample.lock().unwrap() = ResourceSample::new(cpu_percent, memory_percent);
    }
}

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> ResourceSample {
        *self.sample.lock().unwrap()
    }
}

/// Logs held in memory; `mark_start` forgets existing lines
#[derive(Default)]
pub struct MemoryLogs {
    files: Mutex<HashMap<PathBuf, (SystemTime, Vec<String>)>>,
}

impl MemoryLogs {
    pub fn write(&self, log: &Path, modified: SystemTime, lines: &[&str]) {
        let mut files = self.files.lock().unwrap();
        let entry = files
            .entry(log.to_path_buf())
            .or_insert_with(|| (modified, Vec::new()));
        entry.0 = modified;
        entry.1.extend(lines.iter().map(|l| l.to_string()));
    }
}

impl LogReader for MemoryLogs {
    fn recent_lines(&self, log: &Path, n: usize) -> Result<Option<Vec<String>>> {
        Ok(self.files.lock().unwrap().get(log).map(|(_, lines)| {
            let skip = lines.len().saturating_sub(n);
            lines[skip..].to_vec()
        }))
    }

    fn last_modified(&self, log: &Path) -> Result<Option<SystemTime>> {
        Ok(self.files.lock().unwrap().get(log).map(|(modified, _)| *modified))
    }

    fn mark_start(&self, logs: &[PathBuf]) {
        let mut files = self.files.lock().unwrap();
        for log in logs {
            if let Some(entry) = files.get_mut(log) {
                entry.1.clear();
            }
        }
    }
}

/// A configured workload plus the fakes standing in for the OS
pub struct Harness {
    pub temp_dir: TempDir,
    pub config: Arc<VigilConfig>,
    pub inspector: Arc<FakeInspector>,
    pub launcher: Arc<FakeLauncher>,
    pub sampler: Arc<FixedSampler>,
    pub logs: Arc<MemoryLogs>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut VigilConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let launcher_path = temp_dir.path().join("run_training.sh");
        fs::write(&launcher_path, "#!/bin/sh\n").unwrap();

        let mut config = VigilConfig::for_launcher("trainer", &launcher_path);
        config.workload.args = vec!["--epochs".to_string(), "90".to_string()];
        config.paths.state_dir = temp_dir.path().join("state");
        config.termination.grace_secs = 1;
        config.termination.force_secs = 1;
        config.termination.settle_secs = 0;
        config.termination.start_confirm_secs = 0;
        customize(&mut config);

        let inspector = Arc::new(FakeInspector::default());
        let launcher = Arc::new(FakeLauncher::new(Arc::clone(&inspector)));

        Self {
            temp_dir,
            config: Arc::new(config),
            inspector,
            launcher,
            sampler: Arc::new(FixedSampler::new()),
            logs: Arc::new(MemoryLogs::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            inspector: self.inspector.clone(),
            launcher: self.launcher.clone(),
            sampler: self.sampler.clone(),
            logs: self.logs.clone(),
        }
    }

    pub fn workload_log(&self) -> PathBuf {
        self.config.workload_log_path()
    }
}
