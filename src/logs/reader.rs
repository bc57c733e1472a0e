use crate::error::{Result, VigilError};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::debug;

/// How far back from the end of a log `recent_lines` looks
const TAIL_BYTES: u64 = 256 * 1024;

/// Read-only access to the workload's output logs
pub trait LogReader: Send + Sync {
    /// Last `n` lines of `log`, oldest first. `None` when the log does not exist.
    fn recent_lines(&self, log: &Path, n: usize) -> Result<Option<Vec<String>>>;

    /// Modification time of `log`. `None` when the log does not exist.
    fn last_modified(&self, log: &Path) -> Result<Option<SystemTime>>;

    /// Forget everything written to `logs` so far; called before each start
    fn mark_start(&self, _logs: &[PathBuf]) {}
}

/// `LogReader` over plain files
///
/// Keeps a byte offset per log recorded at the last `mark_start`; lines
/// before it belong to an earlier incarnation of the workload and are never
/// returned.
#[derive(Debug, Default)]
pub struct FileLogReader {
    baselines: Mutex<HashMap<PathBuf, u64>>,
}

impl FileLogReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn baseline(&self, log: &Path) -> u64 {
        self.baselines
            .lock()
            .ok()
            .and_then(|baselines| baselines.get(log).copied())
            .unwrap_or(0)
    }
}

impl LogReader for FileLogReader {
    fn recent_lines(&self, log: &Path, n: usize) -> Result<Option<Vec<String>>> {
        let mut file = match File::open(log) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VigilError::LogError(format!(
                    "Failed to open {}: {}",
                    log.display(),
                    e
                )))
            }
        };

        let len = file.metadata()?.len();
        let mut baseline = self.baseline(log);
        if baseline > len {
            // Truncated or replaced since the workload started
            debug!(log = %log.display(), "Log shrank below its baseline, reading from start");
            baseline = 0;
        }

        let start = baseline.max(len.saturating_sub(TAIL_BYTES));
        file.seek(SeekFrom::Start(start))?;

        let mut buffer = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| VigilError::LogError(format!("Failed to read {}: {}", log.display(), e)))?;

        let text = String::from_utf8_lossy(&buffer);
        let mut lines: Vec<&str> = text.lines().collect();
        if start > baseline && !lines.is_empty() {
            // Started mid-line
            lines.remove(0);
        }

        let skip = lines.len().saturating_sub(n);
        Ok(Some(lines[skip..].iter().map(|l| l.to_string()).collect()))
    }

    fn last_modified(&self, log: &Path) -> Result<Option<SystemTime>> {
        match fs::metadata(log) {
            Ok(metadata) => Ok(Some(metadata.modified()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VigilError::LogError(format!(
                "Failed to stat {}: {}",
                log.display(),
                e
            ))),
        }
    }

    fn mark_start(&self, logs: &[PathBuf]) {
        let Ok(mut baselines) = self.baselines.lock() else {
            return;
        };

        for log in logs {
            let offset = fs::metadata(log).map(|m| m.len()).unwrap_or(0);
            baselines.insert(log.clone(), offset);
        }
    }
}
