// Restart history log - one unix timestamp per line

use super::write_atomic;
use crate::error::{Result, VigilError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Append-only record of restart events, pruned to a sliding window
#[derive(Debug, Clone, Default)]
pub struct RestartHistory {
    /// Backing file; `None` keeps the history in memory only
    path: Option<PathBuf>,
    /// Event timestamps, oldest first
    events: Vec<SystemTime>,
}

impl RestartHistory {
    /// History that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the history stored at `path`; a missing file is an empty history
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let events = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| {
                VigilError::StateError(format!("Failed to read restart history: {}", e))
            })?;
            // Undecodable bytes become U+FFFD and the line is skipped as malformed
            parse_events(&String::from_utf8_lossy(&bytes))
        } else {
            Vec::new()
        };

        Ok(Self {
            path: Some(path),
            events,
        })
    }

    /// Append a restart event
    pub fn record(&mut self, at: SystemTime) -> Result<()> {
        self.events.push(at);
        self.events.sort();
        self.persist()
    }

    /// Drop events at or before `now - window`, returning how many remain
    pub fn prune(&mut self, now: SystemTime, window: Duration) -> Result<usize> {
        let before = self.events.len();

        self.events.retain(|&at| match now.duration_since(at) {
            Ok(age) => age < window,
            // Timestamps in the future (clock step) are kept
            Err(_) => true,
        });

        if self.events.len() != before {
            self.persist()?;
        }

        Ok(self.events.len())
    }

    /// Wipe the history entirely
    pub fn clear(&mut self) -> Result<()> {
        self.events.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<SystemTime> {
        self.events.last().copied()
    }

    pub fn events(&self) -> &[SystemTime] {
        &self.events
    }

    /// Count events newer than `now - window` without mutating anything
    pub fn count_within(&self, now: SystemTime, window: Duration) -> usize {
        self.events
            .iter()
            .filter(|&&at| {
                now.duration_since(at)
                    .map(|age| age < window)
                    .unwrap_or(true)
            })
            .count()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let mut content = String::new();
        for at in &self.events {
            content.push_str(&format_timestamp(*at));
            content.push('\n');
        }

        write_atomic(path, content.as_bytes())
    }
}

fn format_timestamp(at: SystemTime) -> String {
    let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!(
        "{}.{:03}",
        since_epoch.as_secs(),
        since_epoch.subsec_millis()
    )
}

fn parse_events(content: &str) -> Vec<SystemTime> {
    let mut events: Vec<SystemTime> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                Some(UNIX_EPOCH + Duration::from_secs_f64(secs))
            }
            _ => {
                tracing::warn!(line, "Skipping malformed restart history entry");
                None
            }
        })
        .collect();
    events.sort();
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_record_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("restarts.log");

        let mut history = RestartHistory::load(&path).unwrap();
        assert!(history.is_empty());

        history.record(at(1_000)).unwrap();
        history.record(at(1_060)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "1000.000\n1060.000\n");

        let reloaded = RestartHistory::load(&path).unwrap();
        assert_eq!(reloaded.events(), &[at(1_000), at(1_060)]);
        assert_eq!(reloaded.last(), Some(at(1_060)));
    }

    #[test]
    fn test_prune_sliding_window() {
        let mut history = RestartHistory::in_memory();
        history.record(at(100)).unwrap();
        history.record(at(500)).unwrap();
        history.record(at(900)).unwrap();

        // window of 500s at t=1000 keeps strictly newer than t=500
        let remaining = history.prune(at(1_000), Duration::from_secs(500)).unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(history.events(), &[at(900)]);
    }

    #[test]
    fn test_prune_persists_changes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("restarts.log");

        let mut history = RestartHistory::load(&path).unwrap();
        history.record(at(10)).unwrap();
        history.record(at(3_000)).unwrap();
        history.prune(at(3_600), Duration::from_secs(3_000)).unwrap();

        let reloaded = RestartHistory::load(&path).unwrap();
        assert_eq!(reloaded.events(), &[at(3_000)]);
    }

    #[test]
    fn test_clear_empties_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("restarts.log");

        let mut history = RestartHistory::load(&path).unwrap();
        history.record(at(10)).unwrap();
        history.clear().unwrap();

        assert!(history.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("restarts.log");
        fs::write(&path, "1700000000.500\ngarbage\n\n1600000000\n").unwrap();

        let history = RestartHistory::load(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.events()[0], at(1_600_000_000));
    }

    #[test]
    fn test_non_utf8_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("restarts.log");
        fs::write(&path, b"1700000000
\xFF\xFE
1700000060
").unwrap();

        let history = RestartHistory::load(&path).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last(), Some(at(1_700_000_060)));
    }

    #[test]
    fn test_count_within_does_not_mutate() {
        let mut history = RestartHistory::in_memory();
        history.record(at(100)).unwrap();
        history.record(at(950)).unwrap();

        assert_eq!(history.count_within(at(1_000), Duration::from_secs(100)), 1);
        assert_eq!(history.len(), 2);
    }
}
