// PID file management

use super::write_atomic;
use crate::error::{Result, VigilError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A single-integer PID record on disk
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Record `pid` in the file
    pub fn write(&self, pid: u32) -> Result<()> {
        write_atomic(&self.path, format!("{}\n", pid).as_bytes())
    }

    /// Record the PID of the calling process
    pub fn write_current(&self) -> Result<()> {
        self.write(std::process::id())
    }

    /// Read the PID from the file
    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| VigilError::StateError(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| VigilError::StateError(format!("Invalid PID in file: {}", e)))
    }

    /// Read the PID, treating a missing or garbled file as "no PID"
    pub fn read_optional(&self) -> Option<u32> {
        if !self.exists() {
            return None;
        }
        match self.read() {
            Ok(pid) if pid > 0 => Some(pid),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Ignoring PID file: {}", e);
                None
            }
        }
    }

    /// When the PID was recorded
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the PID file; a missing file is not an error
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VigilError::StateError(format!(
                "Failed to remove PID file: {}",
                e
            ))),
        }
    }

    /// Whether the recorded PID belongs to a live process
    pub fn is_process_running(&self) -> bool {
        match self.read_optional() {
            Some(pid) => is_pid_alive(pid),
            None => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Signal-0 probe for process existence
#[cfg(unix)]
pub(crate) fn is_pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(nix::errno::Errno::EPERM) => true, // exists, owned by someone else
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub(crate) fn is_pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_pid() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(temp_dir.path().join("workload.pid"));

        pid_file.write(4242).unwrap();
        assert_eq!(pid_file.read().unwrap(), 4242);
        assert_eq!(pid_file.read_optional(), Some(4242));
        assert!(pid_file.modified().is_some());
    }

    #[test]
    fn test_read_optional_missing_and_garbled() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(temp_dir.path().join("workload.pid"));

        assert_eq!(pid_file.read_optional(), None);

        fs::write(pid_file.path(), "not-a-pid").unwrap();
        assert_eq!(pid_file.read_optional(), None);
        assert!(pid_file.read().is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(temp_dir.path().join("workload.pid"));

        pid_file.write(1).unwrap();
        pid_file.remove().unwrap();
        assert!(!pid_file.exists());
        pid_file.remove().unwrap();
    }

    #[test]
    fn test_current_process_is_running() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(temp_dir.path().join("supervisor.pid"));

        pid_file.write_current().unwrap();
        assert!(pid_file.is_process_running());

        pid_file.remove().unwrap();
        assert!(!pid_file.is_process_running());
    }
}
