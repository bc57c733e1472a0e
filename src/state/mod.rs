// State module - PID records and restart history on disk

mod history;
mod pid;

pub use history::RestartHistory;
pub use pid::PidFile;

use crate::error::{Result, VigilError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `contents` to `path` so concurrent readers never see a partial file
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            VigilError::StateError(format!("Failed to create state directory: {}", e))
        })?;
    }

    // Write to a temporary sibling first, then rename over the target
    let temp_path = path.with_extension("tmp");

    {
        let file = File::create(&temp_path).map_err(|e| {
            VigilError::StateError(format!("Failed to create temp state file: {}", e))
        })?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(contents)
            .map_err(|e| VigilError::StateError(format!("Failed to write state file: {}", e)))?;
        writer
            .flush()
            .map_err(|e| VigilError::StateError(format!("Failed to flush state file: {}", e)))?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        VigilError::StateError(format!("Failed to rename temp state file: {}", e))
    })?;

    Ok(())
}
