use crate::error::{Result, VigilError};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// One line appended to a watched log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Short label for the log the line came from
    pub source: String,
    pub text: String,
}

/// Where a stream starts reading each log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    /// Replay the whole file
    Beginning,
    /// Only lines appended after the stream was created
    End,
}

/// A stream of lines appended to a set of log files
///
/// Logs that do not exist yet are picked up once they appear; a log that is
/// truncated is re-read from its start.
pub struct LogStream {
    receiver: mpsc::Receiver<LogLine>,
    task_handle: tokio::task::JoinHandle<()>,
}

impl LogStream {
    pub async fn new(logs: Vec<PathBuf>, start_at: StartAt) -> Self {
        let (tx, rx) = mpsc::channel(100);

        let mut tailers = Vec::with_capacity(logs.len());
        for path in logs {
            tailers.push(LogTailer::new(path, start_at).await);
        }

        let task_handle = tokio::spawn(async move {
            loop {
                let mut has_data = false;

                for tailer in tailers.iter_mut() {
                    // Bounded batch per log per pass
                    for _ in 0..64 {
                        match tailer.read_next().await {
                            Ok(Some(line)) => {
                                if tx.send(line).await.is_err() {
                                    return;
                                }
                                has_data = true;
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::debug!("{}", e);
                                break;
                            }
                        }
                    }
                }

                if !has_data {
                    sleep(Duration::from_millis(100)).await;
                }
            }
        });

        Self {
            receiver: rx,
            task_handle,
        }
    }

    /// Receive the next line
    ///
    /// # Returns
    /// * `Some(LogLine)` - Next appended line
    /// * `None` - Stream has ended
    pub async fn next(&mut self) -> Option<LogLine> {
        self.receiver.recv().await
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

/// Follows a single log file
struct LogTailer {
    path: PathBuf,
    source: String,
    reader: Option<BufReader<File>>,
    position: u64,
}

impl LogTailer {
    async fn new(path: PathBuf, start_at: StartAt) -> Self {
        let position = match start_at {
            StartAt::Beginning => 0,
            StartAt::End => tokio::fs::metadata(&path)
                .await
                .map(|m| m.len())
                .unwrap_or(0),
        };

        Self {
            source: source_label(&path),
            path,
            reader: None,
            position,
        }
    }

    async fn read_next(&mut self) -> Result<Option<LogLine>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.len(),
            // Not created yet
            Err(_) => return Ok(None),
        };

        if len < self.position {
            self.position = 0;
            self.reader = None;
        }

        if self.reader.is_none() {
            let file = File::open(&self.path).await.map_err(|e| {
                VigilError::LogError(format!("Failed to open {}: {}", self.path.display(), e))
            })?;

            let mut reader = BufReader::new(file);
            reader
                .seek(std::io::SeekFrom::Start(self.position))
                .await
                .map_err(|e| VigilError::LogError(format!("Failed to seek in log file: {}", e)))?;

            self.reader = Some(reader);
        }

        let Some(ref mut reader) = self.reader else {
            return Ok(None);
        };

        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => Ok(None),
            Ok(_) if !line.ends_with('\n') => {
                // Partial line; wait for the writer to finish it
                reader
                    .seek(std::io::SeekFrom::Start(self.position))
                    .await
                    .map_err(|e| {
                        VigilError::LogError(format!("Failed to seek in log file: {}", e))
                    })?;
                Ok(None)
            }
            Ok(n) => {
                self.position += n as u64;
                Ok(Some(LogLine {
                    source: self.source.clone(),
                    text: line.trim_end().to_string(),
                }))
            }
            Err(e) => {
                self.reader = None;
                Err(VigilError::LogError(format!("Failed to read log line: {}", e)))
            }
        }
    }
}

fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
