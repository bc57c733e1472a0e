// Logs module - Read-only access to the workload's output logs

mod reader;
mod stream;

pub use reader::{FileLogReader, LogReader};
pub use stream::{LogLine, LogStream, StartAt};
