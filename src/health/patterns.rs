use serde::Serialize;
use std::fmt;

/// Broad class of a failure marker found in a workload log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The workload was killed or ran out of memory
    Killed,
    /// A crash with a stack trace or fatal signal
    StackTrace,
    /// A generic error or exception report
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Killed => write!(f, "killed"),
            FailureKind::StackTrace => write!(f, "stack trace"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

struct Marker {
    kind: FailureKind,
    text: &'static str,
    ignore_case: bool,
}

const fn marker(kind: FailureKind, text: &'static str) -> Marker {
    Marker {
        kind,
        text,
        ignore_case: false,
    }
}

const fn phrase(kind: FailureKind, text: &'static str) -> Marker {
    Marker {
        kind,
        text,
        ignore_case: true,
    }
}

/// Failure taxonomy, checked in order for each line
const FAILURE_MARKERS: &[Marker] = &[
    marker(FailureKind::Killed, "Killed"),
    marker(FailureKind::Killed, "SIGKILL"),
    marker(FailureKind::Killed, "SIGTERM"),
    marker(FailureKind::Killed, "Terminated"),
    marker(FailureKind::Killed, "OOM"),
    phrase(FailureKind::Killed, "out of memory"),
    marker(FailureKind::StackTrace, "Traceback (most recent call last)"),
    marker(FailureKind::StackTrace, "panicked at"),
    marker(FailureKind::StackTrace, "stack backtrace"),
    phrase(FailureKind::StackTrace, "segmentation fault"),
    phrase(FailureKind::StackTrace, "core dumped"),
    marker(FailureKind::Error, "RuntimeError"),
    marker(FailureKind::Error, "CUDA error"),
    marker(FailureKind::Error, "Exception"),
    marker(FailureKind::Error, "FATAL"),
    marker(FailureKind::Error, "ERROR"),
];

/// A failure marker and the log line it was found on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureMatch {
    pub kind: FailureKind,
    pub marker: &'static str,
    pub line: String,
}

impl fmt::Display for FailureMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} marker '{}' in: {}", self.kind, self.marker, self.line.trim())
    }
}

/// Scan `lines` (oldest first) for a failure marker, newest line first
pub fn scan_lines<S: AsRef<str>>(lines: &[S]) -> Option<FailureMatch> {
    lines
        .iter()
        .rev()
        .find_map(|line| match_line(line.as_ref()))
}

/// First marker from the taxonomy that appears in `line`
pub fn match_line(line: &str) -> Option<FailureMatch> {
    let lowered = line.to_lowercase();

    FAILURE_MARKERS
        .iter()
        .find(|m| {
            if m.ignore_case {
                lowered.contains(m.text)
            } else {
                line.contains(m.text)
            }
        })
        .map(|m| FailureMatch {
            kind: m.kind,
            marker: m.text,
            line: line.to_string(),
        })
}
