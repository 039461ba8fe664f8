//! Test helpers shared across the Plinth crates.

use crate::{Logger, Severity};
use std::sync::Mutex;

/// A single captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub severity: Severity,
    pub tag: String,
    pub message: String,
}

/// Logger that keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<LogLine>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all captured lines.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Returns the captured lines at exactly `severity`.
    pub fn at(&self, severity: Severity) -> Vec<LogLine> {
        self.lines()
            .into_iter()
            .filter(|l| l.severity == severity)
            .collect()
    }

    /// Whether any line at `severity` contains `needle`.
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.at(severity).iter().any(|l| l.message.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn log(&self, severity: Severity, tag: &str, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(LogLine {
                severity,
                tag: tag.to_string(),
                message: message.to_string(),
            });
        }
    }
}
