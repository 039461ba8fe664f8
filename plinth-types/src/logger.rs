//! Leveled logging collaborator.
//!
//! Components never format or store log lines themselves; they hand
//! `(severity, tag, message)` to an injected [`Logger`]. The host wires
//! [`TracingLogger`] by default, which forwards into `tracing`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a log line, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Error,
    Warn,
    Info,
    Verbose,
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
        };
        f.write_str(s)
    }
}

/// Sink for leveled messages.
pub trait Logger: Send + Sync {
    fn log(&self, severity: Severity, tag: &str, message: &str);

    fn error(&self, tag: &str, message: &str) {
        self.log(Severity::Error, tag, message);
    }

    fn warn(&self, tag: &str, message: &str) {
        self.log(Severity::Warn, tag, message);
    }

    fn debug(&self, tag: &str, message: &str) {
        self.log(Severity::Debug, tag, message);
    }
}

/// Forwards log lines to the `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, severity: Severity, tag: &str, message: &str) {
        match severity {
            Severity::Critical => tracing::error!(tag, critical = true, "{}", message),
            Severity::Error => tracing::error!(tag, "{}", message),
            Severity::Warn => tracing::warn!(tag, "{}", message),
            Severity::Info => tracing::info!(tag, "{}", message),
            Severity::Verbose => tracing::trace!(tag, "{}", message),
            Severity::Debug => tracing::debug!(tag, "{}", message),
        }
    }
}
