//! Error types for the event bus.

use thiserror::Error;

/// Result type for bus configuration calls.
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors raised by bus configuration. Dispatch never fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The stream already switched to direct dispatch.
    #[error("event stream '{event}' is already flowing; its threshold can no longer change")]
    AlreadyFlowing { event: &'static str },
}
