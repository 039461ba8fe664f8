//! Error types for the pipe registry.

use crate::pipe::PipeKind;
use crate::value::ValueType;
use thiserror::Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, PipeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipeError {
    #[error("pipe name declared by '{owner}' must not be empty")]
    EmptyName { owner: String },

    #[error("plugin '{0}' is not attached to the registry")]
    NotAttached(String),

    #[error("plugin '{0}' is already attached")]
    AlreadyAttached(String),

    #[error("plugin '{owner}' already declares a pipe named '{name}'")]
    DuplicatePipe { owner: String, name: String },

    #[error("link target '{0}' is not loaded")]
    PluginNotFound(String),

    #[error("plugin '{plugin}' has no pipe named '{pipe}'")]
    PipeNotFound { plugin: String, pipe: String },

    #[error("slot '{slot}' ({slot_type}) cannot bind pipe '{pipe}' ({pipe_type})")]
    Incompatible {
        slot: String,
        slot_type: String,
        pipe: String,
        pipe_type: String,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueType, found: ValueType },

    #[error("pipe '{pipe}' of '{plugin}' is read-only")]
    ReadOnly { plugin: String, pipe: String },

    #[error("pipe '{pipe}' is a {found}, expected a {expected}")]
    WrongKind {
        pipe: String,
        expected: PipeKind,
        found: PipeKind,
    },

    #[error("pipe handle refers to a disposed pipe")]
    StaleRef,

    #[error("pipe '{pipe}' failed: {message}")]
    Callback { pipe: String, message: String },
}
