//! Core type definitions for Plinth.
//!
//! This crate defines the plugin-agnostic types every interop component
//! shares:
//! - Plugin identity ([`PluginId`], [`PluginStatus`], [`Plugin`])
//! - Subscription ownership ([`Owner`])
//! - Invocation ordering ([`Priority`])
//! - The leveled logging collaborator ([`Logger`], [`Severity`])
//!
//! Nothing here knows about events, pipes or permissions; those live in
//! their own crates and depend on this one.

mod id;
mod logger;
mod plugin;
mod priority;
pub mod testing;

pub use id::PluginId;
pub use logger::{Logger, Severity, TracingLogger};
pub use plugin::{Owner, Plugin, PluginStatus};
pub use priority::Priority;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur when constructing core types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    #[error("identifier must not be empty or whitespace")]
    EmptyIdentifier,

    #[error("invalid identifier '{0}': only lowercase letters, digits, '.', '-' and '_' are allowed")]
    InvalidIdentifier(String),

    #[error("illegal status transition for '{plugin_id}': {from} -> {to}")]
    IllegalTransition {
        plugin_id: String,
        from: PluginStatus,
        to: PluginStatus,
    },
}
