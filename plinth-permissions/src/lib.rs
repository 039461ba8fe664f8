//! Permission arbitration for Plinth.
//!
//! Plugins contribute [`PermissionHandler`]s to a shared
//! [`PermissionChain`]. Each handler votes [`Vote::Allow`],
//! [`Vote::Deny`] or [`Vote::Abstain`]; a deny from any handler wins.

mod chain;
mod error;
mod handler;

pub use chain::{HandlerId, PermissionChain, Registered};
pub use error::{PermissionError, Result};
pub use handler::{AllowList, FnHandler, PermissionHandler, PlayerId, Vote};
