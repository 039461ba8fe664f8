//! Plugin host for Plinth.
//!
//! Wires the event bus, pipe registry and permission chain into one
//! [`Interop`] context and drives plugins through their lifecycle:
//!
//! - `load`: attach, declare pipes, resolve links, register permission handlers
//! - `enable`: subscribe event bindings
//! - `disable`: drop subscriptions
//! - `unload`: dispose links and pipes, drop handlers and subscriptions
//!
//! Plugins describe what they expose and consume with a [`Manifest`].

mod config;
mod error;
mod host;
mod interop;
mod manifest;

pub use config::{HostConfig, PermissionsConfig, PoolConfig};
pub use error::{HostError, Result};
pub use host::{LoadReport, PluginHost, dependency_order};
pub use interop::Interop;
pub use manifest::{EventBinding, Manifest};
