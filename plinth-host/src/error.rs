//! Error types for the plugin host.

use plinth_events::EventError;
use plinth_permissions::PermissionError;
use plinth_pipes::PipeError;
use plinth_types::TypesError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin already loaded: {0}")]
    PluginAlreadyLoaded(String),

    #[error("dependency cycle involving '{0}'")]
    DependencyCycle(String),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error("invalid host configuration: {0}")]
    Config(#[from] toml::de::Error),
}
