//! Plugin identity and lifecycle status.

use crate::{PluginId, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a plugin, driven by the external loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    #[default]
    Loaded,
    Enabling,
    Enabled,
    Disabling,
    Disabled,
    Destroyed,
}

impl PluginStatus {
    /// Whether the plugin currently accepts event-pipe deliveries.
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }

    /// Whether the plugin has been torn down.
    pub fn is_destroyed(self) -> bool {
        self == Self::Destroyed
    }

    /// Returns `true` if moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: PluginStatus) -> bool {
        use PluginStatus::*;
        match (self, next) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Loaded | Disabled, Enabling) => true,
            (Enabling, Enabled | Disabled) => true,
            (Enabled, Disabling) => true,
            (Disabling, Disabled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "loaded",
            Self::Enabling => "enabling",
            Self::Enabled => "enabled",
            Self::Disabling => "disabling",
            Self::Disabled => "disabled",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Identity record for a plugin as handed over by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    id: PluginId,
    status: PluginStatus,
}

impl Plugin {
    /// Creates a freshly loaded plugin identity.
    pub fn new(id: PluginId) -> Self {
        Self {
            id,
            status: PluginStatus::Loaded,
        }
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    pub fn status(&self) -> PluginStatus {
        self.status
    }

    /// Moves the plugin to `next`, rejecting steps outside the lifecycle graph.
    pub fn transition(&mut self, next: PluginStatus) -> Result<(), TypesError> {
        if !self.status.can_transition_to(next) {
            return Err(TypesError::IllegalTransition {
                plugin_id: self.id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Owner of a subscription or handler: either a plugin or a host module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    Plugin(PluginId),
    Module(String),
}

impl Owner {
    /// Returns the plugin id if this owner is a plugin.
    pub fn plugin_id(&self) -> Option<&PluginId> {
        match self {
            Self::Plugin(id) => Some(id),
            Self::Module(_) => None,
        }
    }
}

impl From<PluginId> for Owner {
    fn from(id: PluginId) -> Self {
        Self::Plugin(id)
    }
}

impl From<&PluginId> for Owner {
    fn from(id: &PluginId) -> Self {
        Self::Plugin(id.clone())
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(id) => write!(f, "{id}"),
            Self::Module(name) => write!(f, "module:{name}"),
        }
    }
}
