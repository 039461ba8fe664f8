//! Link identifiers and link requests.

use crate::slot::Slot;
use plinth_types::PluginId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a live link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub(crate) u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A link a plugin wants resolved at load time.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub slot: Slot,
    pub target: Option<String>,
    pub pipe: Option<String>,
}

impl LinkRequest {
    pub fn new(slot: Slot, target: impl Into<String>, pipe: impl Into<String>) -> Self {
        Self {
            slot,
            target: Some(target.into()),
            pipe: Some(pipe.into()),
        }
    }

    /// Target plugin id, or `None` when missing or malformed.
    pub fn target_id(&self) -> Option<PluginId> {
        self.target.as_deref().and_then(|raw| PluginId::new(raw).ok())
    }

    /// Pipe name, defaulting to the slot name when not given.
    pub fn pipe_name(&self) -> &str {
        match self.pipe.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.slot.name(),
        }
    }
}

/// Distinct usable targets named by `requests`, in first-seen order.
pub fn link_targets(requests: &[LinkRequest]) -> Vec<PluginId> {
    let mut targets: Vec<PluginId> = Vec::new();
    for target in requests.iter().filter_map(LinkRequest::target_id) {
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

/// Snapshot of a live link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub id: LinkId,
    pub consumer: PluginId,
    pub slot: String,
    pub target: PluginId,
    pub pipe: String,
}
