//! Votes and the handler seam.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::RwLock;
use uuid::Uuid;

/// A handler's answer to a permission query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Deny,
    Allow,
    /// No opinion; later handlers decide.
    Abstain,
}

impl Vote {
    pub fn is_allow(self) -> bool {
        self == Self::Allow
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deny => "deny",
            Self::Allow => "allow",
            Self::Abstain => "abstain",
        };
        f.write_str(s)
    }
}

/// Identifies the player a permission is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// A fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PlayerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A voter in the permission chain.
///
/// Handlers are consulted in registration order and must not block.
pub trait PermissionHandler: Send + Sync {
    /// Unique name; the chain keeps one handler per name.
    fn name(&self) -> &str;

    fn check(&self, player: &PlayerId, permission: &str) -> Vote;
}

/// Adapts a closure into a [`PermissionHandler`].
pub struct FnHandler<F> {
    name: String,
    check: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&PlayerId, &str) -> Vote + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> PermissionHandler for FnHandler<F>
where
    F: Fn(&PlayerId, &str) -> Vote + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, player: &PlayerId, permission: &str) -> Vote {
        (self.check)(player, permission)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// The built-in handler: allows listed permissions, abstains otherwise.
#[derive(Debug, Default)]
pub struct AllowList {
    names: RwLock<BTreeSet<String>>,
}

impl AllowList {
    pub const NAME: &'static str = "default";

    pub(crate) fn insert(&self, name: String) -> bool {
        self.names
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name)
    }

    pub(crate) fn remove(&self, name: &str) -> bool {
        self.names
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(name)
    }

    /// Listed permissions, sorted.
    pub fn names(&self) -> Vec<String> {
        self.names
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

impl PermissionHandler for AllowList {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, _player: &PlayerId, permission: &str) -> Vote {
        if self.contains(permission) {
            Vote::Allow
        } else {
            Vote::Abstain
        }
    }
}
