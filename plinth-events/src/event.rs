//! Event kinds and subscription handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A kind of occurrence that can be published on the bus.
///
/// Each implementing type is one event kind. Subscribers register a
/// callback shaped for that type, so the bus routes payloads without
/// knowing anything about their contents.
///
/// ```
/// use plinth_events::Event;
///
/// struct PlayerConnected {
///     name: String,
/// }
///
/// impl Event for PlayerConnected {
///     const NAME: &'static str = "player.connected";
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    /// Stable name used in logs and buffering configuration.
    const NAME: &'static str;
}

/// Handle identifying a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
