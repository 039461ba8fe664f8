//! The permission chain.
//!
//! Handlers vote in registration order, starting with the built-in
//! [`AllowList`]. The running result starts at `Deny` and each vote
//! overwrites it; the first `Deny` ends the walk. When no handler denies,
//! the last handler's vote stands, so a trailing `Abstain` overrides an
//! earlier `Allow`.

use crate::error::{PermissionError, Result};
use crate::handler::{AllowList, PermissionHandler, PlayerId, Vote};
use plinth_types::{Logger, PluginId};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const TAG: &str = "permissions";

/// Handle returned by [`PermissionChain::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// The built-in allow-list handler.
    pub const DEFAULT: HandlerId = HandlerId(0);
}

/// Outcome of [`PermissionChain::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Added(HandlerId),
    /// The owner already had a handler by that name.
    Existing(HandlerId),
}

impl Registered {
    pub fn id(self) -> HandlerId {
        match self {
            Self::Added(id) | Self::Existing(id) => id,
        }
    }

    pub fn is_added(self) -> bool {
        matches!(self, Self::Added(_))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

struct Entry {
    id: HandlerId,
    owner: Option<PluginId>,
    handler: Arc<dyn PermissionHandler>,
}

/// Ordered set of permission handlers.
pub struct PermissionChain {
    handlers: RwLock<Vec<Entry>>,
    defaults: Arc<AllowList>,
    next_id: AtomicU64,
    logger: Arc<dyn Logger>,
}

impl PermissionChain {
    /// Creates a chain whose default handler allows `defaults`.
    pub fn new<I, S>(defaults: I, logger: Arc<dyn Logger>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = Arc::new(AllowList::default());
        for name in defaults {
            if let Some(name) = normalize(name.as_ref()) {
                list.insert(name);
            }
        }
        Self {
            handlers: RwLock::new(vec![Entry {
                id: HandlerId::DEFAULT,
                owner: None,
                handler: Arc::clone(&list) as Arc<dyn PermissionHandler>,
            }]),
            defaults: list,
            next_id: AtomicU64::new(1),
            logger,
        }
    }

    // ================================================================
    // Handlers
    // ================================================================

    /// Appends `handler` to the chain.
    ///
    /// Handler names are scoped by owner: registering a name the same owner
    /// already holds adds nothing and returns the existing id. Different
    /// owners may use the same name.
    pub fn register(&self, owner: Option<PluginId>, handler: Arc<dyn PermissionHandler>) -> Registered {
        let mut handlers = self.write();
        if let Some(existing) = handlers
            .iter()
            .find(|e| e.id != HandlerId::DEFAULT && e.owner == owner && e.handler.name() == handler.name())
        {
            let id = existing.id;
            drop(handlers);
            let by = owner.as_ref().map_or_else(|| "the host".to_string(), PluginId::to_string);
            self.logger.warn(
                TAG,
                &format!("permission handler '{}' is already registered by {by}", handler.name()),
            );
            return Registered::Existing(id);
        }
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        handlers.push(Entry { id, owner, handler });
        Registered::Added(id)
    }

    /// Removes one handler. The default handler cannot be removed.
    pub fn unregister(&self, id: HandlerId) -> bool {
        if id == HandlerId::DEFAULT {
            self.logger.warn(TAG, "the default permission handler cannot be removed");
            return false;
        }
        let mut handlers = self.write();
        let before = handlers.len();
        handlers.retain(|e| e.id != id);
        handlers.len() != before
    }

    /// Removes every handler registered by `owner`.
    pub fn unregister_owner(&self, owner: &PluginId) -> usize {
        let mut handlers = self.write();
        let before = handlers.len();
        handlers.retain(|e| e.id == HandlerId::DEFAULT || e.owner.as_ref() != Some(owner));
        before - handlers.len()
    }

    /// Handler names in evaluation order.
    pub fn handler_names(&self) -> Vec<String> {
        self.read().iter().map(|e| e.handler.name().to_string()).collect()
    }

    // ================================================================
    // Default allow-list
    // ================================================================

    /// Adds `name` to the default allow-list. Returns `false` if it was
    /// already listed.
    pub fn add_permission(&self, name: &str) -> Result<bool> {
        let name = normalize(name).ok_or(PermissionError::EmptyName)?;
        if self.defaults.insert(name.clone()) {
            Ok(true)
        } else {
            self.logger.warn(TAG, &format!("permission '{name}' is already allowed by default"));
            Ok(false)
        }
    }

    pub fn remove_permission(&self, name: &str) -> bool {
        normalize(name).is_some_and(|name| self.defaults.remove(&name))
    }

    pub fn defaults(&self) -> &AllowList {
        &self.defaults
    }

    // ================================================================
    // Evaluation
    // ================================================================

    /// Asks every handler about `permission` for `player`.
    ///
    /// A handler that panics counts as a `Deny`.
    pub fn check(&self, player: &PlayerId, permission: &str) -> Vote {
        let Some(permission) = normalize(permission) else {
            return Vote::Deny;
        };
        let handlers: Vec<Arc<dyn PermissionHandler>> =
            self.read().iter().map(|e| Arc::clone(&e.handler)).collect();

        let mut result = Vote::Deny;
        for handler in handlers {
            result = match panic::catch_unwind(AssertUnwindSafe(|| handler.check(player, &permission))) {
                Ok(vote) => vote,
                Err(panic) => {
                    self.logger.error(
                        TAG,
                        &format!(
                            "handler '{}' panicked on '{permission}': {}",
                            handler.name(),
                            panic_message(panic.as_ref())
                        ),
                    );
                    Vote::Deny
                }
            };
            if result == Vote::Deny {
                self.logger.debug(
                    TAG,
                    &format!("'{permission}' denied for {player} by '{}'", handler.name()),
                );
                return Vote::Deny;
            }
        }
        result
    }

    /// Whether `permission` resolves to `Allow`.
    pub fn is_allowed(&self, player: &PlayerId, permission: &str) -> bool {
        self.check(player, permission).is_allow()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for PermissionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionChain")
            .field("handlers", &self.handler_names())
            .field("defaults", &self.defaults)
            .finish()
    }
}

fn normalize(name: &str) -> Option<String> {
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_lowercase())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
