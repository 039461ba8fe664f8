use crate::event::SubscriptionId;
use futures::future::BoxFuture;
use plinth_types::{Owner, Priority};
use std::sync::Arc;

/// Synchronous subscriber callback.
pub type SyncCallback<E> = Arc<dyn Fn(&mut E) -> anyhow::Result<()> + Send + Sync>;

/// Asynchronous subscriber callback. The returned future is spawned, not awaited.
pub type AsyncCallback<E> =
    Arc<dyn Fn(&E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Scope filter deciding whether a subscriber sees a given payload.
pub type ScopeFilter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

pub(crate) enum Callback<E> {
    Sync(SyncCallback<E>),
    Async(AsyncCallback<E>),
}

pub(crate) struct Subscription<E> {
    pub(crate) id: SubscriptionId,
    pub(crate) owner: Owner,
    pub(crate) priority: Priority,
    pub(crate) filter: Option<ScopeFilter<E>>,
    pub(crate) callback: Callback<E>,
}

impl<E> Subscription<E> {
    pub(crate) fn new(
        owner: Owner,
        priority: Priority,
        filter: Option<ScopeFilter<E>>,
        callback: Callback<E>,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            owner,
            priority,
            filter,
            callback,
        }
    }
}
