//! The capability surface a plugin registers with the host.
//!
//! Plugins build a [`Manifest`] explicitly: the pipes they expose, the
//! slots they want linked, the events they react to and the permission
//! handlers they contribute. The host applies it across the lifecycle.

use futures::future::BoxFuture;
use plinth_events::{Event, EventBus, SubscriptionId};
use plinth_permissions::PermissionHandler;
use plinth_pipes::{LinkRequest, PipeDecl, Slot, link_targets};
use plinth_types::{Owner, PluginId, Priority};
use std::fmt;
use std::sync::Arc;

type Subscribe = Arc<dyn Fn(&EventBus, &Owner) -> SubscriptionId + Send + Sync>;

/// An event subscription applied each time the plugin is enabled.
#[derive(Clone)]
pub struct EventBinding {
    event: &'static str,
    priority: Priority,
    subscribe: Subscribe,
}

impl EventBinding {
    pub fn new<E, F>(priority: Priority, callback: F) -> Self
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        Self {
            event: E::NAME,
            priority,
            subscribe: Arc::new(move |bus: &EventBus, owner: &Owner| {
                let callback = Arc::clone(&callback);
                bus.subscribe(owner.clone(), priority, move |event: &mut E| callback(event))
            }),
        }
    }

    pub fn new_async<E, F>(priority: Priority, callback: F) -> Self
    where
        E: Event,
        F: Fn(&E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        Self {
            event: E::NAME,
            priority,
            subscribe: Arc::new(move |bus: &EventBus, owner: &Owner| {
                let callback = Arc::clone(&callback);
                bus.subscribe_async(owner.clone(), priority, move |event: &E| callback(event))
            }),
        }
    }

    pub fn event(&self) -> &'static str {
        self.event
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn apply(&self, bus: &EventBus, owner: &Owner) -> SubscriptionId {
        (self.subscribe)(bus, owner)
    }
}

impl fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBinding")
            .field("event", &self.event)
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Default, Clone)]
pub struct Manifest {
    pub(crate) pipes: Vec<PipeDecl>,
    pub(crate) links: Vec<LinkRequest>,
    pub(crate) events: Vec<EventBinding>,
    pub(crate) handlers: Vec<Arc<dyn PermissionHandler>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes a pipe.
    #[must_use]
    pub fn pipe(mut self, decl: PipeDecl) -> Self {
        self.pipes.push(decl);
        self
    }

    /// Asks for `slot` to be linked to `pipe` on `target` at load time.
    #[must_use]
    pub fn link(mut self, slot: &Slot, target: impl Into<String>, pipe: impl Into<String>) -> Self {
        self.links.push(LinkRequest::new(slot.clone(), target, pipe));
        self
    }

    #[must_use]
    pub fn link_request(mut self, request: LinkRequest) -> Self {
        self.links.push(request);
        self
    }

    /// Subscribes to `E` while the plugin is enabled.
    #[must_use]
    pub fn on<E, F>(mut self, priority: Priority, callback: F) -> Self
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.push(EventBinding::new::<E, F>(priority, callback));
        self
    }

    #[must_use]
    pub fn on_async<E, F>(mut self, priority: Priority, callback: F) -> Self
    where
        E: Event,
        F: Fn(&E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.events.push(EventBinding::new_async::<E, F>(priority, callback));
        self
    }

    #[must_use]
    pub fn permission_handler(mut self, handler: Arc<dyn PermissionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn links(&self) -> &[LinkRequest] {
        &self.links
    }

    pub fn events(&self) -> &[EventBinding] {
        &self.events
    }

    /// Plugins this manifest links against, in first-seen order.
    pub fn dependencies(&self) -> Vec<PluginId> {
        link_targets(&self.links)
    }
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manifest")
            .field("pipes", &self.pipes.iter().map(PipeDecl::name).collect::<Vec<_>>())
            .field("links", &self.links.len())
            .field("events", &self.events)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_pipes::ValueType;

    #[test]
    fn dependencies_skip_blank_targets_and_duplicates() {
        let slot = |name: &str| Slot::value(name, ValueType::Any);
        let manifest = Manifest::new()
            .link(&slot("rate"), "economy", "rate")
            .link(&slot("prefix"), "chat", "prefix")
            .link(&slot("balance"), "ECONOMY", "balance")
            .link(&slot("ghost"), " ", "ghost");

        assert_eq!(
            manifest.dependencies(),
            vec![PluginId::new("economy").unwrap(), PluginId::new("chat").unwrap()]
        );
    }
}
