//! The event bus.
//!
//! Subscriptions are kept per event kind, sorted by [`Priority`] (lower
//! values first, ties in registration order). `publish` dispatches
//! synchronously; each subscriber runs in isolation so that an error or a
//! panic in one never reaches the publisher or the remaining subscribers.
//!
//! Streams configured with a required-subscriber threshold buffer
//! published items until enough subscribers are present, then flush them
//! in publish order and switch to direct dispatch for good.

use crate::error::{EventError, Result};
use crate::event::{Event, SubscriptionId};
use crate::pool::{ArgPool, Poolable, Pooled};
use crate::stream::{Admission, ErasedStream, Flush, Payload, Stream, ThresholdChange};
use crate::subscription::{Callback, Subscription};
use futures::FutureExt;
use futures::future::BoxFuture;
use plinth_types::{Logger, Owner, Priority, Severity};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;

const TAG: &str = "events";

/// Bus configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Required-subscriber thresholds keyed by [`Event::NAME`].
    #[serde(default)]
    pub thresholds: HashMap<String, usize>,
}

impl BusConfig {
    /// Threshold configured for `event`, zero when absent.
    pub fn threshold_for(&self, event: &str) -> usize {
        self.thresholds.get(event).copied().unwrap_or(0)
    }
}

/// Priority-ordered, buffering event dispatcher.
pub struct EventBus {
    streams: RwLock<HashMap<TypeId, Arc<dyn ErasedStream>>>,
    config: BusConfig,
    pool: Arc<ArgPool>,
    logger: Arc<dyn Logger>,
    runtime: Option<Handle>,
}

impl EventBus {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self::with_config(BusConfig::default(), Arc::new(ArgPool::new()), logger)
    }

    pub fn with_config(config: BusConfig, pool: Arc<ArgPool>, logger: Arc<dyn Logger>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
            pool,
            logger,
            runtime: None,
        }
    }

    /// Pins async subscribers to `handle` instead of the ambient runtime.
    #[must_use]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// The payload pool backing [`EventBus::acquire`].
    pub fn pool(&self) -> &Arc<ArgPool> {
        &self.pool
    }

    /// Takes a recycled payload for `E`; publish it with [`EventBus::publish_pooled`].
    pub fn acquire<E: Event + Poolable>(&self) -> Pooled<E> {
        self.pool.acquire::<E>()
    }

    // ================================================================
    // Subscribing
    // ================================================================

    /// Registers a synchronous subscriber.
    pub fn subscribe<E, F>(&self, owner: impl Into<Owner>, priority: Priority, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(Subscription::new(
            owner.into(),
            priority,
            None,
            Callback::Sync(Arc::new(callback)),
        ))
    }

    /// Registers a synchronous subscriber that only sees payloads accepted by `filter`.
    pub fn subscribe_filtered<E, P, F>(
        &self,
        owner: impl Into<Owner>,
        priority: Priority,
        filter: P,
        callback: F,
    ) -> SubscriptionId
    where
        E: Event,
        P: Fn(&E) -> bool + Send + Sync + 'static,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(Subscription::new(
            owner.into(),
            priority,
            Some(Arc::new(filter)),
            Callback::Sync(Arc::new(callback)),
        ))
    }

    /// Registers an asynchronous subscriber.
    ///
    /// The callback runs inline to produce a future, which is spawned and
    /// left to complete on its own. Several of these may be in flight at
    /// once and they are never cancelled.
    pub fn subscribe_async<E, F>(&self, owner: impl Into<Owner>, priority: Priority, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.add(Subscription::new(
            owner.into(),
            priority,
            None,
            Callback::Async(Arc::new(callback)),
        ))
    }

    fn add<E: Event>(&self, subscription: Subscription<E>) -> SubscriptionId {
        let id = subscription.id;
        let owner = subscription.owner.clone();
        let flush = self.stream::<E>().insert(subscription);
        self.logger.debug(TAG, &format!("{} subscribed to '{}'", owner, E::NAME));
        if let Some(flush) = flush {
            self.flush(flush);
        }
        id
    }

    /// Removes every subscription `owner` holds for `E`.
    pub fn unsubscribe<E: Event>(&self, owner: &Owner) -> usize {
        match self.existing::<E>() {
            Some(stream) => stream.remove_matching(|s| &s.owner == owner),
            None => 0,
        }
    }

    /// Removes every subscription `owner` holds, across all event kinds.
    pub fn unsubscribe_all(&self, owner: &Owner) -> usize {
        let streams: Vec<Arc<dyn ErasedStream>> = self.read_streams().values().cloned().collect();
        let mut removed = 0;
        for stream in streams {
            let count = stream.remove_owner(owner);
            if count > 0 {
                self.logger.debug(
                    TAG,
                    &format!("removed {} '{}' subscription(s) of {}", count, stream.event_name(), owner),
                );
            }
            removed += count;
        }
        removed
    }

    /// Removes a single subscription by handle.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        let streams: Vec<Arc<dyn ErasedStream>> = self.read_streams().values().cloned().collect();
        streams.into_iter().any(|stream| stream.remove_id(id))
    }

    // ================================================================
    // Buffering
    // ================================================================

    /// Sets the required-subscriber threshold for `E`.
    ///
    /// Only streams that have not started flowing accept a threshold. If
    /// the stream already has enough subscribers, queued items are
    /// delivered immediately.
    pub fn set_threshold<E: Event>(&self, threshold: usize) -> Result<()> {
        let stream = {
            let mut streams = self.write_streams();
            if let Some(existing) = streams.get(&TypeId::of::<E>()) {
                Self::downcast::<E>(Arc::clone(existing))
            } else {
                let stream: Arc<dyn ErasedStream> = Arc::new(Stream::<E>::new(threshold));
                streams.insert(TypeId::of::<E>(), stream);
                return Ok(());
            }
        };
        match stream.set_threshold(threshold) {
            ThresholdChange::Rejected => Err(EventError::AlreadyFlowing { event: E::NAME }),
            ThresholdChange::Pending => Ok(()),
            ThresholdChange::Flush(flush) => {
                self.flush(flush);
                Ok(())
            }
        }
    }

    /// Whether `E` is still queueing published items.
    pub fn is_buffering<E: Event>(&self) -> bool {
        self.buffered_len::<E>().is_some()
    }

    /// Queue depth for `E`, `None` once it flows.
    pub fn buffered_len<E: Event>(&self) -> Option<usize> {
        match self.existing::<E>() {
            Some(stream) => stream.buffered(),
            None => (self.config.threshold_for(E::NAME) > 0).then_some(0),
        }
    }

    /// Number of live subscriptions for `E`.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.existing::<E>().map(|s| s.subscriber_count()).unwrap_or(0)
    }

    // ================================================================
    // Publishing
    // ================================================================

    /// Publishes an owned payload.
    pub fn publish<E: Event>(&self, event: E) {
        self.publish_payload(Payload::Owned(event));
    }

    /// Publishes a pooled payload; it returns to its pool after dispatch.
    pub fn publish_pooled<E: Event>(&self, event: Pooled<E>) {
        self.publish_payload(Payload::Pooled(event));
    }

    fn publish_payload<E: Event>(&self, payload: Payload<E>) {
        match self.stream::<E>().admit(payload) {
            Admission::Queued { depth } => {
                self.logger.log(
                    Severity::Verbose,
                    TAG,
                    &format!("'{}' buffered ({} queued)", E::NAME, depth),
                );
            }
            Admission::Dispatch(mut payload, subscribers) => {
                self.dispatch(&subscribers, payload.get_mut());
            }
        }
    }

    fn flush<E: Event>(&self, (queue, subscribers): Flush<E>) {
        if !queue.is_empty() {
            self.logger.debug(
                TAG,
                &format!("'{}' threshold reached, flushing {} buffered item(s)", E::NAME, queue.len()),
            );
        }
        for mut payload in queue {
            self.dispatch(&subscribers, payload.get_mut());
        }
    }

    fn dispatch<E: Event>(&self, subscribers: &[Arc<Subscription<E>>], event: &mut E) {
        for subscription in subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<()> {
                if let Some(filter) = &subscription.filter {
                    if !filter(&*event) {
                        return Ok(());
                    }
                }
                match &subscription.callback {
                    Callback::Sync(callback) => callback(&mut *event),
                    Callback::Async(callback) => {
                        let future = callback(&*event);
                        self.spawn::<E>(&subscription.owner, future);
                        Ok(())
                    }
                }
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.report::<E>(&subscription.owner, &format!("{err:#}")),
                Err(panic) => self.report::<E>(
                    &subscription.owner,
                    &format!("panicked: {}", panic_message(panic.as_ref())),
                ),
            }
        }
    }

    fn spawn<E: Event>(&self, owner: &Owner, future: BoxFuture<'static, anyhow::Result<()>>) {
        let Some(handle) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            self.report::<E>(owner, "async subscriber skipped: no tokio runtime available");
            return;
        };
        let logger = Arc::clone(&self.logger);
        let owner = owner.clone();
        handle.spawn(async move {
            let message = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            logger.error(
                TAG,
                &format!("async subscriber {} for '{}' failed: {}", owner, E::NAME, message),
            );
        });
    }

    fn report<E: Event>(&self, owner: &Owner, message: &str) {
        self.logger.error(
            TAG,
            &format!("subscriber {} for '{}' failed: {}", owner, E::NAME, message),
        );
    }

    // ================================================================
    // Stream table
    // ================================================================

    fn stream<E: Event>(&self) -> Arc<Stream<E>> {
        if let Some(stream) = self.existing::<E>() {
            return stream;
        }
        let mut streams = self.write_streams();
        let entry = streams.entry(TypeId::of::<E>()).or_insert_with(|| {
            Arc::new(Stream::<E>::new(self.config.threshold_for(E::NAME))) as Arc<dyn ErasedStream>
        });
        Self::downcast::<E>(Arc::clone(entry))
    }

    fn existing<E: Event>(&self) -> Option<Arc<Stream<E>>> {
        self.read_streams()
            .get(&TypeId::of::<E>())
            .map(|s| Self::downcast::<E>(Arc::clone(s)))
    }

    fn downcast<E: Event>(stream: Arc<dyn ErasedStream>) -> Arc<Stream<E>> {
        match stream.into_any().downcast::<Stream<E>>() {
            Ok(stream) => stream,
            Err(_) => unreachable!("stream registered under a foreign TypeId"),
        }
    }

    fn read_streams(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TypeId, Arc<dyn ErasedStream>>> {
        self.streams.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_streams(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TypeId, Arc<dyn ErasedStream>>> {
        self.streams.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("streams", &self.read_streams().len())
            .field("config", &self.config)
            .finish()
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_types::testing::RecordingLogger;
    use std::sync::Mutex;

    struct Tick(u32);

    impl Event for Tick {
        const NAME: &'static str = "tick";
    }

    fn bus() -> (EventBus, Arc<RecordingLogger>) {
        let logger = Arc::new(RecordingLogger::new());
        (EventBus::new(logger.clone()), logger)
    }

    fn module(name: &str) -> Owner {
        Owner::Module(name.to_string())
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let (bus, logger) = bus();
        bus.publish(Tick(1));
        assert!(logger.at(Severity::Error).is_empty());
    }

    #[test]
    fn filter_skips_subscriber() {
        let (bus, _) = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_filtered(
            module("even"),
            Priority::NORMAL,
            |t: &Tick| t.0 % 2 == 0,
            move |t: &mut Tick| {
                sink.lock().unwrap().push(t.0);
                Ok(())
            },
        );
        for n in 1..=4 {
            bus.publish(Tick(n));
        }
        assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
    }

    #[test]
    fn sync_subscribers_can_mutate_payload() {
        let (bus, _) = bus();
        let seen = Arc::new(Mutex::new(0));
        bus.subscribe(module("a"), Priority::EARLY, |t: &mut Tick| {
            t.0 *= 10;
            Ok(())
        });
        let sink = Arc::clone(&seen);
        bus.subscribe(module("b"), Priority::LATE, move |t: &mut Tick| {
            *sink.lock().unwrap() = t.0;
            Ok(())
        });
        bus.publish(Tick(4));
        assert_eq!(*seen.lock().unwrap(), 40);
    }

    #[test]
    fn unsubscribe_by_id_removes_only_that_subscription() {
        let (bus, _) = bus();
        let first = bus.subscribe(module("m"), Priority::NORMAL, |_: &mut Tick| Ok(()));
        bus.subscribe(module("m"), Priority::NORMAL, |_: &mut Tick| Ok(()));
        assert!(bus.unsubscribe_id(first));
        assert!(!bus.unsubscribe_id(first));
        assert_eq!(bus.subscriber_count::<Tick>(), 1);
    }

    #[test]
    fn threshold_cannot_change_after_flowing() {
        let (bus, _) = bus();
        bus.publish(Tick(0));
        let err = bus.set_threshold::<Tick>(2).unwrap_err();
        assert!(matches!(err, EventError::AlreadyFlowing { event: "tick" }));
    }

    #[test]
    fn async_subscriber_without_runtime_is_reported() {
        let (bus, logger) = bus();
        bus.subscribe_async(module("bg"), Priority::NORMAL, |_: &Tick| {
            async { Ok::<(), anyhow::Error>(()) }.boxed()
        });
        bus.publish(Tick(1));
        assert!(logger.contains(Severity::Error, "no tokio runtime"));
    }
}
