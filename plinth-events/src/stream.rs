//! Per-event-kind subscription lists and buffering state.

use crate::event::{Event, SubscriptionId};
use crate::pool::Pooled;
use crate::subscription::Subscription;
use plinth_types::Owner;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A published item, owned outright or borrowed from a pool.
pub(crate) enum Payload<E> {
    Owned(E),
    Pooled(Pooled<E>),
}

impl<E> Payload<E> {
    pub(crate) fn get_mut(&mut self) -> &mut E {
        match self {
            Self::Owned(event) => event,
            Self::Pooled(pooled) => &mut **pooled,
        }
    }
}

/// Buffering → Flowing, never back.
enum Mode<E> {
    Buffering(VecDeque<Payload<E>>),
    Flowing,
}

struct StreamState<E> {
    subscriptions: Vec<Arc<Subscription<E>>>,
    threshold: usize,
    mode: Mode<E>,
}

pub(crate) type Snapshot<E> = Vec<Arc<Subscription<E>>>;

/// Queue drained at the moment a stream starts flowing, with the
/// subscribers it must be delivered to.
pub(crate) type Flush<E> = (VecDeque<Payload<E>>, Snapshot<E>);

/// What the bus must do after a publish was admitted.
pub(crate) enum Admission<E> {
    Queued { depth: usize },
    Dispatch(Payload<E>, Snapshot<E>),
}

pub(crate) enum ThresholdChange<E> {
    /// The stream already flows; thresholds no longer apply.
    Rejected,
    /// Still buffering under the new threshold.
    Pending,
    /// The new threshold is already met.
    Flush(Flush<E>),
}

pub(crate) struct Stream<E> {
    state: Mutex<StreamState<E>>,
}

impl<E: Event> Stream<E> {
    pub(crate) fn new(threshold: usize) -> Self {
        let mode = if threshold == 0 {
            Mode::Flowing
        } else {
            Mode::Buffering(VecDeque::new())
        };
        Self {
            state: Mutex::new(StreamState {
                subscriptions: Vec::new(),
                threshold,
                mode,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState<E>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues the payload while buffering, otherwise hands back a snapshot
    /// of the current subscribers to dispatch to.
    pub(crate) fn admit(&self, payload: Payload<E>) -> Admission<E> {
        let mut state = self.lock();
        if let Mode::Buffering(queue) = &mut state.mode {
            queue.push_back(payload);
            return Admission::Queued { depth: queue.len() };
        }
        Admission::Dispatch(payload, state.subscriptions.clone())
    }

    /// Inserts a subscription in priority order, after any existing
    /// subscriptions of equal priority.
    ///
    /// Returns the drained queue and a snapshot when this insertion makes
    /// the stream reach its threshold.
    pub(crate) fn insert(&self, subscription: Subscription<E>) -> Option<Flush<E>> {
        let mut state = self.lock();
        let pos = state
            .subscriptions
            .iter()
            .position(|s| s.priority > subscription.priority)
            .unwrap_or(state.subscriptions.len());
        state.subscriptions.insert(pos, Arc::new(subscription));
        Self::flush_if_ready(&mut state)
    }

    /// Changes the threshold of a stream that has not started flowing.
    pub(crate) fn set_threshold(&self, threshold: usize) -> ThresholdChange<E> {
        let mut state = self.lock();
        if matches!(state.mode, Mode::Flowing) {
            return ThresholdChange::Rejected;
        }
        state.threshold = threshold;
        match Self::flush_if_ready(&mut state) {
            Some(flush) => ThresholdChange::Flush(flush),
            None => ThresholdChange::Pending,
        }
    }

    fn flush_if_ready(state: &mut StreamState<E>) -> Option<Flush<E>> {
        if state.subscriptions.len() < state.threshold {
            return None;
        }
        match std::mem::replace(&mut state.mode, Mode::Flowing) {
            Mode::Buffering(queue) => Some((queue, state.subscriptions.clone())),
            Mode::Flowing => None,
        }
    }

    pub(crate) fn remove_matching(&self, pred: impl Fn(&Subscription<E>) -> bool) -> usize {
        let mut state = self.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| !pred(s));
        before - state.subscriptions.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Number of queued items, or `None` when flowing.
    pub(crate) fn buffered(&self) -> Option<usize> {
        match &self.lock().mode {
            Mode::Buffering(queue) => Some(queue.len()),
            Mode::Flowing => None,
        }
    }
}

/// Type-erased view of a stream used for owner-wide operations.
pub(crate) trait ErasedStream: Send + Sync {
    fn event_name(&self) -> &'static str;
    fn remove_owner(&self, owner: &Owner) -> usize;
    fn remove_id(&self, id: SubscriptionId) -> bool;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Event> ErasedStream for Stream<E> {
    fn event_name(&self) -> &'static str {
        E::NAME
    }

    fn remove_owner(&self, owner: &Owner) -> usize {
        self.remove_matching(|s| &s.owner == owner)
    }

    fn remove_id(&self, id: SubscriptionId) -> bool {
        self.remove_matching(|s| s.id == id) > 0
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
