//! Event dispatch for Plinth.
//!
//! - [`EventBus`]: priority-ordered subscriptions, isolated dispatch,
//!   threshold buffering and fire-and-forget async subscribers
//! - [`ArgPool`] / [`Pool`] / [`Pooled`]: per-type payload recycling with
//!   scoped return-on-drop
//! - [`Event`]: the trait every event kind implements
//!
//! ```
//! use plinth_events::{Event, EventBus};
//! use plinth_types::{Owner, Priority, TracingLogger};
//! use std::sync::Arc;
//!
//! struct ServerStarted;
//!
//! impl Event for ServerStarted {
//!     const NAME: &'static str = "server.started";
//! }
//!
//! let bus = EventBus::new(Arc::new(TracingLogger));
//! bus.subscribe(Owner::Module("motd".into()), Priority::NORMAL, |_: &mut ServerStarted| Ok(()));
//! bus.publish(ServerStarted);
//! ```

mod bus;
mod error;
mod event;
mod pool;
mod stream;
mod subscription;

pub use bus::{BusConfig, EventBus};
pub use error::{EventError, Result};
pub use event::{Event, SubscriptionId};
pub use pool::{ArgPool, DEFAULT_GROWTH, Pool, Poolable, Pooled};
pub use subscription::{AsyncCallback, ScopeFilter, SyncCallback};
