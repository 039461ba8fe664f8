//! Capability pipes for Plinth.
//!
//! A plugin exposes named fields, properties, methods and events as
//! *pipes*; another plugin binds *slots* to them at load time without any
//! compile-time reference to the exposing plugin. Links are torn down as
//! soon as either side is disposed.
//!
//! ```
//! use plinth_pipes::{FieldCell, PipeDecl, PipeRegistry, PipeValue, Slot, ValueType};
//! use plinth_types::{Plugin, PluginId, TracingLogger};
//! use std::sync::Arc;
//!
//! let registry = PipeRegistry::new(Arc::new(TracingLogger));
//! let stats = PluginId::new("stats").unwrap();
//! let hud = PluginId::new("hud").unwrap();
//! registry.attach(&Plugin::new(stats.clone())).unwrap();
//! registry.attach(&Plugin::new(hud.clone())).unwrap();
//!
//! let players = FieldCell::new(3);
//! registry
//!     .declare(&stats, PipeDecl::field("players", ValueType::Int, players))
//!     .unwrap();
//!
//! let slot = Slot::value("players", ValueType::Int);
//! registry.link(&hud, &slot, &stats, "players").unwrap();
//! assert_eq!(slot.get(), Some(PipeValue::Int(3)));
//! ```

mod error;
mod link;
mod pipe;
mod registry;
mod slot;
mod value;

pub use error::{PipeError, Result};
pub use link::{LinkId, LinkInfo, LinkRequest, link_targets};
pub use pipe::{
    Accessor, EventFn, FieldCell, Getter, MethodFn, PipeDecl, PipeInfo, PipeKind, PipeRef, Setter, Visibility,
};
pub use registry::{DisposeReport, PipeRegistry};
pub use slot::{Binding, Slot, SlotType};
pub use value::{PipeValue, ValueType};
