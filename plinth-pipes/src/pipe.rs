//! Pipe declarations.
//!
//! A pipe is a named capability a plugin exposes: a field or property
//! other plugins can read and write, a method they can call, or an event
//! they can trigger by name.

use crate::value::{PipeValue, ValueType};
use plinth_types::PluginId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

/// What a pipe exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeKind {
    Field,
    Property,
    Method,
    Event,
}

impl PipeKind {
    /// Fields and properties both carry a readable value.
    pub fn is_data(self) -> bool {
        matches!(self, Self::Field | Self::Property)
    }

    /// Whether a pipe of kind `other` can satisfy a slot expecting `self`.
    pub fn compatible_with(self, other: PipeKind) -> bool {
        self == other || (self.is_data() && other.is_data())
    }
}

impl fmt::Display for PipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Field => "field",
            Self::Property => "property",
            Self::Method => "method",
            Self::Event => "event",
        };
        f.write_str(s)
    }
}

pub type Getter = Arc<dyn Fn() -> PipeValue + Send + Sync>;
pub type Setter = Arc<dyn Fn(PipeValue) -> anyhow::Result<()> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&[PipeValue]) -> anyhow::Result<PipeValue> + Send + Sync>;
/// Event pipe handler, called with the invoking plugin's id.
pub type EventFn = Arc<dyn Fn(&PluginId, &[PipeValue]) -> anyhow::Result<()> + Send + Sync>;

/// Shared storage behind a field pipe.
///
/// The owning plugin keeps a clone and reads or writes it directly; the
/// registry serves other plugins from the same cell.
#[derive(Debug, Clone, Default)]
pub struct FieldCell(Arc<RwLock<PipeValue>>);

impl FieldCell {
    pub fn new(initial: impl Into<PipeValue>) -> Self {
        Self(Arc::new(RwLock::new(initial.into())))
    }

    pub fn get(&self) -> PipeValue {
        self.0
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, value: impl Into<PipeValue>) {
        let mut guard = self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = value.into();
    }
}

/// How the registry reaches a pipe's value or behavior.
#[derive(Clone)]
pub enum Accessor {
    Field(FieldCell),
    Property { get: Getter, set: Option<Setter> },
    Method(MethodFn),
    Event(EventFn),
}

impl Accessor {
    pub fn kind(&self) -> PipeKind {
        match self {
            Self::Field(_) => PipeKind::Field,
            Self::Property { .. } => PipeKind::Property,
            Self::Method(_) => PipeKind::Method,
            Self::Event(_) => PipeKind::Event,
        }
    }

    /// Reads the current value of a data pipe.
    pub(crate) fn read(&self) -> Option<PipeValue> {
        match self {
            Self::Field(cell) => Some(cell.get()),
            Self::Property { get, .. } => Some(get()),
            Self::Method(_) | Self::Event(_) => None,
        }
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(cell) => f.debug_tuple("Field").field(cell).finish(),
            Self::Property { set, .. } => f
                .debug_struct("Property")
                .field("writable", &set.is_some())
                .finish(),
            Self::Method(_) => f.write_str("Method"),
            Self::Event(_) => f.write_str("Event"),
        }
    }
}

/// Whether the exposed member is meant to be part of the plugin's public surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// A pipe as declared by its owning plugin.
#[derive(Debug, Clone)]
pub struct PipeDecl {
    pub(crate) name: String,
    pub(crate) value_type: ValueType,
    pub(crate) readonly: bool,
    pub(crate) visibility: Visibility,
    pub(crate) accessor: Accessor,
    pub(crate) allowed_callers: Vec<PluginId>,
}

impl PipeDecl {
    fn new(name: impl Into<String>, value_type: ValueType, accessor: Accessor) -> Self {
        Self {
            name: name.into(),
            value_type,
            readonly: false,
            visibility: Visibility::Public,
            accessor,
            allowed_callers: Vec::new(),
        }
    }

    /// A writable field backed by `cell`.
    pub fn field(name: impl Into<String>, value_type: ValueType, cell: FieldCell) -> Self {
        Self::new(name, value_type, Accessor::Field(cell))
    }

    /// A read-only property computed by `get`. Add a setter with [`PipeDecl::with_setter`].
    pub fn property<G>(name: impl Into<String>, value_type: ValueType, get: G) -> Self
    where
        G: Fn() -> PipeValue + Send + Sync + 'static,
    {
        let mut decl = Self::new(
            name,
            value_type,
            Accessor::Property {
                get: Arc::new(get),
                set: None,
            },
        );
        decl.readonly = true;
        decl
    }

    /// A callable method returning a `returns` value.
    pub fn method<F>(name: impl Into<String>, returns: ValueType, f: F) -> Self
    where
        F: Fn(&[PipeValue]) -> anyhow::Result<PipeValue> + Send + Sync + 'static,
    {
        Self::new(name, returns, Accessor::Method(Arc::new(f)))
    }

    /// An event handler reachable through [`crate::PipeRegistry::invoke`].
    pub fn event<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&PluginId, &[PipeValue]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, ValueType::Unit, Accessor::Event(Arc::new(f)))
    }

    /// Makes a property writable through `set`.
    #[must_use]
    pub fn with_setter<S>(mut self, set: S) -> Self
    where
        S: Fn(PipeValue) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if let Accessor::Property { set: slot, .. } = &mut self.accessor {
            *slot = Some(Arc::new(set));
            self.readonly = false;
        }
        self
    }

    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    /// Restricts an event pipe to the given callers.
    #[must_use]
    pub fn allow_callers(mut self, callers: impl IntoIterator<Item = PluginId>) -> Self {
        self.allowed_callers.extend(callers);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PipeKind {
        self.accessor.kind()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }
}

/// Generational handle to a declared pipe.
///
/// Handles stay cheap to copy and become stale the moment the owning
/// plugin is disposed, even if the slot is later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Public description of a declared pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeInfo {
    pub owner: PluginId,
    pub name: String,
    pub kind: PipeKind,
    pub value_type: ValueType,
    pub readonly: bool,
}
