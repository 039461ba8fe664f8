//! Consumer-side slots that links fill in.

use crate::pipe::{PipeKind, PipeRef};
use crate::value::{PipeValue, ValueType};
use plinth_types::PluginId;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// What a slot expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    /// A plain value copied from a field or property.
    Value(ValueType),
    /// A wrapper holding the pipe handle itself. Data wrappers also
    /// receive the value.
    Pipe(PipeKind, ValueType),
}

impl SlotType {
    /// The kind and value type the wrapper stands for.
    pub fn base(self) -> (PipeKind, ValueType) {
        match self {
            Self::Value(ty) => (PipeKind::Field, ty),
            Self::Pipe(kind, ty) => (kind, ty),
        }
    }

    /// Whether a pipe of `kind` declared as `value_type` can fill this slot.
    pub fn accepts(self, kind: PipeKind, value_type: ValueType) -> bool {
        let (base_kind, base_type) = self.base();
        base_kind.compatible_with(kind) && base_type.accepts(value_type)
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(ty) => write!(f, "{ty}"),
            Self::Pipe(kind, ty) => write!(f, "pipe<{kind}, {ty}>"),
        }
    }
}

/// What a linked slot currently holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub target: PluginId,
    pub pipe: PipeRef,
    pub value: Option<PipeValue>,
}

/// A named receptacle on the consumer side of a link.
///
/// Clones share the same binding, so the consumer keeps one clone and the
/// registry another; clearing through either is visible to both.
#[derive(Clone)]
pub struct Slot {
    name: String,
    slot_type: SlotType,
    binding: Arc<Mutex<Option<Binding>>>,
}

impl Slot {
    pub fn new(name: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            name: name.into(),
            slot_type,
            binding: Arc::new(Mutex::new(None)),
        }
    }

    /// Slot receiving a copy of a data pipe's value.
    pub fn value(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, SlotType::Value(value_type))
    }

    /// Slot receiving a handle to a method pipe.
    pub fn method(name: impl Into<String>, returns: ValueType) -> Self {
        Self::new(name, SlotType::Pipe(PipeKind::Method, returns))
    }

    /// Slot receiving a handle to an event pipe.
    pub fn event(name: impl Into<String>) -> Self {
        Self::new(name, SlotType::Pipe(PipeKind::Event, ValueType::Unit))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_type(&self) -> SlotType {
        self.slot_type
    }

    /// The value copied in at link time, if any.
    pub fn get(&self) -> Option<PipeValue> {
        self.lock().as_ref().and_then(|b| b.value.clone())
    }

    /// Handle to the linked pipe, if linked.
    pub fn pipe(&self) -> Option<PipeRef> {
        self.lock().as_ref().map(|b| b.pipe)
    }

    pub fn binding(&self) -> Option<Binding> {
        self.lock().clone()
    }

    pub fn is_linked(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether `other` is a clone of this slot.
    pub fn same_as(&self, other: &Slot) -> bool {
        Arc::ptr_eq(&self.binding, &other.binding)
    }

    pub(crate) fn bind(&self, binding: Binding) {
        *self.lock() = Some(binding);
    }

    pub(crate) fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("slot_type", &self.slot_type)
            .field("linked", &self.is_linked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_slot_accepts_field_and_property() {
        let ty = SlotType::Value(ValueType::Float);
        assert!(ty.accepts(PipeKind::Field, ValueType::Int));
        assert!(ty.accepts(PipeKind::Property, ValueType::Float));
        assert!(!ty.accepts(PipeKind::Method, ValueType::Float));
        assert!(!ty.accepts(PipeKind::Field, ValueType::Text));
    }

    #[test]
    fn wrapper_unwraps_to_base_kind() {
        let ty = SlotType::Pipe(PipeKind::Property, ValueType::Int);
        assert_eq!(ty.base(), (PipeKind::Property, ValueType::Int));
        assert!(ty.accepts(PipeKind::Field, ValueType::Int));
        assert!(!SlotType::Pipe(PipeKind::Event, ValueType::Unit).accepts(PipeKind::Method, ValueType::Unit));
    }

    #[test]
    fn clones_share_binding() {
        let slot = Slot::value("hp", ValueType::Int);
        let copy = slot.clone();
        copy.bind(Binding {
            target: PluginId::new("stats").unwrap(),
            pipe: PipeRef { index: 0, generation: 0 },
            value: Some(PipeValue::Int(10)),
        });
        assert!(slot.same_as(&copy));
        assert_eq!(slot.get(), Some(PipeValue::Int(10)));
        slot.clear();
        assert!(!copy.is_linked());
    }
}
