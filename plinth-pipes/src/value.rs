//! Values carried by pipes and the assignability rules between them.

use crate::error::PipeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a pipe or slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Unit,
    Bool,
    Int,
    Float,
    Text,
    Json,
    /// Accepts any value unchanged.
    Any,
}

impl ValueType {
    /// Whether a value declared as `source` can be stored where `self` is expected.
    ///
    /// Identical types always match; `Any` and `Json` accept everything;
    /// `Float` accepts `Int`.
    pub fn accepts(self, source: ValueType) -> bool {
        self == source
            || matches!(self, Self::Any | Self::Json)
            || (self == Self::Float && source == Self::Int)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unit => "unit",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Json => "json",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

/// A concrete value read from or written to a pipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PipeValue {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl PipeValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Unit => ValueType::Unit,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::Json(_) => ValueType::Json,
        }
    }

    /// Converts the value into `target`, following [`ValueType::accepts`].
    pub fn convert_to(self, target: ValueType) -> Result<PipeValue, PipeError> {
        let source = self.value_type();
        match (self, target) {
            (value, ValueType::Any) => Ok(value),
            (value, t) if value.value_type() == t => Ok(value),
            (Self::Int(i), ValueType::Float) => Ok(Self::Float(i as f64)),
            (value, ValueType::Json) => Ok(Self::Json(value.into_json())),
            _ => Err(PipeError::TypeMismatch {
                expected: target,
                found: source,
            }),
        }
    }

    /// JSON representation of the value. Non-finite floats become `null`.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Unit => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Int(i) => serde_json::Value::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s),
            Self::Json(v) => v,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<()> for PipeValue {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for PipeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for PipeValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for PipeValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for PipeValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for PipeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for PipeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<serde_json::Value> for PipeValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assignability_table() {
        assert!(ValueType::Int.accepts(ValueType::Int));
        assert!(ValueType::Float.accepts(ValueType::Int));
        assert!(!ValueType::Int.accepts(ValueType::Float));
        assert!(ValueType::Any.accepts(ValueType::Text));
        assert!(ValueType::Json.accepts(ValueType::Bool));
        assert!(!ValueType::Text.accepts(ValueType::Any));
    }

    #[test]
    fn int_widens_to_float() {
        let v = PipeValue::Int(3).convert_to(ValueType::Float).unwrap();
        assert_eq!(v, PipeValue::Float(3.0));
    }

    #[test]
    fn anything_converts_to_json() {
        let v = PipeValue::Text("hi".into()).convert_to(ValueType::Json).unwrap();
        assert_eq!(v, PipeValue::Json(json!("hi")));
        let unit = PipeValue::Unit.convert_to(ValueType::Json).unwrap();
        assert_eq!(unit, PipeValue::Json(serde_json::Value::Null));
    }

    #[test]
    fn narrowing_is_rejected() {
        let err = PipeValue::Float(1.5).convert_to(ValueType::Int).unwrap_err();
        assert!(matches!(
            err,
            PipeError::TypeMismatch {
                expected: ValueType::Int,
                found: ValueType::Float
            }
        ));
    }

    #[test]
    fn nan_becomes_null() {
        assert_eq!(PipeValue::Float(f64::NAN).into_json(), serde_json::Value::Null);
    }
}
