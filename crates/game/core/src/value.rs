//! Runtime values for the block language.
//!
//! Every value a block tree can produce is one of the variants below. The
//! runtime tag of a value always matches the static type the validator
//! assigned to the slot it occupies; the interpreter re-checks the tag at
//! mutation boundaries as defense in depth.

use core::fmt;

use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::state::NodeId;

/// Insertion-ordered dictionary backing `Value::Dict`.
///
/// Order matters: `keys`/`values` blocks project entries in the order they
/// were written, and that order must be identical on every client.
pub type Dict = IndexMap<String, Value>;

/// A runtime value in the block language.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A string value.
    String(String),
    /// A numeric value (always f64, matching the JSON number model).
    Number(f64),
    /// A boolean value.
    Bool(bool),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A dictionary with string keys, preserving insertion order.
    Dict(Dict),
    /// An opaque handle to a live object (a node or a context binding).
    Ref(ObjectHandle),
    /// The absence of a value (e.g. a method without `@return`).
    Void,
}

/// Handle to a live object.
///
/// Handles are arena-style indirections: a `Node` handle is a stable integer
/// id into the game state's node table, so removing the node invalidates
/// lookups instead of leaving a dangling pointer. A `Binding` handle names an
/// entry in the current evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectHandle {
    /// A node in the world, by stable id.
    Node(NodeId),
    /// A named object in the evaluation context (`"node"`, `"this"`, ...).
    Binding(String),
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectHandle::Node(id) => write!(f, "{id}"),
            ObjectHandle::Binding(name) => write!(f, "{name}"),
        }
    }
}

impl Value {
    /// Returns the runtime tag name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Array(_) => "array",
            Value::Dict(_) => "dictionary",
            Value::Ref(_) => "reference",
            Value::Void => "void",
        }
    }

    /// Interprets this value as a non-negative whole number.
    ///
    /// The block language has a single number type, but several operations
    /// (repeat counts, item quantities, slot counts) require counts. Returns
    /// `None` for negative, fractional, or non-finite numbers.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Converts a JSON value into a runtime value, structurally.
    ///
    /// `null` maps to `Void`; an object whose only key is `"$ref"` maps back
    /// to a reference handle (the inverse of [`Value::to_json`]).
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Void,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => {
                if entries.len() == 1 {
                    if let Some(serde_json::Value::String(target)) = entries.get("$ref") {
                        return Value::Ref(ObjectHandle::parse(target));
                    }
                }
                Value::Dict(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Converts this value to JSON for state snapshots and the wire.
    ///
    /// References serialize as `{"$ref": "<handle>"}` so that id-typed data
    /// fields survive a snapshot round trip; `Void` serializes as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Ref(handle) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    "$ref".to_string(),
                    serde_json::Value::String(handle.to_string()),
                );
                serde_json::Value::Object(map)
            }
            Value::Void => serde_json::Value::Null,
        }
    }
}

impl ObjectHandle {
    /// Parses the string form produced by `Display` back into a handle.
    pub fn parse(text: &str) -> ObjectHandle {
        match NodeId::parse(text) {
            Some(id) => ObjectHandle::Node(id),
            None => ObjectHandle::Binding(text.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Number(n) => {
                if *n == n.trunc() && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(_) | Value::Dict(_) => write!(f, "{}", self.to_json()),
            Value::Ref(handle) => write!(f, "{handle}"),
            Value::Void => write!(f, "void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_equality_ignores_insertion_order() {
        let mut a = Dict::new();
        a.insert("x".into(), Value::Number(1.0));
        a.insert("y".into(), Value::Number(2.0));
        let mut b = Dict::new();
        b.insert("y".into(), Value::Number(2.0));
        b.insert("x".into(), Value::Number(1.0));
        assert_eq!(Value::Dict(a), Value::Dict(b));
    }

    #[test]
    fn ref_survives_json_round_trip() {
        let value = Value::Ref(ObjectHandle::Node(NodeId(7)));
        let json = value.to_json();
        assert_eq!(Value::from_json(&json), value);
    }

    #[test]
    fn as_count_rejects_fractions_and_negatives() {
        assert_eq!(Value::Number(3.0).as_count(), Some(3));
        assert_eq!(Value::Number(-1.0).as_count(), None);
        assert_eq!(Value::Number(2.5).as_count(), None);
        assert_eq!(Value::Number(f64::NAN).as_count(), None);
        assert_eq!(Value::String("3".into()).as_count(), None);
    }
}
