//! Self-describing wire values.
//!
//! Everything that crosses the wire — call arguments, object identifiers,
//! init snapshots — is a [`Value`]. The kind set is deliberately closed:
//! primitives plus ordered sequences and name-keyed mappings of further
//! values. This is not a general serialization layer for arbitrary user
//! types; objects translate their state into these kinds at the boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single wire value.
///
/// Serialized with bincode as part of a frame's parameter sequence.
/// `Map` uses a `BTreeMap` so encoding is deterministic for a given
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// The kind of a [`Value`], used for declared argument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    UInt,
    Double,
    Bytes,
    Text,
    List,
    Map,
}

impl Value {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Double(_) => ValueKind::Double,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    /// Whether this value can be supplied for an argument declared as `kind`.
    pub fn matches(&self, kind: ValueKind) -> bool {
        self.kind() == kind
    }

    /// Borrow the text content, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The unsigned integer content, if this is a `UInt` value.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow the mapping content, if this is a `Map` value.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(Value::Int(-3).kind(), ValueKind::Int);
        assert_eq!(Value::UInt(7).kind(), ValueKind::UInt);
        assert_eq!(Value::Double(0.5).kind(), ValueKind::Double);
        assert_eq!(Value::Bytes(vec![1]).kind(), ValueKind::Bytes);
        assert_eq!(Value::Text("x".into()).kind(), ValueKind::Text);
        assert_eq!(Value::List(vec![]).kind(), ValueKind::List);
        assert_eq!(Value::Map(BTreeMap::new()).kind(), ValueKind::Map);
    }

    #[test]
    fn test_matches_is_exact() {
        assert!(Value::Text("hi".into()).matches(ValueKind::Text));
        assert!(!Value::Text("hi".into()).matches(ValueKind::Bytes));
        assert!(!Value::Int(1).matches(ValueKind::UInt));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Text("topic".into()).as_text(), Some("topic"));
        assert_eq!(Value::UInt(42).as_uint(), Some(42));
        assert!(Value::Int(42).as_uint().is_none());
        assert!(Value::Null.as_text().is_none());

        let mut m = BTreeMap::new();
        m.insert("k".to_string(), Value::Bool(false));
        assert_eq!(Value::Map(m.clone()).as_map(), Some(&m));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from("hi"), Value::Text("hi".into()));
        assert_eq!(Value::from(3i64), Value::Int(3));
        assert_eq!(Value::from(3u64), Value::UInt(3));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(vec![9u8]), Value::Bytes(vec![9]));
    }
}
