//! The loosely-typed source tree.
//!
//! The concrete-syntax layer (YAML or otherwise) hands the compiler a
//! tree of mappings; this is its in-memory shape. Mappings preserve
//! declaration order, which is semantic: sibling order drives both
//! execution order and path assignment.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A scalar, sequence, or mapping from the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short tag for diagnostics ("mapping", "list", ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "mapping",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip_preserves_order() {
        let yaml = "first: 1\nsecond: two\nthird: [a, b]\n";
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let map = value.as_map().unwrap();
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["first", "second", "third"]);
        assert_eq!(map["first"].as_int(), Some(1));
        assert_eq!(map["second"].as_str(), Some("two"));
        assert_eq!(map["third"].as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_null_and_scalars() {
        let value: Value = serde_yaml::from_str("key:\n").unwrap();
        assert!(value.as_map().unwrap()["key"].is_null());

        let value: Value = serde_yaml::from_str("3.5").unwrap();
        assert_eq!(value, Value::Float(3.5));

        let value: Value = serde_yaml::from_str("true").unwrap();
        assert_eq!(value.as_bool(), Some(true));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::from(vec![]).type_name(), "list");
    }
}
