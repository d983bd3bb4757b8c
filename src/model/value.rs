//! Canonical value representation.
//!
//! Every field is normalized into a [`Value`] before comparison. Values are
//! totally ordered and maps are key-ordered, so equality, set comparison and
//! serialization are all deterministic.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A canonical, totally ordered field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absent or explicitly empty value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer (byte counts, port numbers, nanoseconds).
    Int(i64),
    /// String.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Key-ordered map.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for `Null`, an empty list or an empty map.
    #[must_use]
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Self::Null => true,
            Self::List(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns list items; `Null` is treated as an empty list.
    #[must_use]
    pub fn list_items(&self) -> Option<&[Self]> {
        match self {
            Self::Null => Some(&[]),
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns map entries, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Collects list items into an ordered set; `Null` is the empty set.
    #[must_use]
    pub fn item_set(&self) -> Option<BTreeSet<&Self>> {
        self.list_items().map(|items| items.iter().collect())
    }

    /// Builds a string value.
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Builds a single-entry map, used for map entries as sub-operation items.
    #[must_use]
    pub fn entry(key: impl Into<String>, value: Self) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), value);
        Self::Map(map)
    }

    /// Converts the value back to JSON, e.g. for storing canonical state.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Structural conversion from JSON without any field-specific rules.
    ///
    /// Floats that hold an integral value become integers; other floats keep
    /// their decimal spelling as a string. Strings are trimmed.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Self::Str(s.trim().to_string()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn number_to_value(n: &serde_json::Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Int(i);
    }
    match n.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Int(f as i64),
        _ => Value::Str(n.to_string()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(_) | Self::Map(_) => {
                let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{rendered}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_orders_maps() {
        let value = Value::from_json(&json!({"b": 1, "a": " x "}));
        let rendered = value.to_string();
        assert_eq!(rendered, r#"{"a":"x","b":1}"#);
    }

    #[test]
    fn test_integral_float_becomes_int() {
        assert_eq!(Value::from_json(&json!(2.0)), Value::Int(2));
        assert_eq!(Value::from_json(&json!(1.5)), Value::str("1.5"));
    }

    #[test]
    fn test_null_is_empty_collection() {
        assert!(Value::Null.is_empty_collection());
        assert!(Value::List(vec![]).is_empty_collection());
        assert!(!Value::Int(0).is_empty_collection());
        assert_eq!(Value::Null.list_items().map(<[Value]>::len), Some(0));
    }

    #[test]
    fn test_json_round_trip_preserves_canonical_value() {
        let value = Value::from_json(&json!({"ports": [80, "9010-9050"], "ro": true}));
        assert_eq!(Value::from_json(&value.to_json()), value);
    }
}
