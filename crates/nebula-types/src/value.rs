//! Structured values held by the durable store.
//!
//! `MemoryValue` is a closed set of variants (null, boolean, number, text,
//! ordered list, key-ordered map). Because maps are `BTreeMap`s, every value
//! has exactly one rendering, which is what the search adapter and version
//! snapshots rely on.
//!
//! Serialized untagged, so a `MemoryValue` reads and writes as plain JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically shaped value stored under a durable key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemoryValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<MemoryValue>),
    Map(BTreeMap<String, MemoryValue>),
}

impl MemoryValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MemoryValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MemoryValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MemoryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MemoryValue::Integer(i) => Some(*i as f64),
            MemoryValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MemoryValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MemoryValue]> {
        match self {
            MemoryValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, MemoryValue>> {
        match self {
            MemoryValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a field of a map value. Returns `None` for non-maps.
    pub fn get(&self, key: &str) -> Option<&MemoryValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Short name of the variant, used in stats and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryValue::Null => "null",
            MemoryValue::Bool(_) => "bool",
            MemoryValue::Integer(_) | MemoryValue::Float(_) => "number",
            MemoryValue::Text(_) => "text",
            MemoryValue::List(_) => "list",
            MemoryValue::Map(_) => "map",
        }
    }

    /// Flat text form of the value, used for keyword search.
    ///
    /// Strings are emitted as-is with no quoting or escaping. Map entries
    /// render as `key: value` in key order, and list items and map entries
    /// are separated by `, `. Non-finite floats render as `null`.
    pub fn to_search_text(&self) -> String {
        let mut out = String::new();
        self.write_search_text(&mut out);
        out
    }

    fn write_search_text(&self, out: &mut String) {
        match self {
            MemoryValue::Null => out.push_str("null"),
            MemoryValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            MemoryValue::Integer(i) => out.push_str(&i.to_string()),
            MemoryValue::Float(f) if f.is_finite() => out.push_str(&f.to_string()),
            MemoryValue::Float(_) => out.push_str("null"),
            MemoryValue::Text(s) => out.push_str(s),
            MemoryValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_search_text(out);
                }
            }
            MemoryValue::Map(map) => {
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    value.write_search_text(out);
                }
            }
        }
    }
}

/// Compact JSON, map keys in order.
impl fmt::Display for MemoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for MemoryValue {
    fn from(v: bool) -> Self {
        MemoryValue::Bool(v)
    }
}

impl From<i64> for MemoryValue {
    fn from(v: i64) -> Self {
        MemoryValue::Integer(v)
    }
}

impl From<i32> for MemoryValue {
    fn from(v: i32) -> Self {
        MemoryValue::Integer(v as i64)
    }
}

impl From<u32> for MemoryValue {
    fn from(v: u32) -> Self {
        MemoryValue::Integer(v as i64)
    }
}

impl From<f64> for MemoryValue {
    fn from(v: f64) -> Self {
        MemoryValue::Float(v)
    }
}

impl From<&str> for MemoryValue {
    fn from(v: &str) -> Self {
        MemoryValue::Text(v.to_string())
    }
}

impl From<String> for MemoryValue {
    fn from(v: String) -> Self {
        MemoryValue::Text(v)
    }
}

impl<T: Into<MemoryValue>> From<Vec<T>> for MemoryValue {
    fn from(items: Vec<T>) -> Self {
        MemoryValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, MemoryValue>> for MemoryValue {
    fn from(map: BTreeMap<String, MemoryValue>) -> Self {
        MemoryValue::Map(map)
    }
}

impl From<serde_json::Value> for MemoryValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MemoryValue::Null,
            serde_json::Value::Bool(b) => MemoryValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => MemoryValue::Integer(i),
                None => n.as_f64().map(MemoryValue::Float).unwrap_or(MemoryValue::Null),
            },
            serde_json::Value::String(s) => MemoryValue::Text(s),
            serde_json::Value::Array(items) => {
                MemoryValue::List(items.into_iter().map(MemoryValue::from).collect())
            }
            serde_json::Value::Object(map) => MemoryValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, MemoryValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<MemoryValue> for serde_json::Value {
    fn from(value: MemoryValue) -> Self {
        match value {
            MemoryValue::Null => serde_json::Value::Null,
            MemoryValue::Bool(b) => serde_json::Value::Bool(b),
            MemoryValue::Integer(i) => serde_json::Value::from(i),
            MemoryValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            MemoryValue::Text(s) => serde_json::Value::String(s),
            MemoryValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            MemoryValue::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}
