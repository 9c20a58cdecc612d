//! The JSON-like value sum type documents are built from, and the
//! create/update/delete change-log types the Differ produces.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::convert::format_go_duration;

/// A document leaf or interior node. Interior nodes are `Object` (an
/// order-preserving string-keyed map, so diff/patch output is
/// deterministic) or `Array`; everything else is a scalar leaf.
///
/// The wire encoding is plain JSON, which has no native time/duration/bytes
/// type: `Time` serializes as an RFC3339 string, `Duration` as a Go-style
/// duration string, and `Bytes` as base64 — all of which deserialize back
/// as `Value::String`. Round-tripping the exact variant is only guaranteed
/// for values constructed directly in Rust and never sent over the wire;
/// callers that need typed access after a wire round-trip go through
/// `edgekv`'s `Accessor`, which parses these string forms back.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Duration(Duration),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&base64_encode(b)),
            Value::Time(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Duration(d) => serializer.serialize_str(&format_go_duration(*d)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON-like value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        match i64::try_from(v) {
            Ok(i) => Ok(Value::Int(i)),
            Err(_) => Ok(Value::Float(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        d.deserialize_any(ValueVisitor)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut out = BTreeMap::new();
        while let Some((k, v)) = map.next_entry()? {
            out.insert(k, v);
        }
        Ok(Value::Object(out))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        let n = (u32::from(b0) << 16) | (u32::from(b1.unwrap_or(0)) << 8) | u32::from(b2.unwrap_or(0));
        out.push(ALPHABET[(n >> 18 & 0x3f) as usize] as char);
        out.push(ALPHABET[(n >> 12 & 0x3f) as usize] as char);
        out.push(if b1.is_some() {
            ALPHABET[(n >> 6 & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if b2.is_some() {
            ALPHABET[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

impl Value {
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Read the sub-value addressed by `path` (a list of map-key segments).
    /// An empty path returns `self`. Returns `None` if any intermediate
    /// segment is missing or not an object.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let mut cur = self;
        for seg in path {
            cur = cur.as_object()?.get(*seg)?;
        }
        Some(cur)
    }

    /// Write `value` at the sub-path, creating intermediate objects as
    /// needed. If the path is empty, replaces `self` entirely. Returns the
    /// previous value at that path, if any.
    pub fn set_path(&mut self, path: &[&str], value: Value) -> Option<Value> {
        match path.split_first() {
            None => Some(std::mem::replace(self, value)),
            Some((head, rest)) => {
                if !self.is_object() {
                    *self = Value::object();
                }
                let map = self.as_object_mut().expect("just coerced to object");
                if rest.is_empty() {
                    map.insert((*head).to_string(), value)
                } else {
                    let child = map.entry((*head).to_string()).or_insert_with(Value::object);
                    child.set_path(rest, value)
                }
            }
        }
    }

    /// Remove the value at the sub-path. No-op (returns `None`) if the path
    /// doesn't resolve.
    pub fn delete_path(&mut self, path: &[&str]) -> Option<Value> {
        match path.split_first() {
            None => None,
            Some((head, rest)) => {
                let map = self.as_object_mut()?;
                if rest.is_empty() {
                    map.remove(*head)
                } else {
                    map.get_mut(*head)?.delete_path(rest)
                }
            }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// The kind of structural edit a [`Change`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// A single structural edit between two documents, addressed by `path`
/// (a sequence of map keys relative to the document root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
}

impl Change {
    pub fn create(path: Vec<String>, to: Value) -> Self {
        Change {
            kind: ChangeKind::Create,
            path,
            from: None,
            to: Some(to),
        }
    }

    pub fn update(path: Vec<String>, from: Value, to: Value) -> Self {
        Change {
            kind: ChangeKind::Update,
            path,
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn delete(path: Vec<String>) -> Self {
        Change {
            kind: ChangeKind::Delete,
            path,
            from: None,
            to: None,
        }
    }

    /// True for a `create`/`update` whose `to` value is the "latest effect"
    /// a coarse reader should take when no prior value is present.
    pub fn latest_effect(&self) -> Option<&Value> {
        self.to.as_ref()
    }
}

/// An ordered sequence of [`Change`]s describing the structural delta
/// between two documents. The last entry is the authoritative "latest
/// effect" when only a coarse value is needed.
pub type Changelog = Vec<Change>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut v = Value::object();
        v.set_path(&["a", "b"], Value::Int(1));
        assert_eq!(v.get_path(&["a", "b"]), Some(&Value::Int(1)));
    }

    #[test]
    fn set_path_empty_replaces_root() {
        let mut v = Value::Int(1);
        let prev = v.set_path(&[], Value::Int(2));
        assert_eq!(prev, Some(Value::Int(1)));
        assert_eq!(v, Value::Int(2));
    }

    #[test]
    fn delete_path_removes_leaf() {
        let mut v = Value::object();
        v.set_path(&["a"], Value::Int(1));
        let removed = v.delete_path(&["a"]);
        assert_eq!(removed, Some(Value::Int(1)));
        assert_eq!(v.get_path(&["a"]), None);
    }

    #[test]
    fn delete_path_missing_is_noop() {
        let mut v = Value::object();
        assert_eq!(v.delete_path(&["missing"]), None);
    }
}
