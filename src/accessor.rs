//! Typed scalar views over an untyped [`Getter`].
//!
//! `Accessor` wraps anything that can answer `get(key) -> (value, present)`
//! and `keys() -> [key]` — in practice a [`crate::store::Store`] — and
//! coerces the raw [`Value`] to a requested scalar type, falling back to
//! the type's falsy default on a failed coercion rather than erroring.
//! This mirrors the teacher's `Getter`-wraps-a-map-store shape used
//! throughout its config loading, just generalized to the JSON-like
//! [`Value`] sum type instead of `toml`/`serde_json::Value` directly.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use edgekv_proto::{parse_go_duration, parse_rfc3339, Value};

/// Anything `Accessor` can coerce values out of.
pub trait Getter {
    fn get(&self, key: &str) -> (Value, bool);
    fn keys(&self) -> Vec<String>;
}

/// Coerces [`Value`]s read through a [`Getter`] to requested scalar types.
///
/// Every `get_*` method returns the coerced value on success, or that
/// type's falsy default (`0`, `false`, `""`, empty collection, the Unix
/// epoch, `Duration::ZERO`) when the underlying value is absent or can't be
/// coerced — it never errors, matching the teacher's "Viper never panics on
/// a missing key" ergonomics.
pub struct Accessor<G: Getter> {
    getter: G,
    defaults: HashMap<String, Value>,
}

impl<G: Getter> Accessor<G> {
    pub fn new(getter: G) -> Self {
        Accessor {
            getter,
            defaults: HashMap::new(),
        }
    }

    /// Record a value consulted only when the underlying getter returns
    /// absent for `key`.
    pub fn set_default(&mut self, key: impl Into<String>, value: Value) {
        self.defaults.insert(key.into(), value);
    }

    fn raw(&self, key: &str) -> Value {
        let (value, present) = self.getter.get(key);
        if present {
            return value;
        }
        self.defaults.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn get_string(&self, key: &str) -> String {
        coerce_string(&self.raw(key)).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        coerce_bool(&self.raw(key)).unwrap_or(false)
    }

    pub fn get_int(&self, key: &str) -> i64 {
        coerce_int(&self.raw(key)).unwrap_or(0)
    }

    pub fn get_int32(&self, key: &str) -> i32 {
        coerce_int(&self.raw(key)).and_then(|i| i32::try_from(i).ok()).unwrap_or(0)
    }

    pub fn get_int64(&self, key: &str) -> i64 {
        self.get_int(key)
    }

    pub fn get_uint(&self, key: &str) -> u64 {
        coerce_int(&self.raw(key)).and_then(|i| u64::try_from(i).ok()).unwrap_or(0)
    }

    pub fn get_uint32(&self, key: &str) -> u32 {
        coerce_int(&self.raw(key)).and_then(|i| u32::try_from(i).ok()).unwrap_or(0)
    }

    pub fn get_uint64(&self, key: &str) -> u64 {
        self.get_uint(key)
    }

    pub fn get_float64(&self, key: &str) -> f64 {
        coerce_float(&self.raw(key)).unwrap_or(0.0)
    }

    pub fn get_time(&self, key: &str) -> DateTime<Utc> {
        coerce_time(&self.raw(key)).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
    }

    pub fn get_duration(&self, key: &str) -> Duration {
        coerce_duration(&self.raw(key)).unwrap_or(Duration::ZERO)
    }

    pub fn get_int_slice(&self, key: &str) -> Vec<i64> {
        match self.raw(key) {
            Value::Array(items) => items.iter().filter_map(coerce_int).collect(),
            _ => Vec::new(),
        }
    }

    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        match self.raw(key) {
            Value::Array(items) => items.iter().filter_map(coerce_string).collect(),
            _ => Vec::new(),
        }
    }

    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, Value> {
        match self.raw(key) {
            Value::Object(map) => map,
            _ => BTreeMap::new(),
        }
    }

    pub fn get_string_map_string(&self, key: &str) -> BTreeMap<String, String> {
        match self.raw(key) {
            Value::Object(map) => map
                .into_iter()
                .filter_map(|(k, v)| coerce_string(&v).map(|s| (k, s)))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// All keys known to the underlying getter plus any `set_default` keys
    /// not already present there.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = self.getter.keys();
        for k in self.defaults.keys() {
            if !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        keys
    }

    /// Materialize every key this accessor knows about into a flat map.
    pub fn all_settings(&self) -> BTreeMap<String, Value> {
        self.all_keys().into_iter().map(|k| (k.clone(), self.raw(&k))).collect()
    }
}

/// Coerce `value` to the scalar type named by `type_name` (the `Accessor`
/// method names of §4.2 without their `get_` prefix — `"string"`, `"bool"`,
/// `"int"`, `"int32"`, `"int64"`, `"uint"`, `"uint32"`, `"uint64"`,
/// `"float64"`, `"time"`, `"duration"`; unrecognized names pass `value`
/// through unchanged). Used by the edge IPC surface's `?type=` query
/// parameter (§6), which coerces a single already-resolved value rather
/// than going through a full [`Getter`].
pub fn coerce_named(value: &Value, type_name: &str) -> Value {
    match type_name {
        "string" => coerce_string(value).map(Value::String).unwrap_or_default(),
        "bool" => Value::Bool(coerce_bool(value).unwrap_or(false)),
        "int" | "int64" => Value::Int(coerce_int(value).unwrap_or(0)),
        "int32" => Value::Int(i64::from(coerce_int(value).and_then(|i| i32::try_from(i).ok()).unwrap_or(0))),
        "uint" | "uint64" => Value::Int(coerce_int(value).and_then(|i| u64::try_from(i).ok()).unwrap_or(0) as i64),
        "uint32" => Value::Int(i64::from(coerce_int(value).and_then(|i| u32::try_from(i).ok()).unwrap_or(0))),
        "float64" => Value::Float(coerce_float(value).unwrap_or(0.0)),
        "time" => coerce_time(value).map(Value::Time).unwrap_or(Value::Null),
        "duration" => coerce_duration(value).map(Value::Duration).unwrap_or(Value::Null),
        _ => value.clone(),
    }
}

/// Parse a raw text literal (an IPC write body with `?type=` set, which
/// arrives as plain text rather than JSON) into the scalar `Value` named by
/// `type_name`. The inverse of [`coerce_named`] for the write path.
pub fn parse_named(raw: &str, type_name: &str) -> Value {
    coerce_named(&Value::String(raw.to_string()), type_name)
}

fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "y" => Some(true),
            "0" | "f" | "false" | "no" | "n" => Some(false),
            _ => None,
        },
        Value::Int(i) => Some(*i != 0),
        _ => None,
    }
}

fn coerce_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Float(f) => Some(*f as i64),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn coerce_float(v: &Value) -> Option<f64> {
    match v {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_time(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Time(t) => Some(*t),
        Value::String(s) => parse_rfc3339(s),
        _ => None,
    }
}

fn coerce_duration(v: &Value) -> Option<Duration> {
    match v {
        Value::Duration(d) => Some(*d),
        Value::String(s) => parse_go_duration(s),
        Value::Int(i) => Some(Duration::from_nanos((*i).max(0) as u64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    struct MapGetter(Map<String, Value>);

    impl Getter for MapGetter {
        fn get(&self, key: &str) -> (Value, bool) {
            match self.0.get(key) {
                Some(v) => (v.clone(), true),
                None => (Value::Null, false),
            }
        }

        fn keys(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }
    }

    #[test]
    fn missing_key_returns_falsy_default() {
        let a = Accessor::new(MapGetter(Map::new()));
        assert_eq!(a.get_string("x"), "");
        assert_eq!(a.get_int("x"), 0);
        assert!(!a.get_bool("x"));
    }

    #[test]
    fn set_default_is_consulted_only_when_absent() {
        let mut a = Accessor::new(MapGetter(Map::new()));
        a.set_default("x", Value::Int(42));
        assert_eq!(a.get_int("x"), 42);

        let mut present = Map::new();
        present.insert("x".to_string(), Value::Int(7));
        let mut a2 = Accessor::new(MapGetter(present));
        a2.set_default("x", Value::Int(42));
        assert_eq!(a2.get_int("x"), 7);
    }

    #[test]
    fn scenario_s4_time_coercion_via_accessor() {
        let mut m = Map::new();
        m.insert(
            "t.createdAt".to_string(),
            Value::String("2020-10-04T01:02:03.000000004Z".to_string()),
        );
        let a = Accessor::new(MapGetter(m));
        let t = a.get_time("t.createdAt");
        assert_eq!(t.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true), "2020-10-04T01:02:03.000000004Z");
    }

    #[test]
    fn duration_accepts_go_style_string() {
        let mut m = Map::new();
        m.insert("d".to_string(), Value::String("1h30m".to_string()));
        let a = Accessor::new(MapGetter(m));
        assert_eq!(a.get_duration("d"), Duration::from_secs(90 * 60));
    }

    #[test]
    fn coerce_named_matches_the_typed_getter_it_stands_in_for() {
        assert_eq!(coerce_named(&Value::String("1235".into()), "int"), Value::Int(1235));
        assert_eq!(coerce_named(&Value::String("true".into()), "bool"), Value::Bool(true));
        assert_eq!(coerce_named(&Value::Int(7), "string"), Value::String("7".into()));
    }

    #[test]
    fn parse_named_builds_a_scalar_from_ipc_write_text() {
        assert_eq!(parse_named("1235", "int"), Value::Int(1235));
        assert_eq!(parse_named("true", "bool"), Value::Bool(true));
        assert_eq!(parse_named("1h30m", "duration"), Value::Duration(Duration::from_secs(90 * 60)));
    }

    #[test]
    fn bool_coercion_accepts_json_native_and_string_forms() {
        let mut m = Map::new();
        m.insert("a".to_string(), Value::Bool(true));
        m.insert("b".to_string(), Value::String("yes".to_string()));
        let a = Accessor::new(MapGetter(m));
        assert!(a.get_bool("a"));
        assert!(a.get_bool("b"));
    }
}
