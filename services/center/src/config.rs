//! Center process configuration.
//!
//! TOML is the base config source; `EDGEKV_*` environment variables
//! override individual fields on top of it, the same layering
//! `services/edge` uses.
//!
//! Default config path: `/etc/edgekv/center.toml`.
//!
//! # Required fields
//! - `store.uri`
//! - `bus.uri`

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CenterConfig {
    pub store_uri: String,
    pub bus_uri: String,
    pub http: HttpConfig,
    /// Known Bind-stream addresses per edge (`ws://host:port/bind_observer/{key}`), used
    /// by the center-initiated read-through route.
    pub edges: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    store: Option<RawStoreConfig>,
    bus: Option<RawBusConfig>,
    http: Option<RawHttpConfig>,
    #[serde(default)]
    edges: HashMap<String, RawEdgeConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawStoreConfig {
    uri: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBusConfig {
    uri: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawHttpConfig {
    bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEdgeConfig {
    bind_url: String,
}

pub fn load_config_from_path(path: &Path) -> Result<CenterConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<CenterConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/edgekv/center.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<CenterConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    apply_env_overrides(raw, |key| std::env::var(key).ok())
}

fn apply_env_overrides(
    raw: RawConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CenterConfig, ConfigError> {
    let store_uri = env("EDGEKV_STORE_URI")
        .or_else(|| raw.store.and_then(|s| s.uri))
        .ok_or_else(|| ConfigError::MissingField("store.uri".to_owned()))?;

    let bus_uri = env("EDGEKV_BUS_URI")
        .or_else(|| raw.bus.and_then(|b| b.uri))
        .ok_or_else(|| ConfigError::MissingField("bus.uri".to_owned()))?;

    let bind = env("EDGEKV_HTTP_BIND")
        .or_else(|| raw.http.and_then(|h| h.bind))
        .unwrap_or_else(|| "0.0.0.0:8090".to_owned());

    let edges = raw
        .edges
        .into_iter()
        .map(|(id, cfg)| (id, cfg.bind_url))
        .collect();

    Ok(CenterConfig {
        store_uri,
        bus_uri,
        http: HttpConfig { bind },
        edges,
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_loads_ok() {
        let raw: RawConfig = toml::from_str(
            r#"
            [store]
            uri = "mem://"
            [bus]
            uri = "mem://"
            "#,
        )
        .unwrap();
        let cfg = apply_env_overrides(raw, |_| None).unwrap();
        assert_eq!(cfg.http.bind, "0.0.0.0:8090");
        assert!(cfg.edges.is_empty());
    }

    #[test]
    fn edges_table_is_loaded() {
        let raw: RawConfig = toml::from_str(
            r#"
            [store]
            uri = "mem://"
            [bus]
            uri = "mem://"
            [edges.E1]
            bind_url = "ws://10.0.0.5:9100/bind_observer/metrics.*"
            "#,
        )
        .unwrap();
        let cfg = apply_env_overrides(raw, |_| None).unwrap();
        assert_eq!(cfg.edges.get("E1").map(String::as_str), Some("ws://10.0.0.5:9100/bind_observer/metrics.*"));
    }
}
