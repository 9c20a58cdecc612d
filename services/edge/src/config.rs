//! Edge process configuration.
//!
//! TOML is the base config source; `EDGEKV_*` environment variables override
//! individual fields on top of it, so a deployment can ship one config file
//! and vary per-instance knobs (edge id, socket path) through the
//! environment instead of templating TOML.
//!
//! Default config path: `/etc/edgekv/edge.toml`.
//!
//! # Required fields
//! - `edge.id`
//! - `store.uri`
//! - `bus.uri`

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (validated)
// ---------------------------------------------------------------------------

/// Top-level edge configuration.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub edge_id: String,
    pub store_uri: String,
    pub bus_uri: String,
    pub ipc: IpcConfig,
}

#[derive(Debug, Clone)]
pub struct IpcConfig {
    pub socket_path: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    edge: Option<RawEdgeConfig>,
    store: Option<RawStoreConfig>,
    bus: Option<RawBusConfig>,
    ipc: Option<RawIpcConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawEdgeConfig {
    id: Option<String>,
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
struct RawIpcConfig {
    socket_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load edge config from a custom path, then apply `EDGEKV_*` env overrides.
pub fn load_config_from_path(path: &Path) -> Result<EdgeConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load edge config from the default path `/etc/edgekv/edge.toml`.
pub fn load_config() -> Result<EdgeConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/edgekv/edge.toml"))
}

/// Load edge config from a TOML string, applying `EDGEKV_*` env overrides
/// via [`std::env::var`] on top of it.
pub fn load_config_from_str(toml_str: &str) -> Result<EdgeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    apply_env_overrides(raw, |key| std::env::var(key).ok())
}

/// Core of [`load_config_from_str`], parameterized over the environment
/// lookup so tests can supply a fixed map instead of touching real env vars.
fn apply_env_overrides(
    raw: RawConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<EdgeConfig, ConfigError> {
    let edge_id = env("EDGEKV_EDGE_ID")
        .or_else(|| raw.edge.and_then(|e| e.id))
        .ok_or_else(|| ConfigError::MissingField("edge.id".to_owned()))?;
    if edge_id.is_empty() {
        return Err(ConfigError::InvalidValue("edge.id must not be empty".to_owned()));
    }

    let store_uri = env("EDGEKV_STORE_URI")
        .or_else(|| raw.store.and_then(|s| s.uri))
        .ok_or_else(|| ConfigError::MissingField("store.uri".to_owned()))?;

    let bus_uri = env("EDGEKV_BUS_URI")
        .or_else(|| raw.bus.and_then(|b| b.uri))
        .ok_or_else(|| ConfigError::MissingField("bus.uri".to_owned()))?;

    let socket_path = env("EDGEKV_SOCKET_PATH")
        .or_else(|| raw.ipc.and_then(|i| i.socket_path))
        .unwrap_or_else(|| "/run/edgekv/edge.sock".to_owned());

    Ok(EdgeConfig {
        edge_id,
        store_uri,
        bus_uri,
        ipc: IpcConfig { socket_path },
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
