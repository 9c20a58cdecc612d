//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `edgekv` surfaces one of these variants.
//! `NotFound` and `NotImplemented` are distinct sentinels — callers must
//! compare against them with `matches!`, never by inspecting a message
//! string, so that IPC layers can map them to the right status code.

use thiserror::Error;

/// The error type returned by every fallible `edgekv` operation.
#[derive(Debug, Error)]
pub enum EdgeKvError {
    /// Missing or invalid configuration (store/bus URI, edge id, socket path).
    /// Fatal at start — the caller should log and exit rather than retry.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bus connect failed, publish timed out, or IPC I/O failed.
    /// Recoverable — callers should log and retry per the transport's policy.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single message failed to encode or decode. The message is dropped
    /// and the subscription continues.
    #[error("codec error: {0}")]
    Codec(String),

    /// A store read-modify-write failed. No partial commit is observable.
    #[error("store error: {0}")]
    Store(String),

    /// The addressed key does not resolve to a value.
    #[error("key not found")]
    NotFound,

    /// The requested operation is not implemented by this backend.
    #[error("not implemented")]
    NotImplemented,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("mqtt client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
}

impl EdgeKvError {
    /// True for errors callers should treat as benign/retryable rather than fatal.
    pub fn is_transport(&self) -> bool {
        matches!(self, EdgeKvError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, EdgeKvError>;
