//! The bus wire envelope: `Message { from, type, payload }`.
//!
//! Every frame that crosses the Bus or a Bind stream is one self-describing
//! `Message`. The `type` tag (`#[serde(tag = "type")]`) discriminates the
//! `Command` payload variant on deserialization, mirroring the teacher's
//! `WsMessage` (`#[serde(tag = "kind")]`) envelope style.

use serde::{Deserialize, Serialize};

use crate::value::{Changelog, Value};

/// Opaque, non-empty identifier naming an edge within a deployment.
pub type EdgeId = String;

/// One command payload variant. The `type` field on the wire names the
/// variant; `EdgeIds` are carried only in the outer `Message::from`, never
/// inside a payload's `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// A structural delta for `key`, as produced by `edgekv`'s Differ.
    Changelog { key: String, changes: Changelog },
    /// Declares that the sending edge can resolve read-through requests for
    /// any key matching `pattern`.
    DeclareBinder { pattern: String },
    /// A center-initiated read-through request, correlated by `session_id`.
    GetBind { key: String, session_id: String },
    /// The edge's reply to a `GetBind` with the same `session_id`.
    RetBind {
        key: String,
        session_id: String,
        value: Option<Value>,
        found: bool,
    },
    /// Fire-and-forget write to a bound key.
    SetBind { key: String, value: Value },
    /// Fire-and-forget delete of a bound key.
    DeleteBind { key: String },
}

impl Command {
    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Changelog { .. } => "changelog",
            Command::DeclareBinder { .. } => "declare_binder",
            Command::GetBind { .. } => "get_bind",
            Command::RetBind { .. } => "ret_bind",
            Command::SetBind { .. } => "set_bind",
            Command::DeleteBind { .. } => "delete_bind",
        }
    }
}

/// The envelope every bus/bind frame is wrapped in. `from` is the sole
/// authority for origin — never re-derive it from a payload's `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: EdgeId,
    #[serde(flatten)]
    pub payload: Command,
}

impl Message {
    pub fn new(from: impl Into<EdgeId>, payload: Command) -> Self {
        Message {
            from: from.into(),
            payload,
        }
    }

    pub fn changelog(from: impl Into<EdgeId>, key: impl Into<String>, changes: Changelog) -> Self {
        Message::new(
            from,
            Command::Changelog {
                key: key.into(),
                changes,
            },
        )
    }

    /// Encode as a single JSON line, the wire form used by both the Bus and
    /// Bind-stream transports.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
