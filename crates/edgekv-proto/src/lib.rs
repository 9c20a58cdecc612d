//! edgekv-proto: wire types shared by the center, every edge, and the test
//! harness — the JSON-like [`Value`] document model, the [`Change`]/
//! [`Changelog`] structural-diff types, and the [`Message`]/[`Command`] bus
//! envelope. No behavior lives here, only data and its (de)serialization;
//! the algorithms that operate on these types (diff/patch, coercion,
//! dispatch) live in the `edgekv` crate.

mod convert;
mod message;
mod value;

pub use convert::{format_go_duration, parse_go_duration, parse_rfc3339};
pub use message::{Command, EdgeId, Message};
pub use value::{Change, ChangeKind, Changelog, Value};
