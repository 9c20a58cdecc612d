//! Bind (remote read-through) session bookkeeping (§4.9).
//!
//! This module is transport-agnostic: it tracks outstanding `get_bind`
//! sessions and exposes the `BindHandler` trait an edge implements to
//! resolve/accept bound keys. The concrete duplex stream (WebSocket, via
//! `tokio-tungstenite`) that frames live on lives in the `services/edge`
//! and `services/center` binaries, which drive this session table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{EdgeKvError, Result};
use edgekv_proto::{Command, Value};

/// Default bind-session timeout (§3 Lifecycles, §5 Cancellation).
pub const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_secs(10);

/// The method a [`BindHandler`] is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMethod {
    Get,
    Set,
    Delete,
}

/// Resolves read-through requests for keys matching a declared pattern.
/// Implemented by whatever the edge process wires up (e.g. a sensor
/// reading, a computed metric). `Set`/`Delete` results are side-effect
/// only — their `(value, ok)` return is not transmitted back to the
/// requester per §4.9 point 4.
pub trait BindHandler: Send + Sync {
    fn handle(&self, method: BindMethod, key: &str, value: Option<&Value>) -> (Option<Value>, bool);
}

/// Tracks outstanding `get_bind` sessions on the requesting (center) side.
/// A session is created on `begin`, destroyed by `resolve` (matching
/// `ret_bind`) or by `begin`'s timeout — whichever comes first — so the
/// session id is always reclaimed (§8 property 7: no session leaks).
#[derive(Clone)]
pub struct BindSessions {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<(Option<Value>, bool)>>>>,
    timeout: Duration,
}

impl BindSessions {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_BIND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        BindSessions {
            inner: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Begin a new session for `key`, returning its fresh session id and a
    /// future that resolves on the matching `ret_bind` or times out.
    pub async fn begin(&self, key: &str) -> (String, impl std::future::Future<Output = Result<(Option<Value>, bool)>>) {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(session_id.clone(), tx);

        let sessions = self.clone();
        let sid = session_id.clone();
        let wait_timeout = self.timeout;
        let waiter = async move {
            let result = timeout(wait_timeout, rx).await;
            // Whether we got an answer, timed out, or the sender was
            // dropped, the session id is always reclaimed here.
            sessions.inner.lock().await.remove(&sid);
            match result {
                Ok(Ok(answer)) => Ok(answer),
                Ok(Err(_)) => Err(EdgeKvError::Transport(format!("bind session {sid} sender dropped"))),
                Err(_) => Err(EdgeKvError::Transport(format!("bind session {sid} timed out"))),
            }
        };
        let _ = key; // key is carried by the caller's Message, not needed here
        (session_id, waiter)
    }

    /// Complete the session named by an inbound `ret_bind`. Idempotent:
    /// an unknown or already-resolved session id is a silent no-op
    /// (tolerates at-least-once redelivery).
    pub async fn resolve(&self, session_id: &str, value: Option<Value>, found: bool) {
        if let Some(tx) = self.inner.lock().await.remove(session_id) {
            let _ = tx.send((value, found));
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for BindSessions {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge-side table of inbound `get_bind` requests awaiting an answer,
/// exposed over HTTP as an alternative to holding a `/bind_observer`
/// socket open (§6: `GET /bind/{session_id}` reads the pending key, `PUT`
/// supplies the answer). The mirror image of [`BindSessions`], which
/// tracks the requester's (center's) side of the same correlation id.
#[derive(Clone, Default)]
pub struct PendingBindRequests {
    inner: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

struct PendingEntry {
    key: String,
    answer: oneshot::Sender<(Option<Value>, bool)>,
}

impl PendingBindRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session_id` as awaiting an answer for `key`, returning a
    /// receiver that resolves once [`PendingBindRequests::complete`] is
    /// called for this id (or is dropped with no answer, e.g. on timeout).
    pub async fn register(&self, session_id: impl Into<String>, key: impl Into<String>) -> oneshot::Receiver<(Option<Value>, bool)> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(session_id.into(), PendingEntry { key: key.into(), answer: tx });
        rx
    }

    /// The key a still-pending session is waiting to resolve, if any.
    pub async fn peek(&self, session_id: &str) -> Option<String> {
        self.inner.lock().await.get(session_id).map(|e| e.key.clone())
    }

    /// Supply the answer for a pending session, waking its registered
    /// receiver. Returns `false` if the session is unknown — already
    /// answered, expired, or never registered — so callers (the `PUT
    /// /bind/{session_id}` route) can report 404 rather than silently no-op.
    pub async fn complete(&self, session_id: &str, value: Option<Value>, found: bool) -> bool {
        match self.inner.lock().await.remove(session_id) {
            Some(entry) => {
                let _ = entry.answer.send((value, found));
                true
            }
            None => false,
        }
    }

    /// Drop a registered session without answering it (e.g. its timeout
    /// elapsed before either the in-process handler or a `PUT` answered).
    pub async fn forget(&self, session_id: &str) {
        self.inner.lock().await.remove(session_id);
    }
}

/// Dispatch one inbound `Command` against a [`BindHandler`], on the edge
/// side of the stream. Returns the reply `Command` to send back, if any
/// (`get_bind` replies with `ret_bind`; `set_bind`/`delete_bind` are
/// fire-and-forget and produce no reply).
pub fn handle_inbound(handler: &dyn BindHandler, cmd: &Command) -> Option<Command> {
    match cmd {
        Command::GetBind { key, session_id } => {
            let (value, found) = handler.handle(BindMethod::Get, key, None);
            Some(Command::RetBind {
                key: key.clone(),
                session_id: session_id.clone(),
                value,
                found,
            })
        }
        Command::SetBind { key, value } => {
            handler.handle(BindMethod::Set, key, Some(value));
            None
        }
        Command::DeleteBind { key } => {
            handler.handle(BindMethod::Delete, key, None);
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;
    impl BindHandler for EchoHandler {
        fn handle(&self, method: BindMethod, key: &str, _value: Option<&Value>) -> (Option<Value>, bool) {
            match method {
                BindMethod::Get if key == "metrics.cpu" => (Some(Value::Float(0.42)), true),
                BindMethod::Get => (None, false),
                BindMethod::Set | BindMethod::Delete => (None, true),
            }
        }
    }

    #[tokio::test]
    async fn scenario_s6_bind_round_trip() {
        let sessions = BindSessions::new();
        let (session_id, waiter) = sessions.begin("metrics.cpu").await;
        assert_eq!(sessions.len().await, 1);

        let reply = handle_inbound(
            &EchoHandler,
            &Command::GetBind {
                key: "metrics.cpu".into(),
                session_id: session_id.clone(),
            },
        )
        .unwrap();
        let Command::RetBind { session_id: got_sid, value, found, .. } = reply else {
            panic!("expected RetBind");
        };
        sessions.resolve(&got_sid, value, found).await;

        let (value, found) = waiter.await.unwrap();
        assert_eq!(value, Some(Value::Float(0.42)));
        assert!(found);
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn unresolved_session_times_out_and_is_reclaimed() {
        let sessions = BindSessions::with_timeout(Duration::from_millis(20));
        let (_sid, waiter) = sessions.begin("metrics.cpu").await;
        assert!(waiter.await.is_err());
        assert!(sessions.is_empty().await);
    }

    #[test]
    fn set_bind_and_delete_bind_produce_no_reply() {
        assert!(handle_inbound(&EchoHandler, &Command::SetBind { key: "k".into(), value: Value::Bool(true) }).is_none());
        assert!(handle_inbound(&EchoHandler, &Command::DeleteBind { key: "k".into() }).is_none());
    }

    #[tokio::test]
    async fn pending_request_completes_via_rest_style_answer() {
        let pending = PendingBindRequests::new();
        let rx = pending.register("S1", "metrics.cpu").await;
        assert_eq!(pending.peek("S1").await.as_deref(), Some("metrics.cpu"));

        let completed = pending.complete("S1", Some(Value::Float(0.42)), true).await;
        assert!(completed);
        assert_eq!(rx.await.unwrap(), (Some(Value::Float(0.42)), true));
        assert_eq!(pending.peek("S1").await, None);
    }

    #[tokio::test]
    async fn completing_unknown_session_reports_false() {
        let pending = PendingBindRequests::new();
        assert!(!pending.complete("nope", None, false).await);
    }

    #[test]
    fn get_bind_for_unknown_key_reports_not_found() {
        let reply = handle_inbound(
            &EchoHandler,
            &Command::GetBind { key: "nope".into(), session_id: "s".into() },
        )
        .unwrap();
        let Command::RetBind { found, value, .. } = reply else { panic!() };
        assert!(!found);
        assert_eq!(value, None);
    }
}
