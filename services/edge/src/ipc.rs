//! Local IPC surface, served over a Unix domain socket: the interface
//! other processes on the same edge device use to read/write keys, watch
//! for changes, and serve as a Bind handler for the center.
//!
//! Routes (§6):
//! - `GET  /healthz` / `GET /readyz`
//! - `GET  /key/{key}` — `{"status", "data", "error"}`; `?type=<t>` coerces
//!   the result via [`edgekv::accessor::coerce_named`]; 404 if absent.
//! - `POST /key/{key}` — JSON body becomes the new value, unless `?type=<t>`
//!   is set, in which case the body is read as plain text and parsed as
//!   that scalar type via [`edgekv::accessor::parse_named`].
//! - `GET  /keys` — every root key currently stored.
//! - `GET  /watch/{pattern}` — server-sent events, one per matching change.
//! - `GET  /bind_observer/{key}` — WebSocket upgrade; the center (or any
//!   process resolving bound keys for `key`'s pattern) connects here and
//!   exchanges `get_bind`/`set_bind`/`delete_bind` frames, answered against
//!   the edge's own store per [`edgekv::bind::handle_inbound`].
//! - `GET/PUT /bind/{session_id}` — the polling alternative to holding a
//!   `/bind_observer` socket open: `GET` reads the key a still-pending
//!   session is waiting to resolve, `PUT` supplies the answer.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use edgekv::accessor::{coerce_named, parse_named};
use edgekv::bind::{handle_inbound, BindHandler, BindMethod, PendingBindRequests};
use edgekv::store::Store;
use edgekv::EdgeNode;
use edgekv_proto::{Command, Message as EkMessage, Value};

#[derive(Clone)]
pub struct IpcState {
    pub edge: Arc<EdgeNode>,
    pub pending: PendingBindRequests,
}

pub fn router(edge: Arc<EdgeNode>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/key/{key}", get(get_key).post(post_key))
        .route("/keys", get(list_keys))
        .route("/watch/{pattern}", get(watch))
        .route("/bind_observer/{key}", get(bind_observer_upgrade))
        .route("/bind/{session_id}", get(get_pending_bind).put(put_pending_bind))
        .with_state(IpcState { edge, pending: PendingBindRequests::new() })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<IpcState>) -> impl IntoResponse {
    match state.edge.store().keys().await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

#[derive(Serialize)]
struct KeyResponse {
    status: &'static str,
    data: Option<serde_json::Value>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TypeQuery {
    #[serde(rename = "type")]
    ty: Option<String>,
}

async fn get_key(
    State(state): State<IpcState>,
    Path(key): Path<String>,
    Query(q): Query<TypeQuery>,
) -> (StatusCode, Json<KeyResponse>) {
    match state.edge.get(&key).await {
        Ok((value, true)) => {
            let value = match &q.ty {
                Some(t) => coerce_named(&value, t),
                None => value,
            };
            let data = serde_json::to_value(&value).ok();
            (StatusCode::OK, Json(KeyResponse { status: "ok", data, error: None }))
        }
        Ok((_, false)) => (
            StatusCode::NOT_FOUND,
            Json(KeyResponse { status: "error", data: None, error: Some("key not found".to_string()) }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(KeyResponse { status: "error", data: None, error: Some(e.to_string()) }),
        ),
    }
}

async fn post_key(
    State(state): State<IpcState>,
    Path(key): Path<String>,
    Query(q): Query<TypeQuery>,
    body: Bytes,
) -> (StatusCode, Json<KeyResponse>) {
    let value = match &q.ty {
        Some(t) => {
            let text = String::from_utf8_lossy(&body);
            parse_named(text.trim(), t)
        }
        None => match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(KeyResponse { status: "error", data: None, error: Some(e.to_string()) }),
                )
            }
        },
    };
    match state.edge.set(&key, value).await {
        Ok(()) => (StatusCode::OK, Json(KeyResponse { status: "ok", data: None, error: None })),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(KeyResponse { status: "error", data: None, error: Some(e.to_string()) }),
        ),
    }
}

async fn list_keys(
    State(state): State<IpcState>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let keys = state
        .edge
        .store()
        .keys()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(keys))
}

/// Encode one `WatchEvent` as an SSE `change` event whose data is the
/// base64 of its JSON encoding, per the `/watch/{pattern}` wire format.
fn encode_change_event(event: &edgekv::dispatcher::WatchEvent) -> Event {
    let payload = json!({
        "key": event.key,
        "from": event.from,
        "old": event.old,
        "new": event.new,
    });
    let encoded = BASE64.encode(payload.to_string());
    Event::default().event("change").data(encoded)
}

/// Drops the dispatcher subscription once the client disconnects and this
/// stream is dropped — otherwise every SSE connection would leak a
/// `Dispatcher` subscription for the life of the edge process.
struct WatchStream {
    inner: tokio_stream::wrappers::UnboundedReceiverStream<edgekv::dispatcher::WatchEvent>,
    edge: Arc<EdgeNode>,
    sub_id: edgekv::dispatcher::SubId,
}

impl Stream for WatchStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx).map(|opt| {
            opt.map(|event| Ok(encode_change_event(&event)))
        })
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        let edge = Arc::clone(&self.edge);
        let sub_id = self.sub_id;
        tokio::spawn(async move {
            edge.dispatcher().unwatch(sub_id).await;
        });
    }
}

async fn watch(
    State(state): State<IpcState>,
    Path(pattern): Path<String>,
) -> Sse<WatchStream> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let sub_id = state
        .edge
        .watch(pattern, move |event| {
            let _ = tx.send(event);
        })
        .await;

    Sse::new(WatchStream {
        inner: tokio_stream::wrappers::UnboundedReceiverStream::new(rx),
        edge: state.edge,
        sub_id,
    })
}

/// Reads/writes the local store for `get_bind`/`set_bind`, via a blocking
/// hop into the async runtime — the edge's own process, so no network
/// round trip is involved. The default computation strategy for a bound
/// key; a dedicated edge process can supersede it per key by answering
/// `GET /bind/{session_id}` faster (first write to the pending entry wins).
struct StoreBindHandler {
    store: Arc<dyn Store>,
}

impl BindHandler for StoreBindHandler {
    fn handle(&self, method: BindMethod, key: &str, value: Option<&Value>) -> (Option<Value>, bool) {
        let store = Arc::clone(&self.store);
        let key = key.to_owned();
        match method {
            BindMethod::Get => {
                let result = tokio::task::block_in_place(|| {
                    tokio::runtime::Handle::current().block_on(store.get(&key))
                });
                match result {
                    Ok((v, true)) => (Some(v), true),
                    _ => (None, false),
                }
            }
            BindMethod::Set => {
                if let Some(v) = value {
                    let v = v.clone();
                    let _ = tokio::task::block_in_place(|| {
                        tokio::runtime::Handle::current().block_on(store.set(&key, v))
                    });
                }
                (None, true)
            }
            BindMethod::Delete => (None, true),
        }
    }
}

async fn bind_observer_upgrade(
    State(state): State<IpcState>,
    Path(_key): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_bind_socket(socket, Arc::clone(state.edge.store()), state.pending)
    })
}

async fn handle_bind_socket(mut socket: WebSocket, store: Arc<dyn Store>, pending: PendingBindRequests) {
    let handler = StoreBindHandler { store };
    while let Some(Ok(frame)) = socket.recv().await {
        let text = match frame {
            WsFrame::Text(t) => t,
            WsFrame::Close(_) => break,
            _ => continue,
        };
        let inbound = match EkMessage::from_json(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed bind frame");
                continue;
            }
        };

        if let Command::GetBind { key, session_id } = &inbound.payload {
            // Register the session so a `PUT /bind/{session_id}` can
            // supply the answer instead, then try the in-process handler —
            // whichever writes first wins, since `complete` only accepts
            // the first answer for a given session id.
            let rx = pending.register(session_id.clone(), key.clone()).await;
            let (value, found) = handler.handle(BindMethod::Get, key, None);
            pending.complete(session_id, value, found).await;
            let Ok((value, found)) = rx.await else { continue };
            let reply = EkMessage::new(
                "edge",
                Command::RetBind { key: key.clone(), session_id: session_id.clone(), value, found },
            );
            let Ok(json) = reply.to_json() else { continue };
            if socket.send(WsFrame::Text(json.into())).await.is_err() {
                break;
            }
            continue;
        }

        if let Some(reply) = handle_inbound(&handler, &inbound.payload) {
            let reply = EkMessage::new("edge", reply);
            let Ok(json) = reply.to_json() else { continue };
            if socket.send(WsFrame::Text(json.into())).await.is_err() {
                break;
            }
        }
    }
}

#[derive(Serialize)]
struct PendingBindResponse {
    key: String,
}

async fn get_pending_bind(
    State(state): State<IpcState>,
    Path(session_id): Path<String>,
) -> Result<Json<PendingBindResponse>, StatusCode> {
    match state.pending.peek(&session_id).await {
        Some(key) => Ok(Json(PendingBindResponse { key })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Deserialize)]
struct PendingBindAnswer {
    value: Option<Value>,
    #[serde(default)]
    found: bool,
}

async fn put_pending_bind(
    State(state): State<IpcState>,
    Path(session_id): Path<String>,
    Json(body): Json<PendingBindAnswer>,
) -> StatusCode {
    if state.pending.complete(&session_id, body.value, body.found).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
