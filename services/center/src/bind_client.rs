//! Center-initiated side of the Bind protocol (§4.9): opens a long-lived
//! WebSocket stream to an edge's `/bind_observer/{key}` route and drives
//! `get_bind`/`set_bind`/`delete_bind` frames over it, correlating replies
//! through `edgekv::bind::BindSessions` — the same session table the
//! edge side exercises against a real socket in
//! `edgekv-test-utils::mock_ws_server`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message as WsFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

use edgekv::bind::BindSessions;
use edgekv::error::{EdgeKvError, Result};
use edgekv_proto::{Command, Message, Value};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One standing Bind connection to a single edge. In practice this single
/// stream carries requests for every pattern that edge has declared
/// (§4.9's "long-lived framed stream... for each bound pattern" maps to
/// one connection per edge, not per pattern).
pub struct BindClient {
    edge_id: String,
    write: Mutex<SplitSink<WsStream, WsFrame>>,
    sessions: BindSessions,
}

impl BindClient {
    /// Connect to `url` (the edge's `/bind_observer/{key}` WebSocket route) and spawn the
    /// background reader that resolves inbound `ret_bind` replies against
    /// the session table.
    pub async fn connect(edge_id: impl Into<String>, url: &str) -> Result<Arc<Self>> {
        let edge_id = edge_id.into();
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| EdgeKvError::Transport(format!("bind connect to '{url}' failed: {e}")))?;
        let (write, mut read) = ws_stream.split();
        let sessions = BindSessions::new();

        let client = Arc::new(BindClient {
            edge_id: edge_id.clone(),
            write: Mutex::new(write),
            sessions: sessions.clone(),
        });

        tokio::spawn(async move {
            loop {
                let frame = match read.next().await {
                    Some(Ok(f)) => f,
                    Some(Err(e)) => {
                        warn!(edge_id = %edge_id, error = %e, "bind stream read error");
                        break;
                    }
                    None => break,
                };
                let text = match frame {
                    WsFrame::Text(t) => t,
                    WsFrame::Close(_) => break,
                    WsFrame::Ping(_) | WsFrame::Pong(_) => continue,
                    _ => continue,
                };
                match Message::from_json(&text) {
                    Ok(msg) => {
                        if let Command::RetBind { session_id, value, found, .. } = msg.payload {
                            sessions.resolve(&session_id, value, found).await;
                        }
                    }
                    Err(e) => warn!(edge_id = %edge_id, error = %e, "dropping undecodable bind frame"),
                }
            }
            debug_reader_exit(&edge_id);
        });

        Ok(client)
    }

    /// §4.9 steps 2-3: request `key` from the edge and await its
    /// `ret_bind`, or the session's configured timeout (default 10s).
    pub async fn get_bind(&self, key: &str) -> Result<(Option<Value>, bool)> {
        let (session_id, waiter) = self.sessions.begin(key).await;
        let msg = Message::new("center", Command::GetBind { key: key.to_string(), session_id });
        self.send(&msg).await?;
        waiter.await
    }

    /// Fire-and-forget write to a bound key (§4.9 point 4). The edge's
    /// `(value, ok)` return from its handler is not transmitted back.
    pub async fn set_bind(&self, key: &str, value: Value) -> Result<()> {
        let msg = Message::new("center", Command::SetBind { key: key.to_string(), value });
        self.send(&msg).await
    }

    /// Fire-and-forget delete of a bound key (§4.9 point 4).
    pub async fn delete_bind(&self, key: &str) -> Result<()> {
        let msg = Message::new("center", Command::DeleteBind { key: key.to_string() });
        self.send(&msg).await
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        let json = msg.to_json()?;
        self.write
            .lock()
            .await
            .send(WsFrame::Text(json.into()))
            .await
            .map_err(|e| EdgeKvError::Transport(format!("bind send to '{}' failed: {e}", self.edge_id)))
    }
}

fn debug_reader_exit(edge_id: &str) {
    tracing::debug!(edge_id, "bind stream reader exited");
}

/// Holds one [`BindClient`] per configured edge (`CenterConfig::edges`),
/// connected eagerly at startup. A center that never configures any
/// `[edges.*]` table simply has an empty set and serves plain sync
/// traffic without Bind.
#[derive(Default)]
pub struct BindClients {
    clients: HashMap<String, Arc<BindClient>>,
}

impl BindClients {
    pub async fn connect_all(edges: &HashMap<String, String>) -> Self {
        let mut clients = HashMap::new();
        for (edge_id, url) in edges {
            match BindClient::connect(edge_id.clone(), url).await {
                Ok(client) => {
                    clients.insert(edge_id.clone(), client);
                }
                Err(e) => {
                    warn!(edge_id = %edge_id, url = %url, error = %e, "failed to connect bind stream at startup");
                }
            }
        }
        BindClients { clients }
    }

    pub fn get(&self, edge_id: &str) -> Option<Arc<BindClient>> {
        self.clients.get(edge_id).cloned()
    }
}
