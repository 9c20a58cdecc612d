//! A mock Bind-stream server: accepts a WebSocket connection, and for
//! every inbound `get_bind`/`set_bind`/`delete_bind` frame, resolves it
//! against a supplied [`BindHandler`] and writes back the reply per
//! [`edgekv::bind::handle_inbound`] — the same dispatch the real
//! `services/edge` Bind listener uses.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message as WsFrame;

use edgekv::bind::{handle_inbound, BindHandler};
use edgekv_proto::Message;

pub struct MockWsServer {
    addr: SocketAddr,
    _task: tokio::task::JoinHandle<()>,
}

impl MockWsServer {
    /// Start the mock server bound to a random port, replying to every
    /// connection as `replying_as` using `handler`.
    pub async fn start(
        replying_as: impl Into<String>,
        handler: Arc<dyn BindHandler>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let replying_as = replying_as.into();

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _peer)) => {
                        let handler = Arc::clone(&handler);
                        let replying_as = replying_as.clone();
                        tokio::spawn(async move {
                            let _ = Self::handle_connection(stream, replying_as, handler).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self { addr, _task: task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        replying_as: String,
        handler: Arc<dyn BindHandler>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        while let Some(msg_result) = read.next().await {
            let msg = msg_result?;
            let text = match msg {
                WsFrame::Text(t) => t,
                WsFrame::Close(_) => break,
                WsFrame::Ping(data) => {
                    write.send(WsFrame::Pong(data)).await?;
                    continue;
                }
                _ => continue,
            };

            let inbound = Message::from_json(&text)?;
            if let Some(reply) = handle_inbound(handler.as_ref(), &inbound.payload) {
                let reply = Message::new(replying_as.clone(), reply);
                write.send(WsFrame::Text(reply.to_json()?.into())).await?;
            }
        }

        Ok(())
    }
}
