//! A minimal WebSocket client speaking raw `edgekv_proto::Message` JSON
//! frames, for exercising a Bind stream end to end over a real socket.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message as WsFrame;
use tokio_tungstenite::MaybeTlsStream;

use edgekv_proto::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, WsFrame>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send_message(&mut self, msg: &Message) -> Result<(), Box<dyn std::error::Error>> {
        let json = msg.to_json()?;
        self.write.send(WsFrame::Text(json.into())).await?;
        Ok(())
    }

    pub async fn recv_message(&mut self) -> Result<Message, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(WsFrame::Text(text))) => return Ok(Message::from_json(&text)?),
                Some(Ok(WsFrame::Ping(_))) | Some(Ok(WsFrame::Pong(_))) => continue,
                Some(Ok(WsFrame::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(WsFrame::Close(None)).await?;
        Ok(())
    }
}
