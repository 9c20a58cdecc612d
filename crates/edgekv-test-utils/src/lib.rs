//! Shared test scaffolding for EdgeKV's integration and scenario tests:
//! an in-process loopback `Bus`, a ready-wired edge/center harness over
//! in-memory stores, and a mock WebSocket peer for exercising a Bind
//! stream over a real socket.

pub mod harness;
pub mod local_bus;
pub mod mock_ws_client;
pub mod mock_ws_server;

pub use harness::{watch_channel, Harness, MemoryCenterStore};
pub use local_bus::LocalBus;
pub use mock_ws_client::MockWsClient;
pub use mock_ws_server::MockWsServer;

#[cfg(test)]
mod tests {
    use super::*;
    use edgekv::bind::{BindMethod, BindSessions};
    use edgekv_proto::Value;
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoHandler;
    impl edgekv::bind::BindHandler for EchoHandler {
        fn handle(&self, method: BindMethod, key: &str, _value: Option<&Value>) -> (Option<Value>, bool) {
            match method {
                BindMethod::Get if key == "metrics.cpu" => (Some(Value::Float(0.75)), true),
                BindMethod::Get => (None, false),
                BindMethod::Set | BindMethod::Delete => (None, true),
            }
        }
    }

    #[tokio::test]
    async fn scenario_s6_bind_round_trip_over_real_socket() {
        let server = MockWsServer::start("E1", Arc::new(EchoHandler)).await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let mut client = MockWsClient::connect(&url).await.unwrap();

        let sessions = BindSessions::new();
        let (session_id, waiter) = sessions.begin("metrics.cpu").await;

        client
            .send_message(&edgekv_proto::Message::new(
                "center",
                edgekv_proto::Command::GetBind {
                    key: "metrics.cpu".into(),
                    session_id: session_id.clone(),
                },
            ))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), client.recv_message())
            .await
            .unwrap()
            .unwrap();
        let edgekv_proto::Command::RetBind { session_id: got_sid, value, found, .. } = reply.payload else {
            panic!("expected RetBind");
        };
        sessions.resolve(&got_sid, value, found).await;

        let (value, found) = waiter.await.unwrap();
        assert_eq!(value, Some(Value::Float(0.75)));
        assert!(found);
    }
}
