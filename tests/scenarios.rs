//! Cross-crate scenario tests: the literal-value scenarios S1-S6 from
//! §8, exercised through the public API of `edgekv` plus the loopback
//! bus/stores `edgekv-test-utils` provides — no crate-internal access.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use edgekv::bind::{BindHandler, BindMethod, BindSessions};
use edgekv::bus::Bus;
use edgekv::{diff, patch, ChangeKind, EdgeNode, Value};
use edgekv_stores::MemoryStore;
use edgekv_test_utils::{watch_channel, Harness, LocalBus, MockWsClient, MockWsServer};

fn obj(pairs: &[(&str, Value)]) -> Value {
    let mut m = BTreeMap::new();
    for (k, v) in pairs {
        m.insert((*k).to_string(), v.clone());
    }
    Value::Object(m)
}

/// S1: edge "E1" writes `test = {id: 1234, on: true}`, then
/// `set("test.id", 1235)`; the center applies the changelog under the
/// "E1:test" namespace and ends up with {id: 1235, on: true}.
#[tokio::test]
async fn s1_edge_write_reaches_center_under_namespace() {
    let h = Harness::new("E1").await;
    h.edge
        .set(
            "test",
            obj(&[("id", Value::Int(1234)), ("on", Value::Bool(true))]),
        )
        .await
        .unwrap();

    let mut events = watch_channel(h.center.dispatcher(), "E1:test.*").await;
    h.edge.set("test.id", Value::Int(1235)).await.unwrap();

    let event = timeout(Duration::from_millis(200), events.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    assert_eq!(event.key, "E1:test.id");
    assert_eq!(event.new, Value::Int(1235));

    let (doc, present) = h.center.open_edge("E1").get("test").await.unwrap();
    assert!(present);
    assert_eq!(doc.get_path(&["id"]), Some(&Value::Int(1235)));
    assert_eq!(doc.get_path(&["on"]), Some(&Value::Bool(true)));
}

/// S2: center `open_edge("E1").set("flag", true)`; the edge's sync
/// subscriber patches, `edge.get("flag") == true`, and a local watcher
/// fires exactly once.
#[tokio::test]
async fn s2_center_write_reaches_edge_exactly_once() {
    let h = Harness::new("E1").await;
    let mut events = watch_channel(h.edge.dispatcher(), "flag").await;

    h.center.open_edge("E1").set("flag", Value::Bool(true)).await.unwrap();

    let event = timeout(Duration::from_millis(200), events.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    assert_eq!(event.new, Value::Bool(true));

    let (value, present) = h.edge.get("flag").await.unwrap();
    assert!(present);
    assert_eq!(value, Value::Bool(true));

    let second = timeout(Duration::from_millis(50), events.recv()).await;
    assert!(second.is_err(), "watcher should fire exactly once");
}

/// S3: `set("user", {name: "Alice"})` when `user = {name: "Bob", age: 30}`
/// collapses to a two-entry "replace whole" changelog because the old map
/// has a key (`age`) the new one doesn't. Both entries are root-document-
/// relative (empty path) — the diff is handed `user`'s own value, not a
/// document keyed by `"user"` — so patching the old value with this
/// changelog must converge to exactly `new`.
#[test]
fn s3_whole_root_replace_on_key_removal() {
    let old = obj(&[("name", Value::String("Bob".into())), ("age", Value::Int(30))]);
    let new = obj(&[("name", Value::String("Alice".into()))]);

    let changes = diff(&old, &new);
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].kind, ChangeKind::Delete);
    assert!(changes[0].path.is_empty());
    assert_eq!(changes[1].kind, ChangeKind::Create);
    assert!(changes[1].path.is_empty());
    assert_eq!(changes[1].to.as_ref(), Some(&new));
    assert_eq!(patch(&old, &changes), new);
}

/// S5: a Dispatcher has subscribers for "test.*" and "test.on";
/// dispatching a change to "test.on" invokes both, and "test.*" never
/// matches "test" (no sub-path to take the place of the wildcard segment).
#[tokio::test]
async fn s5_pattern_fan_out() {
    let bus: Arc<dyn Bus> = LocalBus::new();
    let edge = Arc::new(EdgeNode::new("E1", MemoryStore::new(), bus).unwrap());
    edge.run().await.unwrap();

    let mut star = watch_channel(edge.dispatcher(), "test.*").await;
    let mut exact = watch_channel(edge.dispatcher(), "test.on").await;

    edge.set("test.on", Value::Bool(true)).await.unwrap();

    timeout(Duration::from_millis(200), star.recv()).await.unwrap().unwrap();
    timeout(Duration::from_millis(200), exact.recv()).await.unwrap().unwrap();

    assert!(edgekv::keypath::matches("test.*", "test.on"));
    assert!(!edgekv::keypath::matches("test.*", "test"));
}

/// S6: a center session opens a real WebSocket to a mock edge peer,
/// sends `get_bind`, and the matching `ret_bind` resolves the session with
/// no leak — the session table is empty again once the answer lands.
#[tokio::test]
async fn s6_bind_round_trip_over_real_socket() {
    struct CpuHandler;
    impl BindHandler for CpuHandler {
        fn handle(&self, method: BindMethod, key: &str, _value: Option<&Value>) -> (Option<Value>, bool) {
            match method {
                BindMethod::Get if key == "metrics.cpu" => (Some(Value::Float(0.42)), true),
                BindMethod::Get => (None, false),
                BindMethod::Set | BindMethod::Delete => (None, true),
            }
        }
    }

    let server = MockWsServer::start("E1", Arc::new(CpuHandler)).await.unwrap();
    let url = format!("ws://{}", server.local_addr());
    let mut client = MockWsClient::connect(&url).await.unwrap();

    let sessions = BindSessions::new();
    let (session_id, waiter) = sessions.begin("metrics.cpu").await;
    assert_eq!(sessions.len().await, 1);

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

    let reply = timeout(Duration::from_secs(1), client.recv_message()).await.unwrap().unwrap();
    let edgekv_proto::Command::RetBind { session_id: got_sid, value, found, .. } = reply.payload else {
        panic!("expected RetBind");
    };
    assert_eq!(got_sid, session_id);
    sessions.resolve(&got_sid, value, found).await;

    let (value, found) = waiter.await.unwrap();
    assert_eq!(value, Some(Value::Float(0.42)));
    assert!(found);
    assert!(sessions.is_empty().await, "session must be reclaimed, no leak");
}
