//! A ready-wired `EdgeNode`/`CenterNode` pair over a [`LocalBus`] and
//! in-memory stores, for scenario and integration tests that exercise the
//! full write/sync loop without a real broker or database.

use std::sync::Arc;

use edgekv::bus::Bus;
use edgekv::dispatcher::{Dispatcher, WatchEvent};
use edgekv::error::Result;
use edgekv::store::{CenterStore, NamespacedStore, Store};
use edgekv::{CenterNode, EdgeNode};
use edgekv_proto::Value;
use edgekv_stores::MemoryStore;

use crate::local_bus::LocalBus;

/// Wraps `edgekv_stores::MemoryStore` to additionally implement
/// `CenterStore`, the way the Redis backend does for real deployments.
pub struct MemoryCenterStore {
    inner: Arc<MemoryStore>,
}

impl MemoryCenterStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryCenterStore { inner: MemoryStore::new() })
    }
}

#[async_trait::async_trait]
impl Store for MemoryCenterStore {
    async fn get(&self, key: &str) -> Result<(Value, bool)> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        self.inner.set(key, value).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

#[async_trait::async_trait]
impl CenterStore for MemoryCenterStore {
    fn open_edge(self: Arc<Self>, edge_id: &str) -> Arc<dyn Store> {
        Arc::new(NamespacedStore::new(self, edge_id))
    }

    fn edge_key(&self, edge_id: &str, key: &str) -> String {
        NamespacedStore::<Self>::namespaced_key(edge_id, key)
    }
}

/// One edge, wired to one center, over a shared in-process bus.
pub struct Harness {
    pub bus: Arc<LocalBus>,
    pub edge: Arc<EdgeNode>,
    pub center: Arc<CenterNode>,
}

impl Harness {
    pub async fn new(edge_id: impl Into<String>) -> Self {
        let bus = LocalBus::new();

        let edge = Arc::new(
            EdgeNode::new(edge_id, MemoryStore::new(), Arc::clone(&bus) as Arc<dyn Bus>)
                .expect("non-empty edge id"),
        );
        edge.run().await.expect("edge run");

        let center = Arc::new(CenterNode::new(
            MemoryCenterStore::new(),
            Arc::clone(&bus) as Arc<dyn Bus>,
        ));
        center.run().await.expect("center run");

        Harness { bus, edge, center }
    }
}

/// Subscribe `pattern` on `dispatcher` and return a receiver that yields
/// every matching [`WatchEvent`] — convenient for `recv().await` in tests
/// instead of hand-rolling an `Arc<Mutex<Option<_>>>` per assertion.
pub async fn watch_channel(
    dispatcher: &Arc<Dispatcher>,
    pattern: impl Into<String>,
) -> tokio::sync::mpsc::UnboundedReceiver<WatchEvent> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    dispatcher
        .watch(pattern, move |event| {
            let _ = tx.send(event);
        })
        .await;
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn edge_write_reaches_center_under_namespace() {
        let h = Harness::new("E1").await;
        let mut events = watch_channel(h.center.dispatcher(), "E1:test.*").await;

        h.edge.set("test.id", Value::Int(1234)).await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert_eq!(event.key, "E1:test.id");
        assert_eq!(event.new, Value::Int(1234));
    }

    #[tokio::test]
    async fn center_write_reaches_edge_back() {
        let h = Harness::new("E1").await;
        let mut events = watch_channel(h.edge.dispatcher(), "test.*").await;

        let view = h.center.open_edge("E1");
        view.set("test.id", Value::Int(77)).await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert_eq!(event.key, "test.id");
        assert_eq!(event.new, Value::Int(77));
    }
}
