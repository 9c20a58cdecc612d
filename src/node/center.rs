//! `CenterNode` (§4.8): owns a namespaced Store + Bus + Dispatcher, ingests
//! every edge's change-logs into its per-edge copy, and exposes a
//! per-edge [`EdgeView`] plus cross-edge watch.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::differ::{diff, patch};
use crate::dispatcher::{Dispatcher, SubId, WatchEvent};
use crate::error::Result;
use crate::keypath;
use crate::store::CenterStore;
use edgekv_proto::{Command, Message, Value};

/// The center node: aggregates per-edge state and rebroadcasts changes.
pub struct CenterNode {
    store: Arc<dyn CenterStore>,
    bus: Arc<dyn Bus>,
    dispatcher: Arc<Dispatcher>,
    /// Patterns declared via `"binder"` messages (§4.9 step 1), keyed by
    /// the declaring edge. Populated passively from the Bus; routing a
    /// Bind request to an edge still requires a configured stream address
    /// (`services/center`'s `bind_client`), this table only answers "who
    /// can resolve this key".
    binders: RwLock<HashMap<String, Vec<String>>>,
}

impl CenterNode {
    pub fn new(store: Arc<dyn CenterStore>, bus: Arc<dyn Bus>) -> Self {
        CenterNode {
            store,
            bus,
            dispatcher: Dispatcher::new(),
            binders: RwLock::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn CenterStore> {
        &self.store
    }

    /// Start the dispatcher and subscribe, broker-wildcarded, to every
    /// edge's `sync` publications (publishers scope by `from`, not by
    /// topic, so one subscription covers all edges) and to `binder`
    /// declarations.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.dispatcher.start().await;

        let this = Arc::clone(self);
        this.bus
            .subscribe("sync", Arc::new(move |msg: Message| {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    if let Err(e) = this.apply_inbound(msg).await {
                        warn!(error = %e, "failed to apply inbound changelog");
                    }
                });
                Ok(())
            }))
            .await?;

        let this = Arc::clone(self);
        this.bus
            .subscribe("binder", Arc::new(move |msg: Message| {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    this.record_binder(msg).await;
                });
                Ok(())
            }))
            .await
    }

    async fn record_binder(&self, msg: Message) {
        let Command::DeclareBinder { pattern } = msg.payload else {
            debug!(kind = %msg.payload.kind(), "ignoring non-declare_binder message on binder topic");
            return;
        };
        let mut binders = self.binders.write().await;
        let patterns = binders.entry(msg.from).or_default();
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }

    /// The edge (if any) that has declared a binder pattern matching
    /// `key`, used to route a Bind request to the right stream.
    pub async fn binder_for(&self, key: &str) -> Option<String> {
        let binders = self.binders.read().await;
        binders
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| keypath::matches(p, key)))
            .map(|(edge_id, _)| edge_id.clone())
    }

    /// Every declared binder pattern, by edge. Mostly for introspection
    /// and tests.
    pub async fn declared_binders(&self) -> HashMap<String, Vec<String>> {
        self.binders.read().await.clone()
    }

    async fn apply_inbound(&self, msg: Message) -> Result<()> {
        let Command::Changelog { key, changes } = msg.payload else {
            debug!(kind = %msg.payload.kind(), "ignoring non-changelog message on sync topic");
            return Ok(());
        };
        let fullkey = self.store.edge_key(&msg.from, &key);
        let (current, present) = self.store.get(&fullkey).await?;
        let new_value = if present {
            patch(&current, &changes)
        } else {
            changes.last().and_then(|c| c.latest_effect().cloned()).unwrap_or(Value::Null)
        };
        self.store.set(&fullkey, new_value.clone()).await?;
        self.dispatcher
            .dispatch(WatchEvent {
                key: fullkey,
                from: msg.from,
                old: current,
                new: new_value,
            })
            .await;
        Ok(())
    }

    /// A per-edge view over the center's namespaced store.
    pub fn open_edge(self: &Arc<Self>, edge_id: impl Into<String>) -> EdgeView {
        EdgeView {
            edge_id: edge_id.into(),
            center: Arc::clone(self),
        }
    }

    /// Cross-edge watch: subscribes under `"*:" + pattern`, matching any
    /// edge namespace.
    pub async fn watch_edges<F>(&self, pattern: impl AsRef<str>, callback: F) -> SubId
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        let full_pattern = format!("*:{}", pattern.as_ref());
        self.dispatcher.watch(full_pattern, callback).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.dispatcher.close().await;
        self.bus.close().await
    }
}

/// A view over one edge's namespace within the center's store, per §4.8.
pub struct EdgeView {
    edge_id: String,
    center: Arc<CenterNode>,
}

impl EdgeView {
    fn fullkey(&self, key: &str) -> String {
        self.center.store.edge_key(&self.edge_id, key)
    }

    pub async fn get(&self, key: &str) -> Result<(Value, bool)> {
        self.center.store.get(&self.fullkey(key)).await
    }

    /// Write `key`, then diff old->new and publish on the edge's namespaced
    /// sync topic so the originating edge receives the change back.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let fullkey = self.fullkey(key);
        let old = self.center.store.set(&fullkey, value.clone()).await?;
        let changes = diff(&old, &value);
        if changes.is_empty() {
            return Ok(());
        }
        let msg = Message::changelog("center", key, changes);
        let topic = crate::node::edgekey(&self.edge_id, "sync");
        self.center.bus.publish(&topic, &msg).await
    }

    pub async fn watch<F>(&self, pattern: impl Into<String>, callback: F) -> SubId
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        let full_pattern = self.fullkey(&pattern.into());
        self.center.dispatcher.watch(full_pattern, callback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MemCenterStore(Mutex<HashMap<String, Value>>);

    #[async_trait::async_trait]
    impl Store for MemCenterStore {
        async fn get(&self, key: &str) -> Result<(Value, bool)> {
            let (root, rest) = crate::keypath::split_first(key)?;
            let doc = self.0.lock().await.get(root).cloned();
            Ok(crate::store::resolve_get(doc.as_ref(), rest))
        }
        async fn set(&self, key: &str, value: Value) -> Result<Value> {
            let (root, rest) = crate::keypath::split_first(key)?;
            let mut map = self.0.lock().await;
            let existing = map.get(root).cloned();
            let (new_doc, old) = crate::store::resolve_set(existing, rest, value);
            map.insert(root.to_string(), new_doc);
            Ok(old)
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Ok(self.0.lock().await.keys().cloned().collect())
        }
    }

    #[async_trait::async_trait]
    impl CenterStore for MemCenterStore {
        fn open_edge(self: Arc<Self>, edge_id: &str) -> Arc<dyn Store> {
            Arc::new(crate::store::NamespacedStore::new(self, edge_id))
        }
        fn edge_key(&self, edge_id: &str, key: &str) -> String {
            crate::store::NamespacedStore::<Self>::namespaced_key(edge_id, key)
        }
    }

    struct NoopBus;
    #[async_trait::async_trait]
    impl Bus for NoopBus {
        async fn publish(&self, _topic: &str, _msg: &Message) -> Result<()> {
            Ok(())
        }
        async fn subscribe(&self, _pattern: &str, _handler: crate::bus::Handler) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn scenario_s1_edge_write_applies_under_namespace() {
        let store: Arc<dyn CenterStore> = Arc::new(MemCenterStore(Mutex::new(HashMap::new())));
        let node = Arc::new(CenterNode::new(store, Arc::new(NoopBus)));
        node.run().await.unwrap();

        // Seed prior state for E1:test.
        node.store
            .set("E1:test", {
                let mut m = std::collections::BTreeMap::new();
                m.insert("id".to_string(), Value::Int(1234));
                m.insert("on".to_string(), Value::Bool(true));
                Value::Object(m)
            })
            .await
            .unwrap();

        // The changelog's path is relative to the value resolved at the
        // full key ("E1:test.id", i.e. the leaf itself), not to the
        // document stored under "E1:test" — an empty path here, exactly
        // what `diff` emits for a leaf-to-leaf update.
        let msg = Message::changelog(
            "E1",
            "test.id",
            vec![edgekv_proto::Change::update(Vec::new(), Value::Int(1234), Value::Int(1235))],
        );
        node.apply_inbound(msg).await.unwrap();

        let (doc, present) = node.store.get("E1:test").await.unwrap();
        assert!(present);
        assert_eq!(doc.get_path(&["id"]), Some(&Value::Int(1235)));
        assert_eq!(doc.get_path(&["on"]), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn declare_binder_is_tracked_and_routes_by_pattern() {
        let store: Arc<dyn CenterStore> = Arc::new(MemCenterStore(Mutex::new(HashMap::new())));
        let node = Arc::new(CenterNode::new(store, Arc::new(NoopBus)));
        node.run().await.unwrap();

        node.record_binder(Message::new(
            "E1",
            Command::DeclareBinder { pattern: "metrics.*".into() },
        ))
        .await;

        assert_eq!(node.binder_for("metrics.cpu").await.as_deref(), Some("E1"));
        assert_eq!(node.binder_for("other.key").await, None);
        assert_eq!(node.declared_binders().await.get("E1").unwrap(), &vec!["metrics.*".to_string()]);
    }
}
