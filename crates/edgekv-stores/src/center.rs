//! Generic `CenterStore` wrapper for backends that don't host per-edge
//! namespacing natively (`mem`, `sqlite`): every edge's documents just
//! live under `edge_id:`-prefixed root keys of the wrapped `Store`, the
//! same [`NamespacedStore`] rule `RedisStore` already applies directly.

use std::sync::Arc;

use edgekv::error::Result;
use edgekv::store::{CenterStore, NamespacedStore, Store};
use edgekv_proto::Value;

pub struct GenericCenterStore {
    inner: Arc<dyn Store>,
}

impl GenericCenterStore {
    pub fn new(inner: Arc<dyn Store>) -> Arc<Self> {
        Arc::new(GenericCenterStore { inner })
    }
}

#[async_trait::async_trait]
impl Store for GenericCenterStore {
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
impl CenterStore for GenericCenterStore {
    fn open_edge(self: Arc<Self>, edge_id: &str) -> Arc<dyn Store> {
        Arc::new(NamespacedStore::new(self, edge_id))
    }

    fn edge_key(&self, edge_id: &str, key: &str) -> String {
        NamespacedStore::<Self>::namespaced_key(edge_id, key)
    }
}
