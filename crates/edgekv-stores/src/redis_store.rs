//! Redis-backed `Store`/`CenterStore`: one Redis string key per root
//! document (JSON-encoded), using a multiplexed async connection so
//! `Store` methods never contend on a connection handle the way the
//! SQLite backend's `Mutex<Connection>` does.
//!
//! This is the one backend SPEC_FULL names as hosting the Center's
//! per-edge namespacing: Redis keys are already flat strings, so the
//! `edge_id:` prefix [`NamespacedStore`] applies elsewhere is just the
//! natural Redis key layout here too.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;
use url::Url;

use edgekv::error::{EdgeKvError, Result};
use edgekv::store::{resolve_get, resolve_set, CenterStore, NamespacedStore, Store, StoreRegistry};
use edgekv_proto::Value;

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect_uri(uri: &str) -> Result<Arc<Self>> {
        let client = redis::Client::open(uri).map_err(EdgeKvError::from)?;
        let conn = ConnectionManager::new(client).await.map_err(EdgeKvError::from)?;
        debug!("connected to redis store");
        Ok(Arc::new(RedisStore { conn }))
    }

    /// Register the `redis` scheme with a [`StoreRegistry`]. The
    /// constructor blocks on connecting since `StoreRegistry::open` is
    /// synchronous; callers must invoke it from within a Tokio runtime.
    pub fn register(registry: &mut StoreRegistry) {
        registry.register(
            "redis",
            Arc::new(|url: &Url| {
                let uri = url.as_str().to_string();
                tokio::task::block_in_place(|| {
                    tokio::runtime::Handle::current().block_on(RedisStore::connect_uri(&uri))
                })
                .map(|s| s as Arc<dyn Store>)
            }),
        );
    }

    async fn read_doc(&self, root: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(root).await.map_err(EdgeKvError::from)?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s).map_err(EdgeKvError::from)?)),
            None => Ok(None),
        }
    }

    async fn write_doc(&self, root: &str, doc: &Value) -> Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(doc).map_err(EdgeKvError::from)?;
        let _: () = conn.set(root, raw).await.map_err(EdgeKvError::from)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<(Value, bool)> {
        let (root, rest) = edgekv::keypath::split_first(key)?;
        let doc = self.read_doc(root).await?;
        Ok(resolve_get(doc.as_ref(), rest))
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        let (root, rest) = edgekv::keypath::split_first(key)?;
        let existing = self.read_doc(root).await?;
        let (new_doc, old) = resolve_set(existing, rest, value);
        self.write_doc(root, &new_doc).await?;
        Ok(old)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("*").await.map_err(EdgeKvError::from)?;
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl CenterStore for RedisStore {
    fn open_edge(self: Arc<Self>, edge_id: &str) -> Arc<dyn Store> {
        Arc::new(NamespacedStore::new(self, edge_id))
    }

    fn edge_key(&self, edge_id: &str, key: &str) -> String {
        NamespacedStore::<Self>::namespaced_key(edge_id, key)
    }
}
