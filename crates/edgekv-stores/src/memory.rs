//! In-process `Store`, sharded by root key so concurrent writers to
//! distinct roots never contend, and a single root's read-modify-write
//! stays atomic (§4.3's "most subtle invariant").

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::Mutex;
use url::Url;

use edgekv::error::Result;
use edgekv::store::{resolve_get, resolve_set, Store, StoreRegistry};
use edgekv_proto::Value;

const SHARD_COUNT: usize = 16;

pub struct MemoryStore {
    shards: Vec<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryStore {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        })
    }

    fn shard_for(&self, root: &str) -> &Mutex<HashMap<String, Value>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        root.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Construct from a `mem://` URI (the authority/path are ignored — one
    /// process-local store per constructed instance).
    pub fn connect(_url: &Url) -> Result<Arc<dyn Store>> {
        Ok(MemoryStore::new() as Arc<dyn Store>)
    }

    /// Register the `mem` scheme with a [`StoreRegistry`].
    pub fn register(registry: &mut StoreRegistry) {
        registry.register("mem", Arc::new(MemoryStore::connect));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<(Value, bool)> {
        let (root, rest) = edgekv::keypath::split_first(key)?;
        let shard = self.shard_for(root).lock().await;
        Ok(resolve_get(shard.get(root), rest))
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        let (root, rest) = edgekv::keypath::split_first(key)?;
        let mut shard = self.shard_for(root).lock().await;
        let existing = shard.get(root).cloned();
        let (new_doc, old) = resolve_set(existing, rest, value);
        shard.insert(root.to_string(), new_doc);
        Ok(old)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for shard in &self.shards {
            out.extend(shard.lock().await.keys().cloned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_subpaths_under_same_root_both_land() {
        let store = MemoryStore::new();
        let s1 = Arc::clone(&store);
        let s2 = Arc::clone(&store);
        let (r1, r2) = tokio::join!(
            s1.set("u.a", Value::Int(1)),
            s2.set("u.b", Value::Int(2)),
        );
        r1.unwrap();
        r2.unwrap();
        let (doc, present) = store.get("u").await.unwrap();
        assert!(present);
        assert_eq!(doc.get_path(&["a"]), Some(&Value::Int(1)));
        assert_eq!(doc.get_path(&["b"]), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn missing_root_reports_absent() {
        let store = MemoryStore::new();
        let (v, present) = store.get("nope").await.unwrap();
        assert!(!present);
        assert_eq!(v, Value::Null);
    }
}
