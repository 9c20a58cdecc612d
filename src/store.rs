//! The `Store` contract: a flat mapping from root key to [`Value`]
//! document, read-modify-written at sub-key granularity.
//!
//! Concrete backends (`MemoryStore`, `SqliteStore`, `RedisStore`) live in
//! the sibling `edgekv-stores` crate, which depends on this crate for the
//! trait and the `Value`/error types. Keeping the trait here (rather than
//! in `edgekv-stores`) lets `EdgeNode`/`CenterNode` — and the store
//! registry below — stay backend-agnostic.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::error::{EdgeKvError, Result};
use crate::keypath;
use edgekv_proto::Value;

/// Read-modify-write key/value document store.
///
/// `set` must be atomic with respect to concurrent `set`/`get` on the same
/// root: concurrent writers to distinct sub-paths of the same root must
/// never lose each other's update (§4.3's "most subtle invariant").
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Resolve `key`. If `key` has no sub-path, returns the full document
    /// for that root; otherwise resolves the sub-path within it. Absence is
    /// reported via `present = false`, not an error.
    async fn get(&self, key: &str) -> Result<(Value, bool)>;

    /// Read-modify-write `key` to `value`, returning the prior value at
    /// that exact address (full document if `key` has no sub-path, the
    /// prior leaf otherwise).
    async fn set(&self, key: &str, value: Value) -> Result<Value>;

    /// Root keys currently held by the store.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Implemented only by backends that can host the Center's per-edge
/// namespacing (today: the remote/Redis backend, per §4.3). `open_edge`
/// returns a view where every key is transparently prefixed by
/// `edge_id:`, and `edge_key` exposes the same prefixing rule for callers
/// (the Bus-message-apply path in `CenterNode`) who need the namespaced
/// key without going through the view.
#[async_trait::async_trait]
pub trait CenterStore: Store {
    fn open_edge(self: Arc<Self>, edge_id: &str) -> Arc<dyn Store>;
    fn edge_key(&self, edge_id: &str, key: &str) -> String;
}

/// A `Store` view over another store where every key is namespaced under a
/// fixed `edge_id:` prefix. Shared by every `CenterStore` backend so the
/// per-edge-key construction rule lives in exactly one place (§6's
/// "Persisted state layout").
pub struct NamespacedStore<S> {
    inner: Arc<S>,
    edge_id: String,
}

impl<S> NamespacedStore<S> {
    pub fn new(inner: Arc<S>, edge_id: impl Into<String>) -> Self {
        NamespacedStore {
            inner,
            edge_id: edge_id.into(),
        }
    }

    pub fn namespaced_key(edge_id: &str, key: &str) -> String {
        format!("{edge_id}:{key}")
    }
}

#[async_trait::async_trait]
impl<S: Store> Store for NamespacedStore<S> {
    async fn get(&self, key: &str) -> Result<(Value, bool)> {
        self.inner.get(&Self::namespaced_key(&self.edge_id, key)).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        self.inner.set(&Self::namespaced_key(&self.edge_id, key), value).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let prefix = format!("{}:", self.edge_id);
        let all = self.inner.keys().await?;
        Ok(all
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}

/// Helper shared by every `Store` backend: resolve `key` against a
/// root-document map. Implementors store one `Value::Object` (or any
/// scalar, for whole-root-replace roots) per root key and delegate here.
pub fn resolve_get(root_doc: Option<&Value>, sub_path: &str) -> (Value, bool) {
    match root_doc {
        None => (Value::Null, false),
        Some(doc) => {
            if sub_path.is_empty() {
                (doc.clone(), true)
            } else {
                let segs = keypath::segments(sub_path);
                match doc.get_path(&segs) {
                    Some(v) => (v.clone(), true),
                    None => (Value::Null, false),
                }
            }
        }
    }
}

/// Helper shared by every `Store` backend: apply a read-modify-write to a
/// root document, returning `(new_document, old_value)`.
pub fn resolve_set(root_doc: Option<Value>, sub_path: &str, new_value: Value) -> (Value, Value) {
    if sub_path.is_empty() {
        let old = root_doc.unwrap_or(Value::Null);
        (new_value, old)
    } else {
        let mut doc = root_doc.unwrap_or_else(Value::object);
        let segs = keypath::segments(sub_path);
        let old = doc.set_path(&segs, new_value).unwrap_or(Value::Null);
        (doc, old)
    }
}

/// Constructs a `Store` from a parsed URI. Implemented once per backend in
/// `edgekv-stores`.
pub type StoreConstructor = Arc<dyn Fn(&Url) -> Result<Arc<dyn Store>> + Send + Sync>;

/// A scheme-keyed table of `Store` constructors, built once at process
/// start (or in `edgekv-test-utils` for tests) and passed explicitly into
/// node constructors — never a global, per §9's "pluggable stores and
/// buses" design note.
#[derive(Default, Clone)]
pub struct StoreRegistry {
    constructors: HashMap<String, StoreConstructor>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        StoreRegistry::default()
    }

    pub fn register(&mut self, scheme: impl Into<String>, ctor: StoreConstructor) {
        self.constructors.insert(scheme.into(), ctor);
    }

    /// Parse `uri` and invoke the constructor registered for its scheme.
    pub fn open(&self, uri: &str) -> Result<Arc<dyn Store>> {
        let url = Url::parse(uri).map_err(|e| EdgeKvError::Config(format!("invalid store URI '{uri}': {e}")))?;
        let scheme = url.scheme();
        match self.constructors.get(scheme) {
            Some(ctor) => ctor(&url),
            None => Err(EdgeKvError::Config(format!("no store registered for scheme '{scheme}'"))),
        }
    }
}
