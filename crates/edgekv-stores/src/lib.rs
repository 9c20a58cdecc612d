//! Concrete `Store`/`CenterStore` backends (§4.3): `mem` (process-local,
//! sharded `HashMap`), `sqlite` (single-file, WAL-mode), and `redis`
//! (multiplexed async connection, the one backend that natively hosts the
//! Center's per-edge namespacing).

mod center;
mod memory;
mod redis_store;
mod sqlite;

pub use center::GenericCenterStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use edgekv::error::{EdgeKvError, Result};
use edgekv::store::{CenterStore, StoreRegistry};

/// Build a [`StoreRegistry`] with every backend in this crate registered
/// under its scheme (`mem`, `sqlite`, `redis`).
pub fn default_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::new();
    MemoryStore::register(&mut registry);
    SqliteStore::register(&mut registry);
    RedisStore::register(&mut registry);
    registry
}

/// Open `uri` as a `CenterStore`: `redis` hosts the per-edge namespacing
/// natively, `mem`/`sqlite` get it for free via [`GenericCenterStore`].
pub fn open_center_store(uri: &str) -> Result<Arc<dyn CenterStore>> {
    let url = url::Url::parse(uri).map_err(|e| EdgeKvError::Config(format!("invalid store URI '{uri}': {e}")))?;
    match url.scheme() {
        "redis" => {
            let uri = uri.to_string();
            let store = tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(RedisStore::connect_uri(&uri))
            })?;
            Ok(store as Arc<dyn CenterStore>)
        }
        _ => {
            let store = default_registry().open(uri)?;
            Ok(GenericCenterStore::new(store) as Arc<dyn CenterStore>)
        }
    }
}
