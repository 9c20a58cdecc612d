//! SQLite-backed `Store`: one row per root key, document serialized as
//! JSON via `Value`'s own `serde` impl, connection opened in WAL mode.

use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use edgekv::error::{EdgeKvError, Result};
use edgekv::store::{resolve_get, resolve_set, Store, StoreRegistry};
use edgekv_proto::Value;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Arc<Self>> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (root_key TEXT PRIMARY KEY, doc TEXT NOT NULL)",
            [],
        )?;
        debug!(%path, "opened sqlite store");
        Ok(Arc::new(SqliteStore { conn: Mutex::new(conn) }))
    }

    /// Construct from a `sqlite:///absolute/path/to/file.db` URI, or
    /// `sqlite://:memory:` for an in-process database.
    pub fn connect(url: &Url) -> Result<Arc<dyn Store>> {
        let path = if url.host_str() == Some(":memory:") || url.path() == ":memory:" {
            ":memory:".to_string()
        } else {
            url.path().to_string()
        };
        Ok(SqliteStore::open(&path)? as Arc<dyn Store>)
    }

    /// Register the `sqlite` scheme with a [`StoreRegistry`].
    pub fn register(registry: &mut StoreRegistry) {
        registry.register("sqlite", Arc::new(SqliteStore::connect));
    }

    fn read_doc(conn: &Connection, root: &str) -> Result<Option<Value>> {
        let mut stmt = conn.prepare("SELECT doc FROM documents WHERE root_key = ?1")?;
        let mut rows = stmt.query([root])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                let value: Value = serde_json::from_str(&raw).map_err(EdgeKvError::from)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn write_doc(conn: &Connection, root: &str, doc: &Value) -> Result<()> {
        let raw = serde_json::to_string(doc).map_err(EdgeKvError::from)?;
        conn.execute(
            "INSERT INTO documents (root_key, doc) VALUES (?1, ?2)
             ON CONFLICT(root_key) DO UPDATE SET doc = excluded.doc",
            rusqlite::params![root, raw],
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<(Value, bool)> {
        let (root, rest) = edgekv::keypath::split_first(key)?;
        let conn = self.conn.lock().await;
        let doc = Self::read_doc(&conn, root)?;
        Ok(resolve_get(doc.as_ref(), rest))
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        let (root, rest) = edgekv::keypath::split_first(key)?;
        let conn = self.conn.lock().await;
        let existing = Self::read_doc(&conn, root)?;
        let (new_doc, old) = resolve_set(existing, rest, value);
        Self::write_doc(&conn, root, &new_doc)?;
        Ok(old)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT root_key FROM documents")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_sub_path_round_trips() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.set("test.id", Value::Int(1234)).await.unwrap();
        let (v, present) = store.get("test.id").await.unwrap();
        assert!(present);
        assert_eq!(v, Value::Int(1234));
    }

    #[tokio::test]
    async fn whole_root_replace_overwrites_prior_fields() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.set("test.id", Value::Int(1)).await.unwrap();
        store.set("test.on", Value::Bool(true)).await.unwrap();
        store.set("test", Value::Int(99)).await.unwrap();
        let (v, present) = store.get("test").await.unwrap();
        assert!(present);
        assert_eq!(v, Value::Int(99));
    }

    #[tokio::test]
    async fn keys_lists_every_root() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.set("a", Value::Int(1)).await.unwrap();
        store.set("b", Value::Int(2)).await.unwrap();
        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
