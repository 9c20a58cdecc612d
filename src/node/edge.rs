//! `EdgeNode` (§4.7): owns a Store + Bus + Dispatcher, serves local IPC
//! (wired up by the `services/edge` binary), publishes its own mutations,
//! and applies inbound change-logs from the center.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::Bus;
use crate::differ::{diff, patch};
use crate::dispatcher::{Dispatcher, WatchEvent};
use crate::error::{EdgeKvError, Result};
use crate::node::edgekey;
use crate::store::Store;
use edgekv_proto::{Command, Message, Value};

/// An edge node: the local half of the two-tier deployment.
pub struct EdgeNode {
    id: String,
    store: Arc<dyn Store>,
    bus: Arc<dyn Bus>,
    dispatcher: Arc<Dispatcher>,
}

impl EdgeNode {
    /// Construct a new edge node. Fails with [`EdgeKvError::Config`] if
    /// `id` is empty, per §4.7's start-up preconditions.
    pub fn new(id: impl Into<String>, store: Arc<dyn Store>, bus: Arc<dyn Bus>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(EdgeKvError::Config("edge id must not be empty".into()));
        }
        Ok(EdgeNode {
            id,
            store,
            bus,
            dispatcher: Dispatcher::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start the dispatcher and subscribe to inbound change-logs from the
    /// center on this edge's namespaced sync topic. Idempotent to call
    /// once at process start; does not block (the bus subscription runs
    /// its own background task).
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.dispatcher.start().await;

        let this = Arc::clone(self);
        let topic = edgekey(&this.id, "sync");
        this.bus
            .subscribe(&topic, Arc::new(move |msg: Message| {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    if let Err(e) = this.apply_inbound(msg).await {
                        warn!(error = %e, "failed to apply inbound changelog");
                    }
                });
                Ok(())
            }))
            .await
    }

    /// §4.7 run loop step 2: apply one inbound changelog message.
    async fn apply_inbound(&self, msg: Message) -> Result<()> {
        let Command::Changelog { key, changes } = msg.payload else {
            debug!(kind = %msg.payload.kind(), "ignoring non-changelog message on sync topic");
            return Ok(());
        };
        let (current, present) = self.store.get(&key).await?;
        let new_value = if present {
            patch(&current, &changes)
        } else {
            changes.last().and_then(|c| c.latest_effect().cloned()).unwrap_or(Value::Null)
        };
        self.store.set(&key, new_value.clone()).await?;
        self.dispatcher
            .dispatch(WatchEvent {
                key,
                from: msg.from,
                old: current,
                new: new_value,
            })
            .await;
        Ok(())
    }

    /// Write path (§4.7): read-modify-write, diff, and — if the diff is
    /// non-empty — publish the changelog on the shared `sync` topic so the
    /// center can apply it.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let old = self.store.set(key, value.clone()).await?;
        let changes = diff(&old, &value);
        if changes.is_empty() {
            return Ok(());
        }
        let msg = Message::changelog(self.id.clone(), key, changes);
        self.bus.publish("sync", &msg).await
    }

    pub async fn get(&self, key: &str) -> Result<(Value, bool)> {
        self.store.get(key).await
    }

    /// §4.9 Bind protocol step 1: announce that this edge can resolve
    /// read-through requests for any key matching `pattern`. The center
    /// learns of this via its own `"binder"` subscription (§4.8); the
    /// actual stream the center reads from is a separate Bind connection
    /// (`services/edge`'s `/bind_observer/{key}` WebSocket route), not this Bus message.
    pub async fn declare_binder(&self, pattern: impl Into<String>) -> Result<()> {
        let msg = Message::new(self.id.clone(), Command::DeclareBinder { pattern: pattern.into() });
        self.bus.publish("binder", &msg).await
    }

    /// Register a local watcher. `pattern` is matched against the full key
    /// as passed to `set`/applied from inbound change-logs — no edge
    /// namespace is added locally, since an edge only ever observes its
    /// own keys (§3 invariant: "the edge only ever sees its own
    /// namespace").
    pub async fn watch<F>(&self, pattern: impl Into<String>, callback: F) -> crate::dispatcher::SubId
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        self.dispatcher.watch(pattern, callback).await
    }

    /// Cooperative shutdown: Dispatcher first (drains inflight events),
    /// then Bus. The IPC listener is owned by the `services/edge` binary
    /// and closed there before this is called.
    pub async fn shutdown(&self) -> Result<()> {
        self.dispatcher.close().await;
        self.bus.close().await
    }
}
