//! An in-process loopback `Bus`: `publish` calls every handler registered
//! on the exact topic synchronously, no network round-trip. EdgeKV's Bus
//! topics are always exact strings (an edge subscribes to its own
//! namespaced topic, never a pattern), so no glob matching is needed here.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use edgekv::bus::{Bus, Handler};
use edgekv::error::Result;
use edgekv_proto::Message;

pub struct LocalBus {
    subs: RwLock<HashMap<String, Vec<Handler>>>,
}

impl LocalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(LocalBus {
            subs: RwLock::new(HashMap::new()),
        })
    }
}

#[async_trait::async_trait]
impl Bus for LocalBus {
    async fn publish(&self, topic: &str, msg: &Message) -> Result<()> {
        let subs = self.subs.read().await;
        if let Some(handlers) = subs.get(topic) {
            for handler in handlers {
                handler(msg.clone())?;
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic_pattern: &str, handler: Handler) -> Result<()> {
        self.subs
            .write()
            .await
            .entry(topic_pattern.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.subs.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn publish_reaches_every_subscriber_on_the_exact_topic() {
        let bus = LocalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe("E1:sync", Arc::new(move |_msg| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .await
        .unwrap();

        bus.publish("E1:sync", &Message::new("E1", edgekv_proto::Command::DeclareBinder { pattern: "*".into() }))
            .await
            .unwrap();
        bus.publish("E2:sync", &Message::new("E2", edgekv_proto::Command::DeclareBinder { pattern: "*".into() }))
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
