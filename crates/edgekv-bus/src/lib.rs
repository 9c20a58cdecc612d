//! `MqttBus`: the MQTT-backed [`edgekv::Bus`] implementation (§4.5), built on
//! `rumqttc`.
//!
//! Grounded in the same "background task owns the connection, callers get a
//! handle" shape the teacher's uplink session holds over its WebSocket
//! connection, adapted from a request/response handshake to a standing
//! `EventLoop::poll()` loop with its own reconnect/backoff (`rumqttc`
//! reconnects automatically on a dropped connection; this module just keeps
//! polling through the reconnect rather than treating it as fatal).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use edgekv::bus::{Bus, BusRegistry, BusUrlOptions, Handler};
use edgekv::error::{EdgeKvError, Result};
use edgekv_proto::Message;

const DEFAULT_MQTT_PORT: u16 = 1883;

struct Subscription {
    pattern: String,
    handler: Handler,
}

/// A `Bus` backed by a single `rumqttc::AsyncClient`/`EventLoop` pair. One
/// background task drives the event loop for the lifetime of the bus;
/// `publish`/`subscribe` only ever touch the lightweight client handle.
pub struct MqttBus {
    options: BusUrlOptions,
    client: AsyncClient,
    subs: Arc<RwLock<Vec<Subscription>>>,
    closed: Arc<AtomicBool>,
}

impl MqttBus {
    /// Connect per the `mqtt://[user:pass@]host[:port]/prefix?...` contract
    /// (§4.5) and spawn the event-loop-polling task. Must be called from
    /// within a Tokio runtime.
    pub fn connect(url: &Url) -> Result<Arc<Self>> {
        let options = BusUrlOptions::parse(url, DEFAULT_MQTT_PORT)?;

        let mut mqtt_options = MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
        mqtt_options.set_keep_alive(options.timeout);
        mqtt_options.set_clean_session(options.clean_session);
        if let (Some(user), Some(pass)) = (&options.username, &options.password) {
            mqtt_options.set_credentials(user, pass);
        }

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, 64);
        let subs: Arc<RwLock<Vec<Subscription>>> = Arc::new(RwLock::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let task_subs = Arc::clone(&subs);
        let task_closed = Arc::clone(&closed);
        let auto_reconnect = options.auto_reconnect;
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let topic = publish.topic.clone();
                        let subs = task_subs.read().await;
                        for sub in subs.iter() {
                            if !mqtt_topic_matches(&sub.pattern, &topic) {
                                continue;
                            }
                            match Message::from_json(&String::from_utf8_lossy(&publish.payload)) {
                                Ok(msg) => {
                                    if let Err(e) = (sub.handler)(msg) {
                                        warn!(error = %e, topic = %topic, "bus handler failed");
                                    }
                                }
                                Err(e) => warn!(error = %e, topic = %topic, "dropping undecodable message"),
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if task_closed.load(Ordering::SeqCst) {
                            debug!("mqtt event loop stopped after close");
                            return;
                        }
                        warn!(error = %e, "mqtt connection error");
                        if !auto_reconnect {
                            return;
                        }
                        // rumqttc::EventLoop::poll reconnects on the next
                        // call; a brief backoff avoids a hot retry loop
                        // against a broker that's still down.
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
        });

        info!(host = %options.host, port = options.port, "connected to mqtt broker");
        Ok(Arc::new(MqttBus {
            options,
            client,
            subs,
            closed,
        }))
    }

    /// Register the `mqtt` scheme with a [`BusRegistry`].
    pub fn register(registry: &mut BusRegistry) {
        registry.register("mqtt", Arc::new(|url| Ok(MqttBus::connect(url)? as Arc<dyn Bus>)));
    }
}

#[async_trait::async_trait]
impl Bus for MqttBus {
    async fn publish(&self, topic: &str, msg: &Message) -> Result<()> {
        let payload = msg.to_json()?;
        self.client
            .publish(self.options.topic(topic), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(EdgeKvError::from)
    }

    async fn subscribe(&self, topic_pattern: &str, handler: Handler) -> Result<()> {
        let full_pattern = self.options.topic(topic_pattern);
        self.client
            .subscribe(&full_pattern, QoS::AtLeastOnce)
            .await
            .map_err(EdgeKvError::from)?;
        self.subs.write().await.push(Subscription {
            pattern: full_pattern,
            handler,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.subs.write().await.clear();
        self.client.disconnect().await.map_err(EdgeKvError::from)
    }
}

/// MQTT topic matching: `+` matches exactly one level, a trailing `#`
/// matches any number of trailing levels.
fn mqtt_topic_matches(pattern: &str, topic: &str) -> bool {
    let pat: Vec<&str> = pattern.split('/').collect();
    let top: Vec<&str> = topic.split('/').collect();
    let mut pi = 0;
    let mut ti = 0;
    while pi < pat.len() {
        if pat[pi] == "#" {
            return true;
        }
        if ti >= top.len() {
            return false;
        }
        if pat[pi] != "+" && pat[pi] != top[ti] {
            return false;
        }
        pi += 1;
        ti += 1;
    }
    ti == top.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_matches_single_level() {
        assert!(mqtt_topic_matches("edgekv/+/sync", "edgekv/E1/sync"));
        assert!(!mqtt_topic_matches("edgekv/+/sync", "edgekv/E1/E2/sync"));
    }

    #[test]
    fn hash_matches_remaining_levels() {
        assert!(mqtt_topic_matches("edgekv/#", "edgekv/E1/sync"));
        assert!(mqtt_topic_matches("edgekv/#", "edgekv"));
    }

    #[test]
    fn literal_topic_matches_exactly() {
        assert!(mqtt_topic_matches("edgekv/sync", "edgekv/sync"));
        assert!(!mqtt_topic_matches("edgekv/sync", "edgekv/other"));
    }
}
