//! In-process pattern-subscription fan-out over a single bounded ingress
//! channel, decoupling Bus ingestion from subscriber callbacks (§4.6).
//!
//! Grounded in the same "owns a channel, fans out to consumers, drops
//! rather than blocks the producer" shape the teacher's
//! `local_fanout::FanoutServer` uses for its broadcast channel, adapted
//! from unconditional broadcast to pattern-matched dispatch over a bounded
//! `mpsc` (the teacher's fanout is itself bounded via `broadcast::channel`,
//! which already drops the oldest entry for a lagging receiver — the same
//! policy this dispatcher applies at the producer side instead).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};

use crate::keypath;
use edgekv_proto::Value;

/// Default bounded-channel capacity (§9: "Dispatcher channel... bounded,
/// default capacity 1024").
pub const DEFAULT_CAPACITY: usize = 1024;

/// A key/value pair dispatched to matching subscribers, plus the
/// originating edge and the value before/after the change.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub key: String,
    pub from: String,
    pub old: Value,
    pub new: Value,
}

type Callback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Closed,
}

struct Subscription {
    pattern: String,
    callback: Callback,
}

/// Subscription id returned by [`Dispatcher::watch`], opaque to callers.
pub type SubId = u64;

/// The in-process dispatcher. `start()`/`close()` drive `Idle -> Running ->
/// Closed`; `dispatch` enqueues onto a bounded ring buffer so publishers
/// never block on slow subscribers, dropping the oldest queued event (and
/// incrementing `dropped()`) once the buffer is full.
pub struct Dispatcher {
    state: RwLock<State>,
    subs: RwLock<HashMap<SubId, Subscription>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    queue: Mutex<VecDeque<WatchEvent>>,
    notify: Notify,
    capacity: usize,
}

impl Dispatcher {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Dispatcher {
            state: RwLock::new(State::Idle),
            subs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        })
    }

    /// Enter `Running`: spin up the dispatch loop task. No-op if already
    /// running.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.write().await;
        if *state == State::Running {
            return;
        }
        *state = State::Running;
        drop(state);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                this.notify.notified().await;
                loop {
                    if *this.state.read().await != State::Running {
                        return;
                    }
                    let event = this.queue.lock().await.pop_front();
                    let Some(event) = event else { break };
                    let subs = this.subs.read().await;
                    for sub in subs.values() {
                        if keypath::matches(&sub.pattern, &event.key) {
                            (sub.callback)(event.clone());
                        }
                    }
                }
            }
        });
    }

    /// Enter `Closed`: free the subscription table and drain the queue so
    /// the dispatch loop task exits on its next wakeup.
    pub async fn close(&self) {
        *self.state.write().await = State::Closed;
        self.queue.lock().await.clear();
        self.subs.write().await.clear();
        self.notify.notify_waiters();
    }

    /// Register `callback` for every dispatched event whose key matches
    /// `pattern` (glob semantics per §4.1). Returns a subscription id
    /// usable with [`Dispatcher::unwatch`].
    pub async fn watch<F>(&self, pattern: impl Into<String>, callback: F) -> SubId
    where
        F: Fn(WatchEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subs.write().await.insert(
            id,
            Subscription {
                pattern: pattern.into(),
                callback: Arc::new(callback),
            },
        );
        id
    }

    pub async fn unwatch(&self, sub_id: SubId) {
        self.subs.write().await.remove(&sub_id);
    }

    /// Enqueue `event` for dispatch. A no-op when not `Running`. Never
    /// blocks: if the ring buffer is full, the oldest queued event is
    /// dropped (and `dropped()` incremented) to make room for this one.
    pub async fn dispatch(&self, event: WatchEvent) {
        if *self.state.read().await != State::Running {
            return;
        }
        {
            let mut q = self.queue.lock().await;
            if q.len() >= self.capacity {
                q.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            q.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Count of events dropped due to a full dispatch channel.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn ev(key: &str) -> WatchEvent {
        WatchEvent {
            key: key.to_string(),
            from: "E1".to_string(),
            old: Value::Null,
            new: Value::Bool(true),
        }
    }

    #[tokio::test]
    async fn scenario_s5_pattern_fanout() {
        let d = Dispatcher::new();
        d.start().await;
        let star_hits = Arc::new(AtomicUsize::new(0));
        let exact_hits = Arc::new(AtomicUsize::new(0));

        let s1 = Arc::clone(&star_hits);
        d.watch("test.*", move |_| {
            s1.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        let s2 = Arc::clone(&exact_hits);
        d.watch("test.on", move |_| {
            s2.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        d.dispatch(ev("test.on")).await;
        d.dispatch(ev("test")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(star_hits.load(Ordering::SeqCst), 1);
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_before_start_is_noop() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        d.watch("*", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        d.dispatch(ev("a")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unwatch_stops_future_delivery() {
        let d = Dispatcher::new();
        d.start().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = d.watch("a", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        d.dispatch(ev("a")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        d.unwatch(id).await;
        d.dispatch(ev("a")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_then_dispatch_is_noop() {
        let d = Dispatcher::new();
        d.start().await;
        d.close().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        d.watch("*", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        d.dispatch(ev("a")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
