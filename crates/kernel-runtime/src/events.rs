//! The Event Bus: a non-blocking publish/subscribe channel carrying
//! `(source, topic, payload, timestamp)` events between the Hot Reload
//! Controller, the Ghost Index, and external publishers (e.g. a file
//! watcher wired in by the host).
//!
//! Backed by `tokio::sync::broadcast`: a slow subscriber drops the oldest
//! buffered events rather than backpressuring publishers. Subscribers
//! filter by topic prefix client-side.

use crate::types::{Event, Topic};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Never blocks; if there are no subscribers the
    /// event is simply dropped.
    pub fn publish(&self, source: impl Into<String>, topic: Topic, payload: serde_json::Value, timestamp: f64) {
        let event = Event {
            source: source.into(),
            topic,
            payload,
            timestamp,
        };
        // Err means no receivers are currently subscribed; not a failure.
        let _ = self.sender.send(event);
    }

    /// Subscribe to the bus. The returned receiver sees all topics; filter
    /// with `Subscription::matches` or `recv_matching`.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Await the next event regardless of topic. `Lagged` (the receiver
    /// fell behind and the oldest events were dropped) is surfaced as
    /// `None` rather than propagated, so a slow consumer degrades to
    /// missed events instead of an error the caller must handle per-poll.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Await the next event whose topic's wire string starts with
    /// `prefix`, e.g. `"skill/"` matches both `skill/loaded` and
    /// `skill/evicted`.
    pub async fn recv_matching(&mut self, prefix: &str) -> Option<Event> {
        loop {
            let event = self.recv().await?;
            if event.topic.as_str().starts_with(prefix) {
                return Some(event);
            }
        }
    }
}

/// Cooperative cancellation flag shared between a long-running controller
/// (e.g. the Hot Reload Controller's poll loop) and whoever owns its
/// lifetime.
#[derive(Clone, Default)]
pub struct StopFlag(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
