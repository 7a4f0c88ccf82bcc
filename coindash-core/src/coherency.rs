//! Cross-context cache coherency.
//!
//! Contexts that share a persistent store announce fresh writes on a named
//! channel so the others can drop their in-memory copy and re-read from the
//! store instead of the network. Delivery is advisory: a missed message only
//! means a possibly stale read that corrects itself on the next fetch.
//!
//! A `CoherencyBus` hands out `ReadyChannel` handles. Each handle has its own
//! context id, and a handle never receives its own announcements.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

pub const BUNDLE_CHANNEL: &str = "chart_bundle";

const CHANNEL_CAPACITY: usize = 64;

/// "A fresher bundle for `key` was written at `saved_at`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyMessage {
    pub key: String,
    pub saved_at: i64,
}

/// Wire form: `{"type": "bundle_ready", "key": ..., "savedAt": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    BundleReady(ReadyMessage),
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    message: ChannelMessage,
}

/// Registry of named channels shared by every context of one origin.
#[derive(Clone, Default)]
pub struct CoherencyBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
    next_id: Arc<AtomicU64>,
}

impl CoherencyBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a handle on `name`, creating the channel on first use.
    pub fn open(&self, name: &str) -> ReadyChannel {
        let sender = self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        ReadyChannel {
            name: name.to_string(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            sender: Some(sender),
        }
    }
}

/// One context's handle on a named channel.
#[derive(Clone)]
pub struct ReadyChannel {
    name: String,
    id: u64,
    sender: Option<broadcast::Sender<Envelope>>,
}

impl ReadyChannel {
    /// A handle that drops every announcement and never delivers.
    pub fn disabled() -> Self {
        Self {
            name: String::new(),
            id: 0,
            sender: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Announce a fresh persistent write. Never fails.
    pub fn broadcast_ready(&self, key: &str, saved_at: i64) {
        let Some(sender) = &self.sender else {
            return;
        };
        let envelope = Envelope {
            origin: self.id,
            message: ChannelMessage::BundleReady(ReadyMessage {
                key: key.to_string(),
                saved_at,
            }),
        };
        // an error only means nobody is listening
        let receivers = sender.send(envelope).unwrap_or(0);
        debug!(channel = %self.name, %key, saved_at, receivers, "bundle ready announced");
    }

    /// Deliver announcements from other contexts to `handler`.
    ///
    /// Runs on the current tokio runtime; without one (or on a disabled
    /// channel) the subscription is inert.
    pub fn on_ready<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ReadyMessage) + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return Subscription::inert();
        };
        let Ok(runtime) = Handle::try_current() else {
            debug!(channel = %self.name, "no async runtime; subscription inert");
            return Subscription::inert();
        };

        let mut rx = sender.subscribe();
        let own_id = self.id;
        let name = self.name.clone();
        let task = runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.origin == own_id => {}
                    Ok(Envelope {
                        message: ChannelMessage::BundleReady(msg),
                        ..
                    }) => handler(msg),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(channel = %name, skipped, "listener lagged; announcements skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { task: Some(task) }
    }
}

/// Live listener; stops on `unsubscribe` or drop.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn inert() -> Self {
        Self { task: None }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn collect(channel: &ReadyChannel) -> (Subscription, mpsc::UnboundedReceiver<ReadyMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = channel.on_ready(move |msg| {
            let _ = tx.send(msg);
        });
        (sub, rx)
    }

    #[tokio::test]
    async fn other_contexts_receive_announcements() {
        let bus = CoherencyBus::new();
        let writer = bus.open(BUNDLE_CHANNEL);
        let reader = bus.open(BUNDLE_CHANNEL);
        let (_sub, mut rx) = collect(&reader);

        writer.broadcast_ready("spot|BTCUSDT|1h", 42);

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, ReadyMessage { key: "spot|BTCUSDT|1h".into(), saved_at: 42 });
    }

    #[tokio::test]
    async fn own_announcements_are_not_delivered() {
        let bus = CoherencyBus::new();
        let ctx = bus.open(BUNDLE_CHANNEL);
        let other = bus.open(BUNDLE_CHANNEL);
        let (_sub, mut rx) = collect(&ctx);

        ctx.broadcast_ready("mine", 1);
        other.broadcast_ready("theirs", 2);

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.key, "theirs");
    }

    #[tokio::test]
    async fn channels_are_isolated_by_name() {
        let bus = CoherencyBus::new();
        let a = bus.open("a");
        let b = bus.open("b");
        let (_sub, mut rx) = collect(&b);

        a.broadcast_ready("k", 1);
        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = CoherencyBus::new();
        let writer = bus.open(BUNDLE_CHANNEL);
        let reader = bus.open(BUNDLE_CHANNEL);
        let (sub, mut rx) = collect(&reader);
        assert!(sub.is_active());

        sub.unsubscribe();
        writer.broadcast_ready("k", 1);
        // the handler (and its sender) is dropped with the aborted task
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn without_runtime_subscription_is_inert() {
        let bus = CoherencyBus::new();
        let channel = bus.open(BUNDLE_CHANNEL);
        let sub = channel.on_ready(|_| {});
        assert!(!sub.is_active());
        channel.broadcast_ready("k", 1);
    }

    #[test]
    fn disabled_channel_is_noop() {
        let channel = ReadyChannel::disabled();
        assert!(!channel.is_enabled());
        channel.broadcast_ready("k", 1);
        assert!(!channel.on_ready(|_| {}).is_active());
    }

    #[test]
    fn wire_format() {
        let msg = ChannelMessage::BundleReady(ReadyMessage { key: "k".into(), saved_at: 5 });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"type": "bundle_ready", "key": "k", "savedAt": 5}));
        let back: ChannelMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
