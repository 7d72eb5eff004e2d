//! Connection lifecycle management for one logical topic-group stream.
//!
//! A [`ConnectionManager`] owns a single WebSocket to its topic endpoint,
//! drives automatic reconnection with capped exponential backoff, sends
//! keep-alive pings while connected, and multiplexes inbound frames to the
//! subscriber registry. Instances are fully isolated: the application holds
//! one per topic-group and they share nothing.

mod state;
pub(crate) mod task;

pub use state::{ConnectionState, LifecycleEvent, StatusCallback};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{ReconnectConfig, Settings};
use crate::message::OutboundFrame;
use crate::registry::{Handler, SubscriberRegistry};
use crate::topic::Topic;

/// State shared between the public handle and the background task.
pub(crate) struct Shared {
    topic: Topic,
    registry: SubscriberRegistry,
    state: Mutex<ConnectionState>,
    status: Mutex<Option<StatusCallback>>,
    out_tx: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    connected: AtomicBool,
    /// Set by `disconnect()`; suppresses reconnection in the task.
    shutdown: AtomicBool,
    /// Consecutive failed attempts, mirrored from the retry policy.
    attempts: AtomicU32,
}

impl Shared {
    fn new(topic: Topic) -> Self {
        Self {
            topic,
            registry: SubscriberRegistry::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            status: Mutex::new(None),
            out_tx: Mutex::new(None),
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
        }
    }

    /// Apply a lifecycle event and notify the status callback synchronously.
    pub(crate) fn apply(&self, event: LifecycleEvent) {
        let next = {
            let mut current = self.state.lock().unwrap();
            let next = state::transition(*current, event);
            *current = next;
            next
        };
        let callback = self.status.lock().unwrap().clone();
        if let Some(cb) = callback {
            cb(next);
        }
    }

    pub(crate) fn topic(&self) -> Topic {
        self.topic
    }

    pub(crate) fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn store_attempts(&self, attempts: u32) {
        self.attempts.store(attempts, Ordering::SeqCst);
    }

    pub(crate) fn install_sender(&self, tx: mpsc::UnboundedSender<OutboundFrame>) {
        *self.out_tx.lock().unwrap() = Some(tx);
    }

    pub(crate) fn clear_sender(&self) {
        *self.out_tx.lock().unwrap() = None;
    }
}

/// Maintains a best-effort-always-on stream to a single topic endpoint.
pub struct ConnectionManager {
    topic: Topic,
    url: String,
    keepalive: Duration,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Resolve the topic to its endpoint URL. Does not open the connection.
    pub fn new(topic: Topic, settings: &Settings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            topic,
            url: topic.endpoint_url(&settings.stream.base_url),
            keepalive: Duration::from_secs(settings.stream.keepalive_interval_secs),
            reconnect: settings.reconnect.clone(),
            shared: Arc::new(Shared::new(topic)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Open the underlying transport.
    ///
    /// Transitions to `connecting` and fires the callback synchronously, then
    /// spawns the background connection task (a tokio runtime must be
    /// current). Calling `connect` while a connection cycle is already live
    /// is a no-op; after the retry budget is exhausted or `disconnect()`,
    /// calling it again starts a fresh cycle.
    pub fn connect(&self, status: Option<StatusCallback>) {
        {
            let mut task = self.task.lock().unwrap();
            if let Some(handle) = task.as_ref() {
                if !handle.is_finished() {
                    if self.shared.shutdown_requested() {
                        // Teardown raced with reconnect: drop the old cycle's
                        // transport before opening a new one.
                        handle.abort();
                        self.shared.set_connected(false);
                        self.shared.clear_sender();
                        *task = None;
                    } else {
                        tracing::debug!(topic = %self.topic, "connect() ignored, connection cycle already live");
                        return;
                    }
                }
            }
        }

        self.shared.shutdown.store(false, Ordering::SeqCst);
        *self.shared.status.lock().unwrap() = status;
        // The task slot is unlocked here so the callback may call back into
        // this manager.
        self.shared.apply(LifecycleEvent::ConnectRequested);

        let mut task = self.task.lock().unwrap();
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                // A reentrant connect() from the status callback already
                // spawned this cycle's task.
                return;
            }
        }
        let shutdown_rx = self.shutdown_tx.subscribe();
        let shared = self.shared.clone();
        let url = self.url.clone();
        let keepalive = self.keepalive;
        let reconnect = self.reconnect.clone();
        tracing::info!(topic = %self.topic, url = %self.url, "Opening stream");
        *task = Some(tokio::spawn(task::run(
            shared,
            url,
            keepalive,
            reconnect,
            shutdown_rx,
        )));
    }

    /// Register a handler for a message type. Idempotent per (type, handler);
    /// valid in any state, and the registration survives reconnects.
    pub fn subscribe(&self, kind: &str, handler: Handler) {
        self.shared.registry.subscribe(kind, handler);
    }

    /// Remove a handler; no-op if it was never registered.
    pub fn unsubscribe(&self, kind: &str, handler: &Handler) {
        self.shared.registry.unsubscribe(kind, handler);
    }

    /// Transmit a frame if the transport is currently open. Otherwise the
    /// frame is silently dropped: outbound messages are never queued.
    pub fn send(&self, frame: OutboundFrame) {
        if !self.shared.connected.load(Ordering::SeqCst) {
            tracing::trace!(topic = %self.topic, kind = %frame.kind, "Dropping outbound frame while disconnected");
            return;
        }
        if let Some(tx) = self.shared.out_tx.lock().unwrap().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Convenience wrapper building the frame from a type and payload.
    pub fn send_message(&self, kind: impl Into<String>, payload: Value) {
        self.send(OutboundFrame::new(kind, payload));
    }

    /// Deliberate teardown: cancels any pending retry, stops the keep-alive
    /// timer, closes the transport, and suppresses reconnection. Idempotent.
    pub fn disconnect(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(topic = %self.topic, "Disconnect requested");
        let _ = self.shutdown_tx.send(());
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Resolved endpoint URL for this manager.
    pub fn endpoint(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Consecutive failed connection attempts in the current cycle. Resets
    /// to zero on every successful connection.
    pub fn retry_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Best-effort teardown of the background task.
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn test_settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_construction_resolves_endpoint() {
        let manager = ConnectionManager::new(Topic::Signals, &test_settings());
        assert_eq!(manager.endpoint(), "ws://127.0.0.1:8081/ws/signals");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_send_while_disconnected_is_noop() {
        let manager = ConnectionManager::new(Topic::Trades, &test_settings());
        manager.send_message("order", json!({"qty": 1}));
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_subscriptions_without_connection() {
        let manager = ConnectionManager::new(Topic::Trades, &test_settings());
        let count = Arc::new(AtomicUsize::new(0));
        let count_ref = count.clone();
        let handler: Handler = Arc::new(move |_| {
            count_ref.fetch_add(1, Ordering::SeqCst);
        });

        manager.subscribe("trade", handler.clone());
        manager.subscribe("trade", handler.clone());
        assert_eq!(manager.shared.registry.handler_count("trade"), 1);

        manager.unsubscribe("trade", &handler);
        assert_eq!(manager.shared.registry.handler_count("trade"), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reentrant_status_callback_does_not_deadlock() {
        let mut settings = test_settings();
        settings.stream.base_url = "ws://127.0.0.1:9".to_string();
        settings.reconnect.max_attempts = 1;
        let manager = Arc::new(ConnectionManager::new(Topic::Trades, &settings));

        let reentered = Arc::new(AtomicBool::new(false));
        let flag = reentered.clone();
        let inner = manager.clone();
        let callback: StatusCallback = Arc::new(move |state| {
            if state == ConnectionState::Connecting && !flag.swap(true, Ordering::SeqCst) {
                inner.connect(None);
            }
        });

        manager.connect(Some(callback));
        assert!(reentered.load(Ordering::SeqCst));
        manager.disconnect();
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_without_connect() {
        let manager = ConnectionManager::new(Topic::Performance, &test_settings());
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
