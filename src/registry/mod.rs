//! Subscriber registry: routes inbound payloads to handlers by message type.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use serde::de::DeserializeOwned;

/// A subscriber callback. Handler identity is the `Arc` pointer: registering
/// the same `Arc` twice for a type stores it once, and `unsubscribe` removes
/// exactly that handler.
pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Adapt a strongly-typed closure into a [`Handler`].
///
/// Payloads that fail to deserialize into `T` are logged and dropped; they
/// never abort dispatch. Each call produces a distinct handler identity.
pub fn typed_handler<T, F>(f: F) -> Handler
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(move |payload: Value| match serde_json::from_value::<T>(payload) {
        Ok(typed) => f(typed),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping payload that does not match subscriber type");
        }
    })
}

/// Mapping from message type to its set of handlers.
///
/// The registry outlives any individual connection: reconnects never clear
/// it, only explicit `unsubscribe` calls do.
#[derive(Default)]
pub struct SubscriberRegistry {
    handlers: DashMap<String, Vec<Handler>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for a message type. Idempotent per (type, handler).
    pub fn subscribe(&self, kind: &str, handler: Handler) {
        let mut entry = self.handlers.entry(kind.to_string()).or_default();
        if !entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            entry.push(handler);
        }
    }

    /// Remove a handler; no-op if it was never registered.
    pub fn unsubscribe(&self, kind: &str, handler: &Handler) {
        if let Some(mut entry) = self.handlers.get_mut(kind) {
            entry.retain(|h| !Arc::ptr_eq(h, handler));
        }
        self.handlers.retain(|_, v| !v.is_empty());
    }

    /// Dispatch a payload to every handler registered for `kind`, in
    /// registration order. Returns the number of handlers invoked.
    ///
    /// The handler set is snapshotted first, so subscribing or unsubscribing
    /// from within a callback cannot corrupt the active iteration. Each
    /// handler runs isolated: one panicking subscriber never stops delivery
    /// to the rest.
    pub fn dispatch(&self, kind: &str, payload: &Value) -> usize {
        let snapshot: Vec<Handler> = self
            .handlers
            .get(kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for handler in &snapshot {
            let payload = payload.clone();
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                tracing::warn!(kind = %kind, "Subscriber panicked during dispatch");
            }
        }

        snapshot.len()
    }

    /// Number of handlers registered for a message type.
    pub fn handler_count(&self, kind: &str) -> usize {
        self.handlers.get(kind).map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
