//! Connection lifecycle states and the transition function driving them.

use std::fmt;
use std::sync::Arc;

/// Lifecycle phase of a managed connection. Transitions are driven only by
/// the manager; callers observe them through the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoked synchronously with the new state on every transition. Repeated
/// identical values are possible; no de-duplication is performed.
pub type StatusCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Events observed by the manager that move the lifecycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `connect()` was called, or a scheduled retry elapsed.
    ConnectRequested,
    /// The transport completed its handshake.
    TransportOpen,
    /// The transport closed, for any reason.
    TransportClosed,
    /// The transport reported an error. This is a status overlay only:
    /// reconnection is keyed off the close that follows, not the error.
    TransportError,
    /// A retry was scheduled and its backoff delay elapsed.
    RetryElapsed,
    /// `disconnect()` tore the manager down.
    Teardown,
}

/// Pure transition function, unit-testable without a transport.
pub fn transition(_current: ConnectionState, event: LifecycleEvent) -> ConnectionState {
    match event {
        LifecycleEvent::ConnectRequested | LifecycleEvent::RetryElapsed => {
            ConnectionState::Connecting
        }
        LifecycleEvent::TransportOpen => ConnectionState::Connected,
        LifecycleEvent::TransportClosed | LifecycleEvent::Teardown => {
            ConnectionState::Disconnected
        }
        LifecycleEvent::TransportError => ConnectionState::Error,
    }
}
