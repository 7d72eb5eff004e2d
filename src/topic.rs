//! Logical topic-groups served by the dashboard backend.
//!
//! Each topic-group is a separate WebSocket endpoint backed by its own
//! [`ConnectionManager`](crate::connection::ConnectionManager) instance.

use std::fmt;

/// A named logical stream exposed by the backend at `{base}/ws/{topic}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Trades,
    Signals,
    Performance,
    AgentStatus,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::Trades,
        Topic::Signals,
        Topic::Performance,
        Topic::AgentStatus,
    ];

    /// URL path segment for this topic-group.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Trades => "trades",
            Topic::Signals => "signals",
            Topic::Performance => "performance",
            Topic::AgentStatus => "agent-status",
        }
    }

    /// Primary message type carried on this stream.
    pub fn event_kind(&self) -> &'static str {
        match self {
            Topic::Trades => "trade",
            Topic::Signals => "signal",
            Topic::Performance => "performance",
            Topic::AgentStatus => "agent_status",
        }
    }

    /// Compose the full endpoint URL from a configured base address.
    pub fn endpoint_url(&self, base_url: &str) -> String {
        format!("{}/ws/{}", base_url.trim_end_matches('/'), self.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            Topic::Trades.endpoint_url("ws://localhost:8081"),
            "ws://localhost:8081/ws/trades"
        );
        assert_eq!(
            Topic::AgentStatus.endpoint_url("ws://localhost:8081/"),
            "ws://localhost:8081/ws/agent-status"
        );
    }

    #[test]
    fn test_display_matches_path_segment() {
        for topic in Topic::ALL {
            assert_eq!(topic.to_string(), topic.as_str());
        }
    }
}
