use thiserror::Error;

/// Errors surfaced through `Result` at the library's construction and
/// serialization boundaries.
///
/// Transport-level failures (network drop, server-initiated close) are
/// deliberately absent: they are reported through the status callback and
/// handled by automatic, bounded retry rather than escalated to callers.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
