// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod telemetry;

// Streaming client
pub mod backoff;
pub mod connection;
pub mod message;
pub mod registry;
pub mod topic;

pub use connection::{ConnectionManager, ConnectionState, StatusCallback};
pub use message::{InboundFrame, OutboundFrame};
pub use registry::{typed_handler, Handler};
pub use topic::Topic;
