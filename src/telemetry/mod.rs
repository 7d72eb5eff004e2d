//! Tracing initialization for binaries embedding the streaming client.
//!
//! The library itself only emits `tracing` events and never installs a
//! subscriber; call [`init_tracing`] once from the application entry point.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
