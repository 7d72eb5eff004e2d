use std::sync::Arc;

use anyhow::Result;
use tokio::signal;

use tradelink::config::Settings;
use tradelink::connection::ConnectionManager;
use tradelink::telemetry;
use tradelink::{ConnectionState, Topic};

/// Demo watcher: opens one stream per topic-group and logs everything the
/// backend pushes until Ctrl-C.
#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let settings = Settings::new()?;
    tracing::info!(base_url = %settings.stream.base_url, "Configuration loaded");

    let mut managers = Vec::new();
    for topic in Topic::ALL {
        let manager = ConnectionManager::new(topic, &settings);

        let kind = topic.event_kind();
        manager.subscribe(
            kind,
            Arc::new(move |payload| {
                tracing::info!(topic = %topic, kind = %kind, %payload, "Event received");
            }),
        );

        manager.connect(Some(Arc::new(move |state: ConnectionState| {
            tracing::info!(topic = %topic, state = %state, "Stream status changed");
        })));

        managers.push(manager);
    }

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    for manager in &managers {
        manager.disconnect();
    }

    // Give the connection tasks a moment to close their transports
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
