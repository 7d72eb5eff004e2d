//! Background task owning the WebSocket for one manager.
//!
//! One task instance exists per connection cycle; it holds the only
//! transport handle the manager ever has. The loop follows the lifecycle:
//! open, pump frames, observe the close, schedule a bounded retry.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use super::{LifecycleEvent, Shared};
use crate::backoff::RetryPolicy;
use crate::config::ReconnectConfig;
use crate::message::{InboundFrame, OutboundFrame};

pub(crate) async fn run(
    shared: Arc<Shared>,
    url: String,
    keepalive: Duration,
    reconnect: ReconnectConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut policy = RetryPolicy::new(reconnect);
    shared.store_attempts(0);

    // interval_at panics on a zero period
    let keepalive = if keepalive.is_zero() {
        Duration::from_secs(30)
    } else {
        keepalive
    };

    loop {
        // Open the transport, unless torn down first.
        let attempt = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = shutdown_rx.recv() => {
                shared.apply(LifecycleEvent::Teardown);
                return;
            }
        };

        let mut ws = match attempt {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::warn!(topic = %shared.topic(), url = %url, error = %e, "Connection attempt failed");
                shared.apply(LifecycleEvent::TransportError);
                shared.apply(LifecycleEvent::TransportClosed);
                if !schedule_retry(&shared, &mut policy, &mut shutdown_rx).await {
                    return;
                }
                continue;
            }
        };

        let session_id = Uuid::new_v4();
        tracing::info!(topic = %shared.topic(), session_id = %session_id, "Stream connected");

        policy.reset();
        shared.store_attempts(0);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        shared.install_sender(out_tx);
        shared.set_connected(true);
        shared.apply(LifecycleEvent::TransportOpen);

        // First tick one full period after connect, never immediately.
        let mut keepalive_timer = interval_at(Instant::now() + keepalive, keepalive);
        let mut teardown = false;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = ws.close(None).await;
                    teardown = true;
                    break;
                }

                _ = keepalive_timer.tick() => {
                    let ping = OutboundFrame::ping()
                        .to_json()
                        .unwrap_or_else(|_| r#"{"type":"ping","payload":null}"#.to_string());
                    if let Err(e) = ws.send(Message::text(ping)).await {
                        tracing::warn!(topic = %shared.topic(), session_id = %session_id, error = %e, "Keep-alive send failed");
                        shared.apply(LifecycleEvent::TransportError);
                        break;
                    }
                    tracing::debug!(topic = %shared.topic(), session_id = %session_id, "Keep-alive ping sent");
                }

                Some(frame) = out_rx.recv() => {
                    match frame.to_json() {
                        Ok(text) => {
                            if let Err(e) = ws.send(Message::text(text)).await {
                                tracing::warn!(topic = %shared.topic(), session_id = %session_id, error = %e, "Outbound send failed");
                                shared.apply(LifecycleEvent::TransportError);
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(topic = %shared.topic(), kind = %frame.kind, error = %e, "Dropping unserializable outbound frame");
                        }
                    }
                }

                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            handle_text(&shared, text.as_str());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(topic = %shared.topic(), session_id = %session_id, "Server closed stream");
                            break;
                        }
                        // Binary, pong and raw frames carry nothing we route
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(topic = %shared.topic(), session_id = %session_id, error = %e, "Transport error");
                            shared.apply(LifecycleEvent::TransportError);
                            break;
                        }
                        None => {
                            tracing::info!(topic = %shared.topic(), session_id = %session_id, "Stream ended");
                            break;
                        }
                    }
                }
            }
        }

        shared.set_connected(false);
        shared.clear_sender();

        if teardown || shared.shutdown_requested() {
            shared.apply(LifecycleEvent::Teardown);
            tracing::info!(topic = %shared.topic(), session_id = %session_id, "Stream torn down");
            return;
        }

        shared.apply(LifecycleEvent::TransportClosed);
        if !schedule_retry(&shared, &mut policy, &mut shutdown_rx).await {
            return;
        }
    }
}

/// Parse an inbound text frame and dispatch its payload. A malformed frame
/// is logged and dropped; it never tears down the connection.
fn handle_text(shared: &Shared, text: &str) {
    match InboundFrame::parse(text) {
        Ok(frame) => {
            let delivered = shared.registry().dispatch(&frame.kind, &frame.payload);
            tracing::trace!(topic = %shared.topic(), kind = %frame.kind, handlers = delivered, "Frame dispatched");
        }
        Err(e) => {
            tracing::warn!(topic = %shared.topic(), error = %e, "Dropping malformed frame");
        }
    }
}

/// Record the failed attempt and wait out the backoff delay.
///
/// Returns `false` when the task must stop: retry budget exhausted (the
/// manager stays disconnected until `connect()` is called again) or teardown
/// while the retry was pending.
async fn schedule_retry(
    shared: &Shared,
    policy: &mut RetryPolicy,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> bool {
    let attempt = policy.next_attempt();
    shared.store_attempts(attempt);

    if policy.exhausted() {
        tracing::warn!(
            topic = %shared.topic(),
            attempts = attempt,
            "Reconnection attempts exhausted, staying disconnected"
        );
        return false;
    }

    let delay = policy.delay_for(attempt);
    tracing::info!(
        topic = %shared.topic(),
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        "Scheduling reconnect"
    );

    tokio::select! {
        _ = sleep(delay) => {}
        _ = shutdown_rx.recv() => return false,
    }

    shared.apply(LifecycleEvent::RetryElapsed);
    true
}
