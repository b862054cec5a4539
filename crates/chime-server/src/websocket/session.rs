//! One WebSocket connection from upgrade to removal.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chime_core::ConnectionId;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::ClientRegistry;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Per-connection tuning.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence after which the connection is dropped.
    pub heartbeat_timeout: Duration,
    /// Outbound queue depth.
    pub send_queue: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            send_queue: 64,
        }
    }
}

/// Serve one upgraded socket until it closes, errors, times out or the
/// server shuts down.
///
/// The connection is registered before any frame is exchanged and removed
/// exactly once on the way out. Inbound application frames are not part of
/// the protocol and are only logged.
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    registry: Arc<ClientRegistry>,
    options: SessionOptions,
    shutdown: CancellationToken,
) {
    let id = ConnectionId::new();
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&id));

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(options.send_queue.max(1));
    let connection = Arc::new(ClientConnection::new(id.clone(), send_tx));

    let _ = registry.add(connection.clone());
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(clients = registry.len(), "client connected");

    let conn_cancel = shutdown.child_token();

    let hb_conn = connection.clone();
    let hb_cancel = conn_cancel.clone();
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(
            hb_conn.clone(),
            options.ping_interval,
            options.heartbeat_timeout,
            hb_cancel.clone(),
        )
        .await;
        if result == HeartbeatResult::TimedOut {
            warn!(
                timeout = ?options.heartbeat_timeout,
                silent_ms = hb_conn.last_seen_elapsed().as_millis(),
                "client unresponsive, disconnecting"
            );
            hb_cancel.cancel();
        }
    });

    let out_cancel = conn_cancel.clone();
    let mut outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(options.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                () = out_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if let Err(e) = ws_tx.send(Message::Text(text.to_string().into())).await {
                        debug!(error = %e, "write failed");
                        out_cancel.cancel();
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        out_cancel.cancel();
                        break;
                    }
                }
            }
        }
    });

    loop {
        tokio::select! {
            () = conn_cancel.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("client closed connection");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => connection.mark_alive(),
                Some(Ok(Message::Text(text))) => {
                    connection.mark_alive();
                    debug!(len = text.len(), "ignoring inbound text frame");
                }
                Some(Ok(Message::Binary(data))) => {
                    connection.mark_alive();
                    debug!(len = data.len(), "ignoring inbound binary frame");
                }
                Some(Err(e)) => {
                    warn!(error = %e, "transport error");
                    break;
                }
            },
        }
    }

    conn_cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(1), &mut outbound).await.is_err() {
        debug!("outbound writer did not finish in time");
        outbound.abort();
    }
    heartbeat.abort();

    if registry.remove(&id) {
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
    info!(
        clients = registry.len(),
        connected_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // Socket behavior is covered by tests/integration.rs with a real client.

    #[test]
    fn default_options_match_settings_defaults() {
        let opts = SessionOptions::default();
        let settings = chime_settings::ServerSettings::default();
        assert_eq!(opts.ping_interval, settings.heartbeat_interval());
        assert_eq!(opts.heartbeat_timeout, settings.heartbeat_timeout());
        assert_eq!(opts.send_queue, settings.send_queue);
    }
}
