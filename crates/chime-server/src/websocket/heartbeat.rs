//! Liveness monitoring for server-side connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// No inbound frame arrived within the timeout window.
    TimedOut,
    /// The connection ended or the server is shutting down.
    Cancelled,
}

/// Check the connection's alive flag once per `interval`.
///
/// The flag is set by any inbound frame (usually the pong answering the
/// writer's ping). After `timeout / interval` consecutive silent intervals,
/// at least one, the connection is declared dead.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    let _ = ticker.tick().await;

    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
        }
    }
}
