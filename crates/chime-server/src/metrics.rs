//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::{Result, ServerError};

/// Install the global Prometheus recorder.
///
/// Call once at startup before any metric is recorded. The returned handle
/// renders the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections removed from the registry (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Currently registered connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Change events seen for the watched artifact (counter).
pub const FILE_CHANGES_TOTAL: &str = "file_changes_total";
/// Broadcasts performed (counter).
pub const BROADCASTS_TOTAL: &str = "broadcasts_total";
/// Notifications queued to a connection (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Notifications skipped for a closed or backed-up connection (counter).
pub const BROADCAST_SEND_FAILURES_TOTAL: &str = "broadcast_send_failures_total";
/// Accepted text submissions (counter).
pub const SUBMISSIONS_TOTAL: &str = "submissions_total";
/// Generator launches that failed (counter).
pub const GENERATOR_SPAWN_FAILURES_TOTAL: &str = "generator_spawn_failures_total";
