//! `/health` response.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket connections.
    pub connections: usize,
    /// The watched artifact path.
    pub watch_file: String,
    /// Whether submissions launch a generator.
    pub generator_configured: bool,
}

/// Build a health response from live values.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    watch_file: &Path,
    generator_configured: bool,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        watch_file: watch_file.display().to_string(),
        generator_configured,
    }
}
