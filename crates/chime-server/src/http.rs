//! HTTP collaborator: static artifact, text submissions, health and metrics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::health::{self, HealthResponse};
use crate::metrics::SUBMISSIONS_TOTAL;
use crate::supervisor::GeneratorSupervisor;
use crate::websocket::registry::ClientRegistry;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Registry, for the health connection count.
    pub registry: Arc<ClientRegistry>,
    /// Launches generators for submissions.
    pub supervisor: Arc<GeneratorSupervisor>,
    /// Renders `/metrics`; absent when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// The watched artifact.
    pub watch_file: PathBuf,
    /// Directory served statically.
    pub public_dir: PathBuf,
}

/// `POST /submit` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    /// Text handed to the generator.
    #[serde(default)]
    pub text: String,
}

/// `POST /submit` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    /// Whether the submission was accepted.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl SubmitResponse {
    fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

/// Build the router for the HTTP port.
///
/// Unmatched paths fall through to static files under `public_dir`, so the
/// artifact is served at `/<artifact-name>`.
pub fn router(state: HttpState) -> Router {
    let files = ServeDir::new(&state.public_dir);
    Router::new()
        .route("/submit", post(submit_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback_service(files)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn submit_handler(
    State(state): State<HttpState>,
    Json(req): Json<SubmitRequest>,
) -> (StatusCode, Json<SubmitResponse>) {
    let text = req.text.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SubmitResponse::new(false, "text must not be empty")),
        );
    }

    info!(text_len = text.len(), "received submission");
    match state.supervisor.launch(text) {
        Ok(_) => {
            counter!(SUBMISSIONS_TOTAL).increment(1);
            (StatusCode::OK, Json(SubmitResponse::new(true, "Text received")))
        }
        Err(e) => {
            warn!(error = %e, "failed to launch generator");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SubmitResponse::new(false, "failed to start generator")),
            )
        }
    }
}

async fn health_handler(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        &state.watch_file,
        state.supervisor.is_configured(),
    ))
}

async fn metrics_handler(State(state): State<HttpState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
