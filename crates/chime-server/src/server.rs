//! `ChimeServer`: wires the detector, registry and broadcaster to a
//! WebSocket listener and an HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chime_core::ArtifactUrl;
use chime_settings::ServerSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::errors::{Result, ServerError};
use crate::http::{self, HttpState};
use crate::shutdown::ShutdownCoordinator;
use crate::supervisor::GeneratorSupervisor;
use crate::watcher::FileChangeDetector;
use crate::websocket::broadcast::BroadcastEngine;
use crate::websocket::registry::ClientRegistry;
use crate::websocket::session::{SessionOptions, run_ws_session};

#[derive(Clone)]
struct WsState {
    registry: Arc<ClientRegistry>,
    options: SessionOptions,
    shutdown: CancellationToken,
}

/// The broadcast server, configured but not yet listening.
pub struct ChimeServer {
    settings: ServerSettings,
    registry: Arc<ClientRegistry>,
    supervisor: Arc<GeneratorSupervisor>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl ChimeServer {
    /// Validate settings and build the server.
    pub fn new(settings: ServerSettings, metrics: Option<PrometheusHandle>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            supervisor: Arc::new(GeneratorSupervisor::new(settings.generator.clone())),
            settings,
            registry: Arc::new(ClientRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        })
    }

    /// Server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// The client registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// The generator supervisor.
    pub fn supervisor(&self) -> &Arc<GeneratorSupervisor> {
        &self.supervisor
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Router for the WebSocket port. Upgrades are accepted at `/` and `/ws`.
    pub fn ws_router(&self) -> Router {
        let state = WsState {
            registry: self.registry.clone(),
            options: SessionOptions {
                ping_interval: self.settings.heartbeat_interval(),
                heartbeat_timeout: self.settings.heartbeat_timeout(),
                send_queue: self.settings.send_queue,
            },
            shutdown: self.shutdown.token(),
        };
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Router for the HTTP port.
    pub fn http_router(&self) -> Router {
        http::router(HttpState {
            registry: self.registry.clone(),
            supervisor: self.supervisor.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            watch_file: self.settings.watch_file.clone(),
            public_dir: self.settings.resolved_public_dir(),
        })
    }

    /// Establish the watch, bind both listeners and start serving.
    ///
    /// A watch failure or bind failure is returned before anything is
    /// served. With port 0 the OS picks a port; notification URLs use the
    /// HTTP port actually bound.
    pub async fn listen(&self) -> Result<RunningServer> {
        let detector = FileChangeDetector::new(&self.settings.watch_file)?;

        let ws_listener = bind(&self.settings.host, self.settings.ws_port).await?;
        let http_listener = bind(&self.settings.host, self.settings.http_port).await?;
        let ws_addr = ws_listener.local_addr()?;
        let http_addr = http_listener.local_addr()?;

        let artifact = self
            .settings
            .artifact_name()
            .ok_or_else(|| ServerError::Url(chime_core::UrlError::EmptyName))?;
        let url = ArtifactUrl::new(self.settings.public_host.clone(), http_addr.port(), artifact)?;
        let engine = Arc::new(BroadcastEngine::new(self.registry.clone(), url));

        let token = self.shutdown.token();
        let mut handles = Vec::with_capacity(3);

        handles.push(tokio::spawn(engine.clone().run(detector, token.clone())));
        handles.push(serve("websocket", ws_listener, self.ws_router(), token.clone()));
        handles.push(serve("http", http_listener, self.http_router(), token));

        info!(
            %ws_addr,
            %http_addr,
            url = %engine.url().payload(),
            watch_file = %self.settings.watch_file.display(),
            generator = self.supervisor.is_configured(),
            "chime server listening"
        );

        Ok(RunningServer {
            ws_addr,
            http_addr,
            engine,
            handles,
        })
    }
}

/// A server that is accepting connections.
pub struct RunningServer {
    /// Bound WebSocket address.
    pub ws_addr: SocketAddr,
    /// Bound HTTP address.
    pub http_addr: SocketAddr,
    engine: Arc<BroadcastEngine>,
    handles: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// The broadcaster driven by the file watch.
    pub fn engine(&self) -> &Arc<BroadcastEngine> {
        &self.engine
    }

    /// Background task handles, for graceful shutdown.
    pub fn into_handles(self) -> Vec<JoinHandle<()>> {
        self.handles
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

fn serve(name: &'static str, listener: TcpListener, router: Router, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await;
        if let Err(e) = result {
            error!(listener = name, error = %e, "listener failed");
        }
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_ws_session(socket, state.registry, state.options, state.shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::path::Path;
    use tower::ServiceExt;

    fn settings(dir: &Path) -> ServerSettings {
        ServerSettings {
            host: "127.0.0.1".into(),
            ws_port: 0,
            http_port: 0,
            public_host: "127.0.0.1".into(),
            watch_file: dir.join("audio.mp3"),
            ..ServerSettings::default()
        }
    }

    #[test]
    fn invalid_settings_rejected() {
        let bad = ServerSettings {
            ws_port: 7000,
            http_port: 7000,
            ..ServerSettings::default()
        };
        assert!(matches!(ChimeServer::new(bad, None), Err(ServerError::Settings(_))));
    }

    #[tokio::test]
    async fn missing_watch_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.watch_file = dir.path().join("gone").join("audio.mp3");
        let server = ChimeServer::new(s, None).unwrap();
        assert!(matches!(server.listen().await, Err(ServerError::Watch { .. })));
    }

    #[tokio::test]
    async fn url_uses_bound_http_port() {
        let dir = tempfile::tempdir().unwrap();
        let server = ChimeServer::new(settings(dir.path()), None).unwrap();
        let running = server.listen().await.unwrap();
        assert_eq!(
            running.engine().url().payload().as_str(),
            format!("http://127.0.0.1:{}/audio.mp3", running.http_addr.port())
        );
        assert_ne!(running.ws_addr.port(), 0);
        server.shutdown().graceful_shutdown(running.into_handles(), None).await;
    }

    #[tokio::test]
    async fn ipv6_public_host_is_bracketed() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.public_host = "::1".into();
        let server = ChimeServer::new(s, None).unwrap();
        let running = server.listen().await.unwrap();
        assert_eq!(
            running.engine().url().payload().as_str(),
            format!("http://[::1]:{}/audio.mp3", running.http_addr.port())
        );
        server.shutdown().graceful_shutdown(running.into_handles(), None).await;
    }

    #[tokio::test]
    async fn public_host_with_port_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.public_host = "box.local:9003".into();
        let server = ChimeServer::new(s, None).unwrap();
        assert!(matches!(
            server.listen().await,
            Err(ServerError::Url(chime_core::UrlError::InvalidHost(_)))
        ));
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let server = ChimeServer::new(settings(dir.path()), None).unwrap();
        let resp = server
            .ws_router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn http_router_serves_health() {
        let dir = tempfile::tempdir().unwrap();
        let server = ChimeServer::new(settings(dir.path()), None).unwrap();
        let resp = server
            .http_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
