//! # chime
//!
//! `chime serve` watches the audio artifact and pushes its URL to every
//! connected client. `chime listen` connects to a server and plays each
//! notified URL from the start.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use chime_client::{CommandBackend, ConnectionSession, PlaybackController, WsConnector, submit_text};
use chime_core::logging::{LogFormat, init_subscriber};
use chime_server::{ChimeServer, ShutdownCoordinator};
use chime_settings::{ChimeSettings, ClientSettings, CommandSpec, ServerSettings};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

/// Notifications buffered between the session and the playback controller.
const NOTIFICATION_QUEUE: usize = 32;

/// Push-notification bridge for a generated audio artifact.
#[derive(Parser, Debug)]
#[command(name = "chime", version, about = "Push-notification bridge for a generated audio artifact")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the broadcast server and its HTTP collaborator.
    Serve(ServeArgs),
    /// Connect to a server and play every notification.
    Listen(ListenArgs),
}

/// Flags shared by both subcommands.
#[derive(Args, Debug, Default)]
struct CommonArgs {
    /// Settings file (defaults to `~/.chime/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level or filter directive; `RUST_LOG` still wins.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Bind address for both listeners.
    #[arg(long)]
    host: Option<String>,

    /// WebSocket port (0 for auto-assign).
    #[arg(long)]
    ws_port: Option<u16>,

    /// HTTP port (0 for auto-assign).
    #[arg(long)]
    http_port: Option<u16>,

    /// Host name placed in notification URLs.
    #[arg(long)]
    public_host: Option<String>,

    /// Artifact to watch.
    #[arg(long)]
    watch_file: Option<PathBuf>,

    /// Directory served over HTTP.
    #[arg(long)]
    public_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(&self, server: &mut ServerSettings) {
        if let Some(host) = &self.host {
            server.host.clone_from(host);
        }
        if let Some(port) = self.ws_port {
            server.ws_port = port;
        }
        if let Some(port) = self.http_port {
            server.http_port = port;
        }
        if let Some(host) = &self.public_host {
            server.public_host.clone_from(host);
        }
        if let Some(path) = &self.watch_file {
            server.watch_file.clone_from(path);
        }
        if let Some(dir) = &self.public_dir {
            server.public_dir = Some(dir.clone());
        }
    }
}

#[derive(Args, Debug, Default)]
struct ListenArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// WebSocket URL of the broadcast server.
    #[arg(long)]
    server_url: Option<String>,

    /// Submit this text before starting playback.
    #[arg(long)]
    submit: Option<String>,

    /// Submission endpoint, e.g. `http://localhost:9003/submit`.
    #[arg(long)]
    submit_url: Option<String>,

    /// Delay before every reconnect attempt, in milliseconds.
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Budget for one handshake, in milliseconds.
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Player program, invoked with the artifact URL as its only argument.
    #[arg(long)]
    player: Option<String>,
}

impl ListenArgs {
    fn apply(&self, client: &mut ClientSettings) {
        if let Some(url) = &self.server_url {
            client.server_url.clone_from(url);
        }
        if let Some(url) = &self.submit_url {
            client.submit_url = Some(url.clone());
        }
        if let Some(ms) = self.reconnect_delay_ms {
            client.reconnect_delay_ms = ms;
        }
        if let Some(ms) = self.connect_timeout_ms {
            client.connect_timeout_ms = ms;
        }
        if let Some(program) = &self.player {
            client.player = CommandSpec::new(program.clone(), Vec::<String>::new());
        }
    }
}

/// Resolve settings and start logging.
fn prepare(common: &CommonArgs) -> Result<ChimeSettings> {
    let path = common
        .config
        .clone()
        .unwrap_or_else(chime_settings::settings_path);
    let mut settings = chime_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(level) = &common.log_level {
        settings.logging.level.clone_from(level);
    }
    if common.log_json {
        settings.logging.json = true;
    }
    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);
    Ok(settings)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut settings = prepare(&args.common)?;
    args.apply(&mut settings.server);

    let metrics = chime_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = ChimeServer::new(settings.server, Some(metrics)).context("Invalid server settings")?;
    let running = server.listen().await.context("Failed to start server")?;

    server.shutdown().wait_for_signal().await;
    info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(running.into_handles(), None)
        .await;
    server.supervisor().shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn listen(args: ListenArgs) -> Result<()> {
    let mut settings = prepare(&args.common)?;
    args.apply(&mut settings.client);
    let client = settings.client;

    if let Some(text) = &args.submit {
        let url = client
            .submit_url
            .as_deref()
            .context("--submit needs a submission URL (--submit-url or CHIME_SUBMIT_URL)")?;
        let reply = submit_text(&reqwest::Client::new(), url, text)
            .await
            .context("Submission failed")?;
        info!(message = %reply.message, "text submitted");
    }

    let shutdown = ShutdownCoordinator::new();
    let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
    let session = ConnectionSession::new(
        WsConnector::new(client.server_url.clone()).with_connect_timeout(client.connect_timeout()),
        client.reconnect_delay(),
        tx,
    );
    let mut controller = PlaybackController::new(CommandBackend::new(client.player.clone()));
    // starting the listener is the user's explicit go-ahead for audio
    controller.arm();

    info!(
        server_url = %client.server_url,
        reconnect_delay_ms = client.reconnect_delay_ms,
        connect_timeout_ms = client.connect_timeout_ms,
        player = %client.player.program,
        "chime listener starting"
    );
    let handles = vec![
        tokio::spawn(session.run(shutdown.token())),
        tokio::spawn(controller.run(rx, shutdown.token())),
    ];

    shutdown.wait_for_signal().await;
    shutdown.graceful_shutdown(handles, None).await;
    info!("Listener stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Listen(args) => listen(args).await,
    }
}
