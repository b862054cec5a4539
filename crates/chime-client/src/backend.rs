//! Audio backend that hands each stream to an external player process.
//!
//! The player is started with the URL as its last argument and fetches the
//! artifact itself. Stopping kills the process, so the next stream always
//! starts from the beginning of the file.

use std::process::Stdio;

use async_trait::async_trait;
use chime_core::StreamId;
use chime_settings::CommandSpec;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ClientError, Result};
use crate::playback::{AudioBackend, StreamEvents};

struct ActivePlayer {
    stream: StreamId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Plays streams through a configurable command such as `ffplay`.
pub struct CommandBackend {
    command: CommandSpec,
    active: Option<ActivePlayer>,
}

impl CommandBackend {
    /// Backend for the given player command.
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            active: None,
        }
    }

    /// Player command.
    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    /// Whether a player process is still running.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.task.is_finished())
    }
}

#[async_trait]
impl AudioBackend for CommandBackend {
    async fn play(&mut self, stream: StreamId, url: &str, events: StreamEvents) -> Result<()> {
        self.stop_and_rewind().await;

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClientError::Player {
                program: self.command.program.clone(),
                source,
            })?;

        let pid = child.id();
        info!(%stream, pid = ?pid, program = %self.command.program, "player started");
        events.started();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => {
                        debug!(%stream, "player finished");
                        events.ended();
                    }
                    Ok(s) => events.failed(format!("player exited with {s}")),
                    Err(e) => events.failed(format!("failed to wait for player: {e}")),
                },
                () = stop.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!(%stream, error = %e, "failed to kill player");
                    }
                    events.paused();
                }
            }
        });

        self.active = Some(ActivePlayer {
            stream,
            cancel,
            task,
        });
        Ok(())
    }

    async fn stop_and_rewind(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            warn!(stream = %active.stream, error = %e, "player task failed");
        }
        debug!(stream = %active.stream, "player stopped");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::playback::{PlaybackEvent, PlaybackEventKind};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn sink(n: u64) -> (StreamEvents, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut id = StreamId::default();
        for _ in 0..n {
            id = id.next();
        }
        (StreamEvents::new(id, tx), rx)
    }

    async fn next_kind(rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> PlaybackEventKind {
        timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap().kind
    }

    #[tokio::test]
    async fn successful_player_reports_start_then_end() {
        let mut backend = CommandBackend::new(CommandSpec::new("true", Vec::<String>::new()));
        let (events, mut rx) = sink(1);
        backend.play(events.stream(), "http://h:1/a.mp3", events).await.unwrap();

        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Started);
        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Ended);
    }

    #[tokio::test]
    async fn failing_player_reports_failure() {
        let mut backend = CommandBackend::new(CommandSpec::new("false", Vec::<String>::new()));
        let (events, mut rx) = sink(1);
        backend.play(events.stream(), "http://h:1/a.mp3", events).await.unwrap();

        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Started);
        assert!(matches!(next_kind(&mut rx).await, PlaybackEventKind::Failed(_)));
    }

    #[tokio::test]
    async fn url_is_the_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("url.txt");
        let mut backend = CommandBackend::new(CommandSpec::new(
            "sh",
            ["-c".to_string(), format!("printf '%s' \"$0\" > {}", out.display())],
        ));
        let (events, mut rx) = sink(1);
        backend.play(events.stream(), "http://h:1/a.mp3", events).await.unwrap();
        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Started);
        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Ended);

        assert_eq!(std::fs::read_to_string(out).unwrap(), "http://h:1/a.mp3");
    }

    #[tokio::test]
    async fn stop_kills_running_player() {
        let mut backend = CommandBackend::new(CommandSpec::new("sh", ["-c", "sleep 30"]));
        let (events, mut rx) = sink(1);
        backend.play(events.stream(), "http://h:1/a.mp3", events).await.unwrap();
        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Started);
        assert!(backend.is_active());

        timeout(TIMEOUT, backend.stop_and_rewind()).await.unwrap();
        assert!(!backend.is_active());
        assert_eq!(next_kind(&mut rx).await, PlaybackEventKind::Paused);
    }

    #[tokio::test]
    async fn new_stream_replaces_running_player() {
        let mut backend = CommandBackend::new(CommandSpec::new("sh", ["-c", "sleep 30"]));
        let (first, mut first_rx) = sink(1);
        backend.play(first.stream(), "http://h:1/a.mp3", first).await.unwrap();
        let (second, mut second_rx) = sink(2);
        backend.play(second.stream(), "http://h:1/a.mp3", second).await.unwrap();

        assert_eq!(next_kind(&mut first_rx).await, PlaybackEventKind::Started);
        assert_eq!(next_kind(&mut first_rx).await, PlaybackEventKind::Paused);
        let started = timeout(TIMEOUT, second_rx.recv()).await.unwrap().unwrap();
        assert_eq!(started.stream.get(), 2);
        assert_eq!(started.kind, PlaybackEventKind::Started);

        backend.stop_and_rewind().await;
    }

    #[tokio::test]
    async fn missing_player_is_an_error() {
        let mut backend =
            CommandBackend::new(CommandSpec::new("/definitely/not/a/player", Vec::<String>::new()));
        let (events, _rx) = sink(1);
        let err = backend.play(events.stream(), "http://h:1/a.mp3", events).await.unwrap_err();
        assert!(matches!(err, ClientError::Player { .. }));
        assert!(!backend.is_active());
    }
}
