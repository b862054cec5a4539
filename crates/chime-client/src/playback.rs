//! Turns notifications into audio playback, one stream at a time.
//!
//! Nothing plays until the controller is armed by an explicit user action.
//! Every armed notification stops and rewinds whatever is playing and
//! starts the notified URL from the beginning, even when it is the same URL
//! again. Backend events are tagged with the stream they belong to and
//! events for a replaced stream are dropped.

use async_trait::async_trait;
use chime_core::{NotificationPayload, StreamId};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;

/// Visible playback indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing audible.
    #[default]
    Idle,
    /// A stream is playing.
    Playing,
}

/// Published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStatus {
    /// Playing or idle.
    pub state: PlaybackState,
    /// Whether the user has started the session.
    pub armed: bool,
    /// URL of the most recent playback request.
    pub last_played_url: Option<String>,
}

/// What a backend observed for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEventKind {
    /// Audio started.
    Started,
    /// Audio reached its end.
    Ended,
    /// Audio was paused or stopped.
    Paused,
    /// Loading or decoding failed.
    Failed(String),
}

/// A backend observation for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    /// Stream the event belongs to.
    pub stream: StreamId,
    /// What happened.
    pub kind: PlaybackEventKind,
}

/// Event sink handed to a backend for one stream.
#[derive(Debug, Clone)]
pub struct StreamEvents {
    stream: StreamId,
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl StreamEvents {
    pub(crate) fn new(stream: StreamId, tx: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self { stream, tx }
    }

    /// The stream these events are tagged with.
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Report that audio started.
    pub fn started(&self) {
        self.emit(PlaybackEventKind::Started);
    }

    /// Report that audio reached its end.
    pub fn ended(&self) {
        self.emit(PlaybackEventKind::Ended);
    }

    /// Report that audio was paused or stopped.
    pub fn paused(&self) {
        self.emit(PlaybackEventKind::Paused);
    }

    /// Report a load or decode failure.
    pub fn failed(&self, reason: impl Into<String>) {
        self.emit(PlaybackEventKind::Failed(reason.into()));
    }

    fn emit(&self, kind: PlaybackEventKind) {
        // the controller may already be gone at shutdown
        let _ = self.tx.send(PlaybackEvent {
            stream: self.stream,
            kind,
        });
    }
}

/// Something that can play a URL.
#[async_trait]
pub trait AudioBackend: Send {
    /// Begin loading and playing `url` as `stream`. Must not wait for the
    /// audio to finish; progress is reported through `events`.
    async fn play(&mut self, stream: StreamId, url: &str, events: StreamEvents) -> Result<()>;

    /// Stop the active stream, if any, and rewind it to the start.
    async fn stop_and_rewind(&mut self);
}

/// The playback state machine around an [`AudioBackend`].
pub struct PlaybackController<B> {
    backend: B,
    status: watch::Sender<PlaybackStatus>,
    active: Option<StreamId>,
    last_stream: StreamId,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl<B: AudioBackend> PlaybackController<B> {
    /// Create an unarmed, idle controller.
    pub fn new(backend: B) -> Self {
        let (status, _) = watch::channel(PlaybackStatus::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            status,
            active: None,
            last_stream: StreamId::default(),
            events_tx,
            events_rx,
        }
    }

    /// Observe status changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    /// Current status.
    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Record the user's explicit start. One-way; later calls do nothing.
    pub fn arm(&mut self) {
        let changed = self.status.send_if_modified(|s| {
            let was = s.armed;
            s.armed = true;
            !was
        });
        if changed {
            info!("playback armed");
        }
    }

    /// Whether playback has been armed.
    pub fn is_armed(&self) -> bool {
        self.status.borrow().armed
    }

    /// Handle one notification. Returns `false` if it was discarded because
    /// the controller is not armed.
    pub async fn on_notification(&mut self, url: &NotificationPayload) -> bool {
        if !self.is_armed() {
            debug!(url = %url, "not armed, discarding notification");
            return false;
        }

        if let Some(previous) = self.active.take() {
            debug!(stream = %previous, "stopping active stream");
            self.backend.stop_and_rewind().await;
            self.set_state(PlaybackState::Idle);
        }

        self.last_stream = self.last_stream.next();
        let stream = self.last_stream;
        self.active = Some(stream);
        self.status
            .send_modify(|s| s.last_played_url = Some(url.as_str().to_owned()));
        info!(%stream, url = %url, "playing notification");

        let events = StreamEvents::new(stream, self.events_tx.clone());
        if let Err(e) = self.backend.play(stream, url.as_str(), events).await {
            warn!(%stream, error = %e, "playback failed to start");
            self.on_event(PlaybackEvent {
                stream,
                kind: PlaybackEventKind::Failed(e.to_string()),
            });
        }
        true
    }

    /// Apply a backend event. Events for anything but the active stream are
    /// ignored.
    pub fn on_event(&mut self, event: PlaybackEvent) {
        if self.active != Some(event.stream) {
            debug!(stream = %event.stream, kind = ?event.kind, "ignoring event for stale stream");
            return;
        }
        match event.kind {
            PlaybackEventKind::Started => self.set_state(PlaybackState::Playing),
            PlaybackEventKind::Ended | PlaybackEventKind::Paused => {
                self.set_state(PlaybackState::Idle);
            }
            PlaybackEventKind::Failed(reason) => {
                warn!(stream = %event.stream, reason = %reason, "playback error");
                self.set_state(PlaybackState::Idle);
            }
        }
    }

    /// Process notifications and backend events until `cancel` fires or the
    /// notification source closes. Stops any active stream on the way out.
    pub async fn run(
        mut self,
        mut notifications: mpsc::Receiver<NotificationPayload>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = notifications.recv() => match next {
                    Some(url) => {
                        let _ = self.on_notification(&url).await;
                    }
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
            }
        }
        if self.active.take().is_some() {
            self.backend.stop_and_rewind().await;
            self.set_state(PlaybackState::Idle);
        }
    }

    /// Drain backend events that are already queued.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.on_event(event);
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        let changed = self.status.send_if_modified(|s| {
            let changed = s.state != state;
            s.state = state;
            changed
        });
        if changed {
            info!(state = ?state, "playback state changed");
        }
    }
}
