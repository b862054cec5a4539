//! Async driver for the connection session.

use std::time::Duration;

use chime_core::NotificationPayload;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::machine::{Effect, SessionEvent, SessionMachine, SessionState, Step};
use crate::transport::{Connector, Incoming, Transport};

/// Published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Current state.
    pub state: SessionState,
    /// Connection attempts so far.
    pub attempts: u64,
    /// Transitions applied so far; increases with every publish.
    pub transitions: u64,
}

/// Owns one outbound connection at a time and keeps it alive forever.
///
/// Text frames are forwarded, in arrival order, to the notification channel.
/// Every failure leads back to `Connecting` after exactly one reconnect
/// delay. Only the cancellation token stops the loop.
pub struct ConnectionSession<C> {
    connector: C,
    reconnect_delay: Duration,
    notifications: mpsc::Sender<NotificationPayload>,
    status: watch::Sender<SessionStatus>,
    machine: SessionMachine,
    transitions: u64,
}

impl<C: Connector> ConnectionSession<C> {
    /// Create a session. Nothing happens until [`run`](Self::run).
    pub fn new(
        connector: C,
        reconnect_delay: Duration,
        notifications: mpsc::Sender<NotificationPayload>,
    ) -> Self {
        let machine = SessionMachine::new();
        let (status, _) = watch::channel(SessionStatus {
            state: machine.state(),
            attempts: machine.attempts(),
            transitions: 0,
        });
        Self {
            connector,
            reconnect_delay,
            notifications,
            status,
            machine,
            transitions: 0,
        }
    }

    /// Observe status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Connect, forward and reconnect until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(state = %self.machine.state(), "session starting");
        let mut effect = Some(Effect::Connect);

        while let Some(next) = effect {
            effect = match next {
                Effect::Connect => {
                    let attempt = tokio::select! {
                        () = cancel.cancelled() => break,
                        res = self.connector.connect() => res,
                    };
                    match attempt {
                        Ok(mut transport) => {
                            let _ = self.apply(SessionEvent::HandshakeSucceeded);
                            let outcome = tokio::select! {
                                () = cancel.cancelled() => break,
                                ev = self.pump(&mut transport) => ev,
                            };
                            self.apply(outcome)
                        }
                        Err(e) => {
                            warn!(error = %e, attempt = self.machine.attempts(), "connection attempt failed");
                            self.apply(SessionEvent::HandshakeFailed)
                        }
                    }
                }
                Effect::ScheduleReconnect => {
                    debug!(delay_ms = self.reconnect_delay.as_millis(), "reconnect scheduled");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                    self.apply(SessionEvent::ReconnectTimerFired)
                }
            };
        }
        info!(state = %self.machine.state(), "session stopped");
    }

    /// Forward frames until the connection ends; return how it ended.
    async fn pump(&self, transport: &mut C::Transport) -> SessionEvent {
        loop {
            match transport.recv().await {
                Incoming::Text(text) => {
                    debug!(url = %text, "notification received");
                    if self
                        .notifications
                        .send(NotificationPayload::from_wire(text))
                        .await
                        .is_err()
                    {
                        debug!("notification consumer gone, dropping");
                    }
                }
                Incoming::Ignored => {}
                Incoming::Closed => return SessionEvent::TransportClosed,
                Incoming::Failed(e) => {
                    warn!(error = %e, "connection error");
                    return SessionEvent::TransportErrored;
                }
            }
        }
    }

    /// Apply an event, publish the transition and return its effect.
    fn apply(&mut self, event: SessionEvent) -> Option<Effect> {
        let Some(Step { from, to, effect }) = self.machine.handle(event) else {
            debug!(?event, state = %self.machine.state(), "event ignored");
            return None;
        };
        self.transitions += 1;
        info!(%from, %to, "session state changed");
        let _ = self.status.send_replace(SessionStatus {
            state: to,
            attempts: self.machine.attempts(),
            transitions: self.transitions,
        });
        effect
    }
}
