//! Connection session transitions, free of I/O.
//!
//! ```text
//! Connecting --handshake ok-----> Connected
//! Connecting --handshake failed-> Errored      (schedule reconnect)
//! Connected  --closed-----------> Disconnected (schedule reconnect)
//! Connected  --error------------> Errored      (schedule reconnect)
//! Disconnected|Errored --timer--> Connecting   (connect)
//! ```
//!
//! The reconnect delay is fixed and retries are unbounded. A timer firing
//! while no reconnect is pending is stale and ignored, so one failure can
//! never produce two connection attempts.

use std::fmt;

use serde::Serialize;

/// Externally visible session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// A connection attempt is in progress.
    Connecting,
    /// The handshake succeeded; notifications flow.
    Connected,
    /// The connection closed without an explicit error.
    Disconnected,
    /// The transport surfaced an error.
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Inputs to the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The handshake completed.
    HandshakeSucceeded,
    /// The handshake failed.
    HandshakeFailed,
    /// The open connection closed, by the peer or the network.
    TransportClosed,
    /// The open connection reported an error.
    TransportErrored,
    /// The reconnect delay elapsed.
    ReconnectTimerFired,
}

/// Work the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start a connection attempt now.
    Connect,
    /// Fire [`SessionEvent::ReconnectTimerFired`] after the reconnect delay.
    ScheduleReconnect,
}

/// An applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// State before the event.
    pub from: SessionState,
    /// State after the event.
    pub to: SessionState,
    /// Follow-up work, if any.
    pub effect: Option<Effect>,
}

/// The session transition table plus the pending-reconnect guard.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    pending_reconnect: bool,
    attempts: u64,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    /// A machine in `Connecting`, about to make its first attempt.
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            pending_reconnect: false,
            attempts: 1,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a reconnect timer is outstanding.
    pub fn pending_reconnect(&self) -> bool {
        self.pending_reconnect
    }

    /// Connection attempts started so far, including the first.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Apply an event. Returns `None` when the event does not apply in the
    /// current state (for example a stale timer).
    pub fn handle(&mut self, event: SessionEvent) -> Option<Step> {
        use SessionEvent as E;
        use SessionState as S;

        let from = self.state;
        let (to, effect) = match (from, event) {
            (S::Connecting, E::HandshakeSucceeded) => (S::Connected, None),
            (S::Connecting, E::HandshakeFailed) | (S::Connected, E::TransportErrored) => {
                (S::Errored, self.schedule())
            }
            (S::Connected, E::TransportClosed) => (S::Disconnected, self.schedule()),
            (S::Disconnected | S::Errored, E::ReconnectTimerFired) if self.pending_reconnect => {
                self.pending_reconnect = false;
                self.attempts += 1;
                (S::Connecting, Some(Effect::Connect))
            }
            _ => return None,
        };
        self.state = to;
        Some(Step { from, to, effect })
    }

    fn schedule(&mut self) -> Option<Effect> {
        if self.pending_reconnect {
            None
        } else {
            self.pending_reconnect = true;
            Some(Effect::ScheduleReconnect)
        }
    }
}
