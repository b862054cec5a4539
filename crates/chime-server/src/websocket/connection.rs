//! Server-side handle for one open WebSocket connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chime_core::ConnectionId;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a payload could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection was closed or its writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
}

/// One connected client as seen by the registry and the broadcaster.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Queue drained by the connection's socket writer.
    tx: mpsc::Sender<Arc<String>>,
    connected_at: Instant,
    open: AtomicBool,
    /// Whether any inbound frame arrived since the last heartbeat check.
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    /// Count of payloads that could not be queued.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create an open connection around its outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            open: AtomicBool::new(true),
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a text payload for the socket writer.
    pub fn send(&self, message: Arc<String>) -> Result<(), DeliveryError> {
        if !self.is_open() {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(message).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            }
        })
    }

    /// Whether the connection still accepts payloads.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Mark the connection closed. Returns `true` on the first call only.
    pub fn mark_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Payloads dropped because the connection was closed or backed up.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (pong or any other frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound frame, or since connect.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
