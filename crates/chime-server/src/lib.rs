//! # chime-server
//!
//! Watches one audio artifact on disk and pushes its retrieval URL to every
//! connected WebSocket client whenever it changes.
//!
//! - [`watcher`]: file change detection for a single path
//! - [`websocket`]: client registry, per-connection sessions, heartbeat and fan-out
//! - [`http`]: static artifact serving, text submissions, health and metrics
//! - [`supervisor`]: fire-and-forget generator processes launched by submissions
//! - [`server`]: wires the pieces to two listeners

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod supervisor;
pub mod watcher;
pub mod websocket;

pub use errors::{Result, ServerError};
pub use server::{ChimeServer, RunningServer};
pub use shutdown::ShutdownCoordinator;
pub use watcher::{ChangeEvent, ChangeKind, FileChangeDetector};
pub use websocket::broadcast::{BroadcastEngine, BroadcastReport};
pub use websocket::registry::ClientRegistry;
