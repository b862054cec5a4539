//! # chime-client
//!
//! The listening side of chime: keeps one WebSocket connection to the
//! broadcast server alive and plays every notified URL from the start.
//!
//! - [`machine`]: connection session transition table
//! - [`session`]: async driver with a fixed reconnect delay
//! - [`transport`]: `tokio-tungstenite` connector behind a small trait
//! - [`playback`]: armed gate, single active stream, restart-from-zero
//! - [`backend`]: external player process backend
//! - [`submit`]: text submission to the HTTP collaborator

#![deny(unsafe_code)]

pub mod backend;
pub mod errors;
pub mod machine;
pub mod playback;
pub mod session;
pub mod submit;
pub mod transport;

pub use backend::CommandBackend;
pub use errors::{ClientError, Result};
pub use machine::{SessionEvent, SessionMachine, SessionState};
pub use playback::{
    AudioBackend, PlaybackController, PlaybackEvent, PlaybackEventKind, PlaybackState,
    PlaybackStatus, StreamEvents,
};
pub use session::{ConnectionSession, SessionStatus};
pub use submit::{SubmitReply, submit_text};
pub use transport::{Connector, Incoming, Transport, WsConnector};
