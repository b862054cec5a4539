//! # chime-core
//!
//! Vocabulary shared by the chime server and client:
//!
//! - [`ids`]: branded identifiers (`ConnectionId`, `StreamId`)
//! - [`notification`]: the artifact URL template and the payload pushed to clients
//! - [`logging`]: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod notification;

pub use ids::{ConnectionId, StreamId};
pub use notification::{ArtifactUrl, NotificationPayload, UrlError};
