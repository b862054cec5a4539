//! Client error types.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the client side.
///
/// None of these is fatal to a running session: connection failures lead to
/// a scheduled reconnect and playback failures only reset the indicator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket handshake failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Server URL.
        url: String,
        /// Underlying failure.
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// The handshake did not complete within the connect timeout.
    #[error("timed out after {timeout:?} connecting to {url}")]
    ConnectTimeout {
        /// Server URL.
        url: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The transport reported an error on an open connection.
    #[error("transport error: {0}")]
    Transport(#[source] Box<tungstenite::Error>),
    /// The external player could not be started.
    #[error("failed to start player {program}: {source}")]
    Player {
        /// Player program.
        program: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The submission endpoint answered with a non-success status.
    #[error("submission rejected with status {status}: {message}")]
    Submit {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, if any.
        message: String,
    },
    /// The submission request itself failed.
    #[error("submission request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
