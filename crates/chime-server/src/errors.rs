//! Server error types.

use std::path::PathBuf;

use chime_core::UrlError;
use chime_settings::SettingsError;
use thiserror::Error;

/// Errors raised while starting or running the broadcast server.
///
/// Only [`ServerError::Watch`] and [`ServerError::Bind`] abort startup; every
/// other runtime failure is logged and absorbed where it happens.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The file watch could not be established.
    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        /// Path the watch was requested for.
        path: PathBuf,
        /// Underlying watcher failure.
        #[source]
        source: notify::Error,
    },
    /// A listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested socket address.
        addr: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A generator process could not be launched.
    #[error("failed to spawn generator {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Settings failed validation.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The artifact URL template could not be built.
    #[error("invalid artifact url: {0}")]
    Url(#[from] UrlError),
    /// The metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
