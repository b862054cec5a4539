//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why `~/.chime/settings.json` (or `--config`) could not become usable settings.
///
/// A missing file is not an error; it yields defaults.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or a key has the wrong type (e.g. `"wsPort": "x"`).
    #[error("malformed settings in {}: {source}", path.display())]
    Malformed {
        /// Settings file.
        path: PathBuf,
        /// Parser or type error.
        #[source]
        source: serde_json::Error,
    },
    /// The server settings parsed but cannot run together.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending setting, in snake case.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
