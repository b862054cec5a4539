//! The notification pushed to every client when the artifact changes.
//!
//! On the wire a notification is a single text frame holding the absolute
//! URL of the artifact, nothing else.

use std::fmt;
use std::net::Ipv6Addr;

use thiserror::Error;

/// Invalid components for an artifact URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// Host was empty.
    #[error("artifact host must not be empty")]
    EmptyHost,
    /// Host is neither a name, an IPv4 address nor an IPv6 address.
    #[error("artifact host {0:?} is not a valid URL host")]
    InvalidHost(String),
    /// Artifact name was empty.
    #[error("artifact name must not be empty")]
    EmptyName,
    /// Artifact name contained characters that cannot appear in a URL path segment.
    #[error("artifact name {0:?} is not a plain file name")]
    InvalidName(String),
}

/// Template for the URL the static content server exposes the artifact at:
/// `http://<host>:<port>/<artifact-name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUrl {
    host: String,
    port: u16,
    artifact_name: String,
}

impl ArtifactUrl {
    /// Validate and build the template.
    ///
    /// IPv6 hosts are accepted bare (`::1`) or bracketed (`[::1]`) and are
    /// always bracketed in the URL.
    pub fn new(host: impl Into<String>, port: u16, artifact_name: impl Into<String>) -> Result<Self, UrlError> {
        let host = url_host(host.into())?;
        let artifact_name = artifact_name.into();
        if artifact_name.is_empty() {
            return Err(UrlError::EmptyName);
        }
        if artifact_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '?' || c == '#' || c.is_whitespace())
        {
            return Err(UrlError::InvalidName(artifact_name));
        }
        Ok(Self {
            host,
            port,
            artifact_name,
        })
    }

    /// Host as placed in the URL, brackets included for IPv6.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// HTTP port of the static content server.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// File name of the artifact.
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Build a fresh payload. Stateless; called once per broadcast.
    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload(format!(
            "http://{}:{}/{}",
            self.host, self.port, self.artifact_name
        ))
    }
}

fn url_host(host: String) -> Result<String, UrlError> {
    if host.trim().is_empty() {
        return Err(UrlError::EmptyHost);
    }
    if !host.contains(':') {
        if host.chars().any(|c| matches!(c, '/' | '?' | '#' | '@' | '[' | ']') || c.is_whitespace()) {
            return Err(UrlError::InvalidHost(host));
        }
        return Ok(host);
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(&host);
    match bare.parse::<Ipv6Addr>() {
        Ok(addr) => Ok(format!("[{addr}]")),
        Err(_) => Err(UrlError::InvalidHost(host)),
    }
}

/// Absolute retrieval URL of the updated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationPayload(String);

impl NotificationPayload {
    /// Wrap a URL received off the wire.
    pub fn from_wire(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The URL as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the URL string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NotificationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NotificationPayload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
