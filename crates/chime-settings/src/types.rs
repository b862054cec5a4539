//! Settings types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChimeSettings {
    /// Broadcast server settings.
    pub server: ServerSettings,
    /// Listening client settings.
    pub client: ClientSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// An external program plus its leading arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed before any per-invocation argument.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a command from a program and arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Server network, watch target and collaborator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address for both listeners.
    pub host: String,
    /// WebSocket listener port.
    pub ws_port: u16,
    /// HTTP collaborator port (static artifact, submissions, health).
    pub http_port: u16,
    /// Host name clients use to reach the HTTP collaborator; goes into notification URLs.
    pub public_host: String,
    /// The artifact whose changes are broadcast.
    pub watch_file: PathBuf,
    /// Directory served statically. Defaults to the parent of `watch_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_dir: Option<PathBuf>,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without any inbound frame before a connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Outbound queue depth per connection.
    pub send_queue: usize,
    /// Generator launched for each text submission. The text is appended as the last argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<CommandSpec>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            ws_port: 9002,
            http_port: 9003,
            public_host: "localhost".to_string(),
            watch_file: PathBuf::from("public").join("audio.mp3"),
            public_dir: None,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_queue: 64,
            generator: None,
        }
    }
}

impl ServerSettings {
    /// File name of the watched artifact, as it appears in the served URL.
    pub fn artifact_name(&self) -> Option<&str> {
        self.watch_file.file_name().and_then(|n| n.to_str())
    }

    /// Directory served by the static content collaborator.
    pub fn resolved_public_dir(&self) -> PathBuf {
        if let Some(dir) = &self.public_dir {
            return dir.clone();
        }
        match self.watch_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Heartbeat ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.artifact_name().is_none() {
            return Err(SettingsError::invalid(
                "watch_file",
                format!("{} has no file name", self.watch_file.display()),
            ));
        }
        if self.ws_port != 0 && self.ws_port == self.http_port {
            return Err(SettingsError::invalid(
                "ws_port",
                format!("ws_port and http_port are both {}", self.ws_port),
            ));
        }
        if self.public_host.trim().is_empty() {
            return Err(SettingsError::invalid("public_host", "must not be empty"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SettingsError::invalid("heartbeat_interval_secs", "must be at least 1"));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_interval_secs {
            return Err(SettingsError::invalid(
                "heartbeat_timeout_secs",
                "must not be shorter than heartbeat_interval_secs",
            ));
        }
        if self.send_queue == 0 {
            return Err(SettingsError::invalid("send_queue", "must be at least 1"));
        }
        Ok(())
    }
}

/// Listening client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket URL of the broadcast server.
    pub server_url: String,
    /// Submission endpoint used by `listen --submit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    /// Fixed delay before every reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Budget for one handshake, TCP connect included, in milliseconds.
    pub connect_timeout_ms: u64,
    /// External player invoked with the artifact URL as the last argument.
    pub player: CommandSpec,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:9002".to_string(),
            submit_url: None,
            reconnect_delay_ms: 3000,
            connect_timeout_ms: 5000,
            player: CommandSpec::new("ffplay", ["-nodisp", "-autoexit", "-loglevel", "error"]),
        }
    }
}

impl ClientSettings {
    /// Reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Handshake budget as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level or filter directive; `RUST_LOG` overrides it.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_name_from_watch_file() {
        let s = ServerSettings::default();
        assert_eq!(s.artifact_name(), Some("audio.mp3"));
    }

    #[test]
    fn public_dir_defaults_to_watch_parent() {
        let s = ServerSettings::default();
        assert_eq!(s.resolved_public_dir(), PathBuf::from("public"));
    }

    #[test]
    fn public_dir_for_bare_file_name_is_cwd() {
        let s = ServerSettings {
            watch_file: PathBuf::from("audio.mp3"),
            ..ServerSettings::default()
        };
        assert_eq!(s.resolved_public_dir(), PathBuf::from("."));
    }

    #[test]
    fn explicit_public_dir_wins() {
        let s = ServerSettings {
            public_dir: Some(PathBuf::from("/srv/www")),
            ..ServerSettings::default()
        };
        assert_eq!(s.resolved_public_dir(), PathBuf::from("/srv/www"));
    }

    #[test]
    fn defaults_validate() {
        ServerSettings::default().validate().unwrap();
    }

    #[test]
    fn colliding_ports_rejected() {
        let s = ServerSettings {
            ws_port: 8000,
            http_port: 8000,
            ..ServerSettings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "ws_port", .. })
        ));
    }

    #[test]
    fn auto_assigned_ports_may_both_be_zero() {
        let s = ServerSettings {
            ws_port: 0,
            http_port: 0,
            ..ServerSettings::default()
        };
        s.validate().unwrap();
    }

    #[test]
    fn watch_file_without_name_rejected() {
        let s = ServerSettings {
            watch_file: PathBuf::from("/"),
            ..ServerSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn heartbeat_timeout_shorter_than_interval_rejected() {
        let s = ServerSettings {
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 10,
            ..ServerSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn reconnect_delay_duration() {
        assert_eq!(
            ClientSettings::default().reconnect_delay(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn connect_timeout_duration() {
        let s = ClientSettings::default();
        assert_eq!(s.connect_timeout(), Duration::from_secs(5));
        let s: ClientSettings = serde_json::from_str(r#"{"connectTimeoutMs":750}"#).unwrap();
        assert_eq!(s.connect_timeout(), Duration::from_millis(750));
        assert_eq!(s.reconnect_delay_ms, 3000);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_value(ChimeSettings::default()).unwrap();
        assert_eq!(json["server"]["wsPort"], 9002);
        assert_eq!(json["client"]["reconnectDelayMs"], 3000);
        assert!(json["server"].get("generator").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ChimeSettings =
            serde_json::from_str(r#"{"server":{"httpPort":7000}}"#).unwrap();
        assert_eq!(s.server.http_port, 7000);
        assert_eq!(s.server.ws_port, 9002);
        assert_eq!(s.client.reconnect_delay_ms, 3000);
    }

    #[test]
    fn generator_spec_parses() {
        let s: ServerSettings = serde_json::from_str(
            r#"{"generator":{"program":"python","args":["bob-llm.py","127.0.0.1","10000"]}}"#,
        )
        .unwrap();
        let generator = s.generator.unwrap();
        assert_eq!(generator.program, "python");
        assert_eq!(generator.args.len(), 3);
    }
}
