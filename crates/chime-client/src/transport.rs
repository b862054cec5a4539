//! The session's view of the wire: connect, then read frames.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::errors::{ClientError, Result};

/// What one read from an open connection produced.
#[derive(Debug)]
pub enum Incoming {
    /// A text frame: one notification.
    Text(String),
    /// A frame the session does not care about (binary, ping, pong).
    Ignored,
    /// The connection closed, by close frame or by the network.
    Closed,
    /// The transport reported an explicit error.
    Failed(ClientError),
}

/// An open connection.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next frame.
    async fn recv(&mut self) -> Incoming;
}

/// Opens connections to the broadcast server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection type produced on success.
    type Transport: Transport;

    /// Perform one handshake.
    async fn connect(&self) -> Result<Self::Transport>;
}

/// Handshake budget when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector for a `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound each handshake, TCP connect included, to `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Handshake budget.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport> {
        let handshake = connect_async(self.url.as_str());
        let (stream, resp) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                url: self.url.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|e| ClientError::Connect {
                url: self.url.clone(),
                source: Box::new(e),
            })?;
        debug!(url = %self.url, status = %resp.status(), "websocket handshake complete");
        Ok(WsTransport { stream })
    }
}

/// An open `tokio-tungstenite` connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Incoming {
        match self.stream.next().await {
            None => Incoming::Closed,
            Some(Ok(msg)) => classify(msg),
            Some(Err(e)) => classify_error(e),
        }
    }
}

fn classify(msg: Message) -> Incoming {
    match msg {
        Message::Text(text) => Incoming::Text(text.to_string()),
        Message::Close(frame) => {
            debug!(?frame, "server closed connection");
            Incoming::Closed
        }
        other => {
            trace!(len = other.len(), "ignoring non-text frame");
            Incoming::Ignored
        }
    }
}

fn classify_error(err: tungstenite::Error) -> Incoming {
    use tungstenite::error::ProtocolError;
    match err {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            Incoming::Closed
        }
        other => Incoming::Failed(ClientError::Transport(Box::new(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_become_notifications() {
        match classify(Message::text("http://h:1/a.mp3")) {
            Incoming::Text(t) => assert_eq!(t, "http://h:1/a.mp3"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn control_and_binary_frames_are_ignored() {
        assert!(matches!(classify(Message::Ping(Vec::new().into())), Incoming::Ignored));
        assert!(matches!(classify(Message::Pong(Vec::new().into())), Incoming::Ignored));
        assert!(matches!(classify(Message::binary(vec![1, 2, 3])), Incoming::Ignored));
    }

    #[test]
    fn close_frame_is_a_close() {
        assert!(matches!(classify(Message::Close(None)), Incoming::Closed));
    }

    #[test]
    fn reset_without_close_is_a_close() {
        let e = tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        );
        assert!(matches!(classify_error(e), Incoming::Closed));
    }

    #[test]
    fn other_errors_are_failures() {
        let e = tungstenite::Error::Io(std::io::Error::other("boom"));
        assert!(matches!(classify_error(e), Incoming::Failed(_)));
    }

    #[tokio::test]
    async fn connect_to_nothing_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let connector = WsConnector::new(format!("ws://{addr}/"));
        assert!(matches!(
            connector.connect().await,
            Err(ClientError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn silent_listener_times_out() {
        // accepts the TCP connection but never answers the upgrade
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let connector =
            WsConnector::new(format!("ws://{addr}/")).with_connect_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        match connector.connect().await {
            Err(ClientError::ConnectTimeout { url, timeout }) => {
                assert_eq!(url, format!("ws://{addr}/"));
                assert_eq!(timeout, Duration::from_millis(200));
            }
            Err(other) => panic!("unexpected {other}"),
            Ok(_) => panic!("handshake should not complete"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        held.abort();
    }

    #[test]
    fn default_connect_timeout() {
        let connector = WsConnector::new("ws://localhost:9002");
        assert_eq!(connector.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(connector.url(), "ws://localhost:9002");
    }
}
