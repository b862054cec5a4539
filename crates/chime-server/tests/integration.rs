//! End-to-end tests against a real server using a real WebSocket client.

use std::path::Path;
use std::time::Duration;

use chime_server::{ChangeEvent, ChangeKind, ChimeServer, RunningServer};
use chime_settings::ServerSettings;
use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Harness {
    dir: TempDir,
    server: ChimeServer,
    running: RunningServer,
}

impl Harness {
    async fn boot() -> Self {
        Self::boot_with(|_| {}).await
    }

    async fn boot_with(tweak: impl FnOnce(&mut ServerSettings)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ServerSettings {
            host: "127.0.0.1".into(),
            ws_port: 0,
            http_port: 0,
            public_host: "127.0.0.1".into(),
            watch_file: dir.path().join("audio.mp3"),
            ..ServerSettings::default()
        };
        tweak(&mut settings);
        let server = ChimeServer::new(settings, None).unwrap();
        let running = server.listen().await.unwrap();
        Self {
            dir,
            server,
            running,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.running.ws_addr)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.running.http_addr)
    }

    fn expected_payload(&self) -> String {
        format!("http://127.0.0.1:{}/audio.mp3", self.running.http_addr.port())
    }

    fn watch_file(&self) -> &Path {
        &self.server.settings().watch_file
    }

    async fn connect(&self) -> WsStream {
        let (ws, _) = timeout(TIMEOUT, connect_async(self.ws_url()))
            .await
            .expect("timeout connecting")
            .expect("connect failed");
        ws
    }

    async fn wait_for_clients(&self, n: usize) {
        timeout(TIMEOUT, async {
            while self.server.registry().len() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {n} clients, registry has {}",
                self.server.registry().len()
            )
        });
    }

    async fn stop(self) {
        let _keep = self.dir;
        self.server
            .shutdown()
            .graceful_shutdown(self.running.into_handles(), Some(TIMEOUT))
            .await;
    }
}

/// Next text frame, skipping control frames.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn broadcast_survives_one_closed_recipient() {
    let h = Harness::boot().await;
    let mut a = h.connect().await;
    let mut b = h.connect().await;
    let mut c = h.connect().await;
    h.wait_for_clients(3).await;

    // force-close one client right before the broadcast
    b.close(None).await.unwrap();
    drop(b);

    let report = h
        .running
        .engine()
        .on_file_changed(&ChangeEvent::new(ChangeKind::Modified, h.watch_file()));
    assert_eq!(report.delivered + report.failed, report.recipients);

    assert_eq!(read_text(&mut a).await, h.expected_payload());
    assert_eq!(read_text(&mut c).await, h.expected_payload());
    h.stop().await;
}

#[tokio::test]
async fn registry_tracks_open_connections() {
    let h = Harness::boot().await;
    assert!(h.server.registry().is_empty());

    let mut a = h.connect().await;
    let b = h.connect().await;
    h.wait_for_clients(2).await;

    a.close(None).await.unwrap();
    h.wait_for_clients(1).await;

    // abrupt drop without a close frame
    drop(b);
    h.wait_for_clients(0).await;

    let _c = h.connect().await;
    h.wait_for_clients(1).await;
    h.stop().await;
}

#[tokio::test]
async fn file_write_delivers_artifact_url() {
    let h = Harness::boot().await;
    let mut a = h.connect().await;
    let mut b = h.connect().await;
    h.wait_for_clients(2).await;

    std::fs::write(h.watch_file(), b"ID3 new speech").unwrap();

    assert_eq!(read_text(&mut a).await, h.expected_payload());
    assert_eq!(read_text(&mut b).await, h.expected_payload());
    h.stop().await;
}

#[tokio::test]
async fn inbound_messages_are_ignored() {
    let h = Harness::boot().await;
    let mut a = h.connect().await;
    h.wait_for_clients(1).await;

    a.send(Message::text("hello server")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.server.registry().len(), 1);

    let _ = h
        .running
        .engine()
        .on_file_changed(&ChangeEvent::new(ChangeKind::Renamed, h.watch_file()));
    assert_eq!(read_text(&mut a).await, h.expected_payload());
    h.stop().await;
}

#[tokio::test]
async fn root_path_accepts_upgrades() {
    let h = Harness::boot().await;
    let url = format!("ws://{}/", h.running.ws_addr);
    let (_ws, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    h.wait_for_clients(1).await;
    h.stop().await;
}

#[tokio::test]
async fn shutdown_closes_clients() {
    let h = Harness::boot().await;
    let mut a = h.connect().await;
    h.wait_for_clients(1).await;

    h.server.shutdown().shutdown();

    let closed = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    h.wait_for_clients(0).await;
    h.stop().await;
}

#[tokio::test]
async fn unresponsive_client_is_dropped_after_heartbeat_timeout() {
    let h = Harness::boot_with(|s| {
        s.heartbeat_interval_secs = 1;
        s.heartbeat_timeout_secs = 1;
    })
    .await;
    let expected = h.expected_payload();

    // never read, so its pings go unanswered
    let mut silent = h.connect().await;
    let mut responsive = h.connect().await;
    h.wait_for_clients(2).await;

    // polling answers pings automatically
    let reader = tokio::spawn(async move {
        let mut texts = Vec::new();
        while let Some(Ok(msg)) = responsive.next().await {
            if let Message::Text(text) = msg {
                texts.push(text.to_string());
            }
        }
        texts
    });

    h.wait_for_clients(1).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.server.registry().len(), 1);

    let closed = timeout(TIMEOUT, async {
        loop {
            match silent.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    let report = h
        .running
        .engine()
        .on_file_changed(&ChangeEvent::new(ChangeKind::Modified, h.watch_file()));
    assert_eq!(report.recipients, 1);
    assert_eq!(report.delivered, 1);

    h.stop().await;
    let texts = timeout(TIMEOUT, reader).await.unwrap().unwrap();
    assert_eq!(texts, vec![expected]);
}

#[tokio::test]
async fn http_collaborator_endpoints() {
    let h = Harness::boot().await;
    let client = reqwest::Client::new();
    let _ws = h.connect().await;
    h.wait_for_clients(1).await;

    let health: serde_json::Value = client
        .get(h.http_url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);

    let resp = client
        .post(h.http_url("/submit"))
        .json(&serde_json::json!({"text": "say this"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let resp = client
        .post(h.http_url("/submit"))
        .json(&serde_json::json!({"text": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    std::fs::write(h.watch_file(), b"ID3 bytes").unwrap();
    let bytes = client
        .get(h.expected_payload())
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ID3 bytes");
    h.stop().await;
}
