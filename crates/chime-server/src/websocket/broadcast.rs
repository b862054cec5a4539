//! Fan-out of the artifact URL to every registered connection.

use std::sync::Arc;

use chime_core::ArtifactUrl;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::ClientRegistry;
use crate::metrics::{
    BROADCAST_DELIVERIES_TOTAL, BROADCAST_SEND_FAILURES_TOTAL, BROADCASTS_TOTAL,
    FILE_CHANGES_TOTAL,
};
use crate::watcher::{ChangeEvent, FileChangeDetector};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Payloads queued successfully.
    pub delivered: usize,
    /// Recipients skipped because they were closed or backed up.
    pub failed: usize,
}

/// Turns change events into notifications for the registry's members.
pub struct BroadcastEngine {
    registry: Arc<ClientRegistry>,
    url: ArtifactUrl,
}

impl BroadcastEngine {
    /// Create an engine publishing `url` to members of `registry`.
    pub fn new(registry: Arc<ClientRegistry>, url: ArtifactUrl) -> Self {
        Self { registry, url }
    }

    /// The URL template notifications are built from.
    pub fn url(&self) -> &ArtifactUrl {
        &self.url
    }

    /// Deliver one fresh payload to every member enumerated right now.
    ///
    /// Per-recipient failures are logged and counted; they never stop the
    /// fan-out and are never retried.
    pub fn on_file_changed(&self, event: &ChangeEvent) -> BroadcastReport {
        counter!(FILE_CHANGES_TOTAL).increment(1);
        let payload = Arc::new(self.url.payload().into_string());
        let targets = self.registry.enumerate();
        let mut report = BroadcastReport {
            recipients: targets.len(),
            ..BroadcastReport::default()
        };

        for conn in &targets {
            match conn.send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(conn_id = %conn.id, error = %e, "failed to deliver notification");
                }
            }
        }

        counter!(BROADCASTS_TOTAL).increment(1);
        counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        counter!(BROADCAST_SEND_FAILURES_TOTAL).increment(report.failed as u64);
        info!(
            kind = ?event.kind,
            url = %payload,
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast artifact change"
        );
        report
    }

    /// Broadcast every change the detector reports until `shutdown` fires or
    /// the detector ends.
    pub async fn run(self: Arc<Self>, mut detector: FileChangeDetector, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("broadcast loop cancelled");
                    break;
                }
                event = detector.next_event() => {
                    let Some(event) = event else {
                        warn!(path = %detector.target().display(), "file watcher stopped");
                        break;
                    };
                    let _ = self.on_file_changed(&event);
                }
            }
        }
    }
}
