//! Process-wide shutdown signalling.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long tracked tasks get to finish before shutdown gives up on them.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the root cancellation token every long-running task watches.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every holder of the token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve on Ctrl-C or on an earlier `shutdown()`, whichever comes first.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for ctrl-c");
                    self.token.cancelled().await;
                } else {
                    info!("ctrl-c received, shutting down");
                }
            }
            () = self.token.cancelled() => {}
        }
        self.shutdown();
    }

    /// Signal shutdown and wait up to `timeout` for `handles` to finish.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = handles.len(), timeout_secs = timeout.as_secs(), "waiting for tasks");

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(?timeout, "shutdown timed out, some tasks may still be running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let a = coord.token();
        let b = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[tokio::test]
    async fn wait_for_signal_returns_after_manual_shutdown() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        tokio::time::timeout(Duration::from_secs(1), coord.wait_for_signal())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
            let _ = tx.send(());
        });
        coord.graceful_shutdown(vec![handle], Some(Duration::from_secs(5))).await;
        assert!(rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_gives_up_after_timeout() {
        let coord = ShutdownCoordinator::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let start = tokio::time::Instant::now();
        coord.graceful_shutdown(vec![stuck], Some(Duration::from_secs(2))).await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
