//! Background generator processes launched by text submissions.
//!
//! Launches are fire-and-forget: the request that triggers one never waits
//! for it, and its exit status is only logged. Children still running at
//! shutdown are killed.

use std::process::Stdio;

use chime_settings::CommandSpec;
use metrics::counter;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::errors::{Result, ServerError};
use crate::metrics::GENERATOR_SPAWN_FAILURES_TOTAL;

/// Launches and tracks generator processes.
pub struct GeneratorSupervisor {
    command: Option<CommandSpec>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl GeneratorSupervisor {
    /// Create a supervisor. With `None`, submissions are accepted but nothing
    /// is launched.
    pub fn new(command: Option<CommandSpec>) -> Self {
        Self {
            command,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Whether a generator command is configured.
    pub fn is_configured(&self) -> bool {
        self.command.is_some()
    }

    /// Start the generator with `text` as its last argument.
    ///
    /// Returns the child's pid, or `None` when no generator is configured.
    pub fn launch(&self, text: &str) -> Result<Option<u32>> {
        let Some(cmd) = &self.command else {
            info!(text_len = text.len(), "no generator configured, submission accepted");
            return Ok(None);
        };

        let spawn_err = |source| {
            counter!(GENERATOR_SPAWN_FAILURES_TOTAL).increment(1);
            ServerError::Spawn {
                program: cmd.program.clone(),
                source,
            }
        };
        if self.cancel.is_cancelled() {
            return Err(spawn_err(std::io::Error::other("server is shutting down")));
        }

        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let pid = child.id();
        let program = cmd.program.clone();
        let cancel = self.cancel.clone();
        info!(program = %program, pid = ?pid, "generator started");

        let _ = self.tracker.spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => info!(program = %program, pid = ?pid, "generator finished"),
                    Ok(s) => warn!(program = %program, pid = ?pid, status = %s, "generator exited with failure"),
                    Err(e) => warn!(program = %program, pid = ?pid, error = %e, "failed to wait for generator"),
                },
                () = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!(program = %program, pid = ?pid, error = %e, "failed to kill generator");
                    } else {
                        info!(program = %program, pid = ?pid, "generator killed at shutdown");
                    }
                }
            }
        });
        Ok(pid)
    }

    /// Generators still running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Kill every running generator and wait for their waiters to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.tracker.close();
        self.tracker.wait().await;
    }
}
