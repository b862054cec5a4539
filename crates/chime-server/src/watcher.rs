//! Change detection for the single watched artifact.
//!
//! The parent directory is watched rather than the file itself so the
//! artifact may be absent at startup and may be replaced by rename.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, Receiver};
use tracing::{debug, info, warn};

use crate::errors::{Result, ServerError};

/// Kind of change observed on the watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Contents or metadata changed in place.
    Modified,
    /// The path was created, renamed onto, or renamed away.
    Renamed,
}

/// One change to the watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Path as reported by the watcher backend.
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Build an event.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Produces change events for one path for the life of the process.
///
/// Dropping the detector stops the backend watcher.
pub struct FileChangeDetector {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    target: PathBuf,
    file_name: OsString,
}

impl FileChangeDetector {
    /// Establish the watch. Fails if the parent directory is missing or the
    /// backend cannot be initialized.
    pub fn new(target: &Path) -> Result<Self> {
        let watch_err = |source| ServerError::Watch {
            path: target.to_path_buf(),
            source,
        };

        let file_name = target
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| watch_err(notify::Error::generic("watch target has no file name")))?;
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(watch_err(notify::Error::path_not_found().add_path(dir)));
        }

        let (tx, rx) = mpsc::channel(100);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )
        .map_err(watch_err)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(watch_err)?;

        info!(path = %target.display(), dir = %dir.display(), "watching artifact");
        Ok(Self {
            _watcher: watcher,
            rx,
            target: target.to_path_buf(),
            file_name,
        })
    }

    /// The watched path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Wait for the next change to the watched path.
    ///
    /// Backend errors are logged and skipped. Returns `None` only once the
    /// backend has shut down.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        while let Some(res) = self.rx.recv().await {
            match res {
                Ok(event) => {
                    if let Some(change) = self.filter(&event) {
                        debug!(kind = ?change.kind, path = %change.path.display(), "artifact changed");
                        return Some(change);
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        }
        None
    }

    fn filter(&self, event: &Event) -> Option<ChangeEvent> {
        let kind = classify(&event.kind)?;
        event
            .paths
            .iter()
            .find(|p| p.file_name() == Some(self.file_name.as_os_str()))
            .map(|p| ChangeEvent::new(kind, p.clone()))
    }
}

/// Map a backend event kind onto the two kinds the broadcaster cares about.
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Create(_) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) | EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}
