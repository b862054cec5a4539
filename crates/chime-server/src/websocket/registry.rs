//! The set of currently open connections.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chime_core::ConnectionId;
use parking_lot::RwLock;
use tracing::debug;

use super::connection::ClientConnection;

/// Open connections keyed by identity.
///
/// Membership implies "assumed open". Sessions add themselves on upgrade and
/// remove themselves once on close, error or heartbeat timeout; the
/// broadcaster only reads snapshots.
#[derive(Default)]
pub struct ClientRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Returns `false` (and changes nothing) if the id
    /// is already present.
    pub fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write();
        match conns.entry(connection.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(conn_id = %connection.id, "registered connection");
                let _ = slot.insert(connection);
                true
            }
        }
    }

    /// Remove a connection and mark it closed. Returns `false` if it was not
    /// present, so repeated calls are harmless.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.write().remove(id);
        match removed {
            Some(conn) => {
                let _ = conn.mark_closed();
                debug!(conn_id = %id, "unregistered connection");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the members at call time.
    ///
    /// Later adds and removes do not affect a snapshot already taken.
    pub fn enumerate(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Whether a connection with this id is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
