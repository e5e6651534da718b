//! The live set of connections a hub broadcasts to.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::websocket::connection::{ClientConnection, ConnectionId};

/// Connections eligible for broadcasts.
///
/// Owned by a single [`Coordinator`](super::Coordinator); there is no
/// interior locking. Membership changes only through [`register`] and
/// [`unregister`], never as a side effect of iteration.
///
/// [`register`]: ConnectionRegistry::register
/// [`unregister`]: ConnectionRegistry::unregister
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Arc<ClientConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `false` if it was already present, in which
    /// case the registry is unchanged.
    pub fn register(&mut self, connection: Arc<ClientConnection>) -> bool {
        let id = connection.id();
        if self.connections.contains_key(&id) {
            return false;
        }
        let _ = self.connections.insert(id, connection);
        true
    }

    /// Remove a connection, handing back the registry's reference to it.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.remove(&id)
    }

    /// Apply `action` to every registered connection that is open at the
    /// moment it is reached. Returns the number of connections visited.
    ///
    /// Iteration follows id order; callers must treat the set as unordered.
    pub fn for_each_open(&self, mut action: impl FnMut(&ClientConnection)) -> usize {
        let mut visited = 0;
        for connection in self.connections.values() {
            if connection.is_open() {
                action(connection);
                visited += 1;
            }
        }
        visited
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
