//! Test-scoped connection registry.
//!
//! A [`ConnectionRegistry`] records connections weakly so a harness can find
//! the ones still alive at teardown, check that none was left open, and stop
//! stragglers. It is an ordinary value: create one per test and hand it to the
//! factories and listeners under test.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::identifiers::ConnectionId;
use crate::protocol::ConnectionState;

use super::connection::{Connection, WeakConnection};

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Weak registry of connections.
///
/// Clones share the same entries.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<FxHashMap<ConnectionId, WeakConnection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `connection`.
    pub fn register(&self, connection: &Connection) {
        self.entries
            .lock()
            .insert(connection.id(), connection.downgrade());
    }

    /// Returns every registered connection that still has a handle.
    ///
    /// Entries whose connection is gone are pruned.
    #[must_use]
    pub fn live(&self) -> Vec<Connection> {
        let mut entries = self.entries.lock();
        let mut live = Vec::with_capacity(entries.len());
        entries.retain(|_, weak| match weak.upgrade() {
            Some(connection) => {
                live.push(connection);
                true
            }
            None => false,
        });
        live
    }

    /// Returns live connections that have not reached `Closed`.
    #[must_use]
    pub fn leaked(&self) -> Vec<Connection> {
        let leaked: Vec<Connection> = self
            .live()
            .into_iter()
            .filter(|connection| connection.state() != ConnectionState::Closed)
            .collect();

        for connection in &leaked {
            warn!(
                connection = %connection.id(),
                name = connection.name(),
                state = %connection.state(),
                "Connection not closed"
            );
        }
        leaked
    }

    /// Stops every live connection that has not reached `Closed`.
    pub fn stop_all(&self) {
        let open: Vec<Connection> = self
            .live()
            .into_iter()
            .filter(|connection| connection.state() != ConnectionState::Closed)
            .collect();

        debug!(count = open.len(), "Stopping registered connections");
        for connection in open {
            connection.stop();
        }
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().len()
    }

    /// Returns `true` if no registered connection is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_connections_are_pruned() {
        let registry = ConnectionRegistry::new();
        let kept = Connection::acceptor("kept");
        let dropped = Connection::acceptor("dropped");
        registry.register(&kept);
        registry.register(&dropped);
        assert_eq!(registry.len(), 2);

        drop(dropped);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.live()[0], kept);
    }

    #[tokio::test]
    async fn test_leaked_reports_unclosed() {
        let registry = ConnectionRegistry::new();
        let connection = Connection::acceptor("server");
        registry.register(&connection);
        assert_eq!(registry.leaked().len(), 1);

        connection.close_async(None).await.expect("close");
        assert!(registry.leaked().is_empty());
        assert!(!registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_closes_stragglers() {
        let registry = ConnectionRegistry::new();
        let connection = Connection::acceptor("server");
        registry.register(&connection);

        let (_token, mut changes) = connection.add_change_channel();
        registry.stop_all();

        let change = changes.recv().await.expect("closed");
        assert_eq!(change.current, ConnectionState::Closed);
        assert!(registry.leaked().is_empty());
    }
}
