//! Bookkeeping of open client connections.

mod connection;

pub use connection::{ConnectionHandle, TransportKind};

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Authoritative map of currently open connections.
///
/// Membership reflects exactly the set of transport-level sessions that are
/// open right now; every operation is individually safe under concurrent
/// invocation.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection.
    ///
    /// Fails with [`AppError::DuplicateConnection`] if the identifier is
    /// already present, which indicates a defect in the caller.
    pub fn register(&self, connection: ConnectionHandle) -> Result<Arc<ConnectionHandle>> {
        let handle = Arc::new(connection);

        match self.connections.entry(handle.id) {
            Entry::Occupied(_) => Err(AppError::DuplicateConnection(handle.id)),
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                tracing::info!(
                    connection_id = %handle.id,
                    kind = %handle.kind,
                    "Connection registered"
                );
                Ok(handle)
            }
        }
    }

    /// Remove a connection. Idempotent: a second notification for the same
    /// identifier is a no-op, not an error.
    pub fn unregister(&self, connection_id: Uuid) -> bool {
        match self.connections.remove(&connection_id) {
            Some((_, handle)) => {
                tracing::info!(
                    connection_id = %connection_id,
                    kind = %handle.kind,
                    "Connection unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Get a connection by identifier.
    pub fn get(&self, connection_id: Uuid) -> Result<Arc<ConnectionHandle>> {
        self.connections
            .get(&connection_id)
            .map(|h| h.clone())
            .ok_or(AppError::ConnectionNotFound(connection_id))
    }

    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Snapshot of all currently registered connections. The snapshot is
    /// taken once; registrations and removals that happen afterwards do not
    /// affect it. Broadcast extension point.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Visit every connection registered at the time of the call.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<ConnectionHandle>),
    {
        for handle in self.snapshot() {
            visit(&handle);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Per-transport counts, reported at shutdown and useful in tests.
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = ConnectionStats::default();
        for entry in self.connections.iter() {
            stats.total += 1;
            match entry.value().kind {
                TransportKind::Poll => stats.polling += 1,
                TransportKind::Stream => stats.streaming += 1,
                TransportKind::Socket => stats.sockets += 1,
            }
        }
        stats
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub polling: usize,
    pub streaming: usize,
    pub sockets: usize,
}

/// Deregisters a connection when dropped.
///
/// Strategies hold one of these for the lifetime of the request so that
/// every exit path, including a client abort that drops the handler future,
/// removes the connection from the registry.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    connection_id: Uuid,
}

impl ConnectionGuard {
    pub fn new(registry: Arc<ConnectionRegistry>, connection_id: Uuid) -> Self {
        Self {
            registry,
            connection_id,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use tokio::sync::mpsc;

    fn test_handle(kind: TransportKind) -> ConnectionHandle {
        let (tx, _rx) = mpsc::channel::<Event>(1);
        ConnectionHandle::new(kind, tx)
    }

    #[test]
    fn test_register_then_get() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(test_handle(TransportKind::Poll)).unwrap();

        let found = registry.get(handle.id).unwrap();
        assert_eq!(found.id, handle.id);
        assert_eq!(found.kind, TransportKind::Poll);
    }

    #[test]
    fn test_register_duplicate_fails() {
        let registry = ConnectionRegistry::new();
        let first = test_handle(TransportKind::Stream);
        let id = first.id;
        registry.register(first).unwrap();

        let mut second = test_handle(TransportKind::Stream);
        second.id = id;
        match registry.register(second) {
            Err(AppError::DuplicateConnection(dup)) => assert_eq!(dup, id),
            other => panic!("expected DuplicateConnection, got {other:?}"),
        }
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(test_handle(TransportKind::Socket)).unwrap();

        assert!(registry.unregister(handle.id));
        assert!(!registry.unregister(handle.id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let registry = ConnectionRegistry::new();
        let missing = Uuid::new_v4();
        match registry.get(missing) {
            Err(AppError::ConnectionNotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected ConnectionNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_unaffected_by_mutation() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(test_handle(TransportKind::Stream)).unwrap();
        let b = registry.register(test_handle(TransportKind::Stream)).unwrap();

        let snapshot = registry.snapshot();
        registry.unregister(a.id);
        registry.unregister(b.id);

        assert_eq!(snapshot.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = ConnectionRegistry::new();
        registry.register(test_handle(TransportKind::Poll)).unwrap();
        registry.register(test_handle(TransportKind::Socket)).unwrap();

        let mut visited = 0;
        registry.for_each(|_| visited += 1);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_stats_counts_per_kind() {
        let registry = ConnectionRegistry::new();
        registry.register(test_handle(TransportKind::Poll)).unwrap();
        registry.register(test_handle(TransportKind::Stream)).unwrap();
        registry.register(test_handle(TransportKind::Stream)).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.polling, 1);
        assert_eq!(stats.streaming, 2);
        assert_eq!(stats.sockets, 0);
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handle = registry.register(test_handle(TransportKind::Poll)).unwrap();

        {
            let _guard = ConnectionGuard::new(registry.clone(), handle.id);
            assert!(registry.contains(handle.id));
        }

        assert!(!registry.contains(handle.id));
    }
}
