use crate::identity::ConnectionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Both directions of the connection <-> entity association.
///
/// Only ever touched while holding the registry lock, so readers never
/// observe one direction updated without the other.
#[derive(Default)]
struct Bindings {
    by_connection: HashMap<ConnectionId, String>,
    by_entity: HashMap<String, ConnectionId>,
}

/// Concurrent bidirectional map between connections and entity ids.
///
/// Shared by every connection task (bind on Feature, unbind on close) and
/// by the notification router (lookups). Critical sections are short and
/// never span an await point.
pub struct IdentityRegistry {
    bindings: Mutex<Bindings>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(Bindings::default()),
        }
    }

    /// Associate `connection` with `entity_id`, last writer wins.
    ///
    /// Stale inverse entries are dropped so the two directions stay mutual
    /// inverses: the connection's previous entity loses its reverse entry,
    /// and a connection that previously claimed `entity_id` loses its
    /// forward entry.
    pub fn bind(&self, connection: ConnectionId, entity_id: &str) {
        let mut bindings = self.bindings.lock();

        if let Some(previous) = bindings.by_connection.get(&connection) {
            if previous == entity_id {
                return;
            }
            let previous = previous.clone();
            bindings.by_entity.remove(&previous);
        }

        if let Some(superseded) = bindings.by_entity.get(entity_id).copied() {
            if superseded != connection {
                bindings.by_connection.remove(&superseded);
                debug!(
                    entity = %entity_id,
                    superseded = %superseded,
                    connection = %connection,
                    "Entity rebound to a newer connection"
                );
            }
        }

        bindings
            .by_connection
            .insert(connection, entity_id.to_string());
        bindings.by_entity.insert(entity_id.to_string(), connection);
    }

    /// Entity currently bound to `connection`
    pub fn entity_for(&self, connection: ConnectionId) -> Option<String> {
        self.bindings.lock().by_connection.get(&connection).cloned()
    }

    /// Connection currently bound to `entity_id`
    pub fn connection_for(&self, entity_id: &str) -> Option<ConnectionId> {
        self.bindings.lock().by_entity.get(entity_id).copied()
    }

    /// Remove both directions for `connection`, returning the entity it held.
    ///
    /// Idempotent: repeated or unknown connections return `None`.
    pub fn unbind(&self, connection: ConnectionId) -> Option<String> {
        let mut bindings = self.bindings.lock();
        let entity_id = bindings.by_connection.remove(&connection)?;
        if bindings.by_entity.get(&entity_id) == Some(&connection) {
            bindings.by_entity.remove(&entity_id);
        }
        Some(entity_id)
    }

    /// Number of bound connections
    pub fn len(&self) -> usize {
        self.bindings.lock().by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl IdentityRegistry {
    /// Check that both directions are mutual inverses under one lock
    pub(crate) fn assert_consistent(&self) {
        let bindings = self.bindings.lock();
        assert_eq!(bindings.by_connection.len(), bindings.by_entity.len());
        for (connection, entity_id) in &bindings.by_connection {
            assert_eq!(bindings.by_entity.get(entity_id), Some(connection));
        }
        for (entity_id, connection) in &bindings.by_entity {
            assert_eq!(bindings.by_connection.get(connection), Some(entity_id));
        }
    }
}
