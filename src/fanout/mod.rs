// Delivery of serialized messages to live connections

mod metrics;

pub use metrics::{run_metrics_reporter, DeliveryMetrics, MetricsSnapshot};

use crate::identity::ConnectionId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Default per-connection outbound buffer.
/// Sized for a few seconds of viewport updates for a busy map.
pub const CONNECTION_BUFFER_SIZE: usize = 256;

/// Send/broadcast primitive shared by the viewport engine and the router.
///
/// Delivery is best effort: a connection that has gone away is skipped
/// silently, since closes race with routing all the time.
#[async_trait]
pub trait Fanout: Send + Sync {
    /// Deliver `message` to one connection
    fn send_to(&self, connection: ConnectionId, message: &str);

    /// Ids of every live connection
    fn connection_ids(&self) -> Vec<ConnectionId>;

    /// Deliver `message` to every live connection except `except`
    fn broadcast(&self, message: &str, except: Option<ConnectionId>) {
        for connection in self.connection_ids() {
            if Some(connection) != except {
                self.send_to(connection, message);
            }
        }
    }

    /// Deliver `message` to one connection, waiting for queue space
    /// instead of dropping. Only for replies to the connection's own request.
    async fn deliver(&self, connection: ConnectionId, message: String) {
        self.send_to(connection, &message);
    }
}

/// The transport's set of live connections.
///
/// Each entry is the sending half of the connection's outbound queue;
/// the session task drains the other half into the socket, so messages to
/// one connection keep the order in which they were sent.
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    buffer_size: usize,
    metrics: Arc<DeliveryMetrics>,
}

impl ConnectionHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer_size: buffer_size.max(1),
            metrics: Arc::new(DeliveryMetrics::new()),
        }
    }

    /// Counters of every message queued so far
    pub fn metrics(&self) -> Arc<DeliveryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Register a new connection and hand back its outbound queue
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = ConnectionId::new_v4();
        self.connections.insert(id, tx);
        info!(connection = %id, total = self.connections.len(), "Connection registered");
        (id, rx)
    }

    pub fn unregister(&self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_some() {
            info!(connection = %connection, total = self.connections.len(), "Connection unregistered");
        }
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(CONNECTION_BUFFER_SIZE)
    }
}

#[async_trait]
impl Fanout for ConnectionHub {
    fn send_to(&self, connection: ConnectionId, message: &str) {
        let Some(tx) = self.connections.get(&connection) else {
            return;
        };
        // Full buffer means a slow client; drop rather than stall the router
        match tx.try_send(message.to_string()) {
            Ok(()) => self.metrics.record(message.len()),
            Err(e) => debug!(connection = %connection, error = %e, "Dropped outbound message"),
        }
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    fn broadcast(&self, message: &str, except: Option<ConnectionId>) {
        for entry in self.connections.iter() {
            if Some(*entry.key()) == except {
                continue;
            }
            match entry.value().try_send(message.to_string()) {
                Ok(()) => self.metrics.record(message.len()),
                Err(e) => debug!(connection = %entry.key(), error = %e, "Dropped broadcast message"),
            }
        }
    }

    async fn deliver(&self, connection: ConnectionId, message: String) {
        // Clone the sender so no map guard is held across the await
        let Some(tx) = self.connections.get(&connection).map(|entry| entry.value().clone()) else {
            return;
        };
        let bytes = message.len();
        match tx.send(message).await {
            Ok(()) => self.metrics.record(bytes),
            Err(_) => debug!(connection = %connection, "Connection closed before delivery"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
