// Recording fanout for unit tests

use crate::fanout::Fanout;
use crate::identity::ConnectionId;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

/// Captures every delivery instead of writing to sockets
pub(crate) struct RecordingFanout {
    live: Mutex<Vec<ConnectionId>>,
    sent: Mutex<Vec<(ConnectionId, String)>>,
}

impl RecordingFanout {
    pub fn new(live: &[ConnectionId]) -> Self {
        Self {
            live: Mutex::new(live.to_vec()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(ConnectionId, String)> {
        self.sent.lock().clone()
    }

    /// Deliveries to `connection`, parsed as JSON
    pub fn received_by(&self, connection: ConnectionId) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == connection)
            .filter_map(|(_, text)| serde_json::from_str(text).ok())
            .collect()
    }
}

#[async_trait]
impl Fanout for RecordingFanout {
    fn send_to(&self, connection: ConnectionId, message: &str) {
        if self.live.lock().contains(&connection) {
            self.sent.lock().push((connection, message.to_string()));
        }
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.live.lock().clone()
    }
}
