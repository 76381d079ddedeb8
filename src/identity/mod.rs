// Entity identity: redaction and connection bindings

mod redact;
mod registry;

pub use redact::{redact, redact_event, redact_feature, PUBLIC_ID_LEN};
pub use registry::IdentityRegistry;

use uuid::Uuid;

/// Relay-assigned transport identity of a live WebSocket connection
pub type ConnectionId = Uuid;

/// Length of a caller-supplied persistent entity id
pub const ENTITY_ID_LEN: usize = 24;

/// Check that an entity id has the expected fixed width
pub fn is_valid_entity_id(entity_id: &str) -> bool {
    entity_id.len() == ENTITY_ID_LEN
}
