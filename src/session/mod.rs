// Per-connection session handling and the client wire protocol

pub mod manager;
pub mod protocol;

pub use manager::SessionHandler;
pub use protocol::{ClientMessage, Feature, ServerMessage};
