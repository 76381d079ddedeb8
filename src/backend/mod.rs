// Spatial backend (Tile38) access: pooled commands and pub/sub

mod client;
mod command;
mod error;
mod pool;

pub use client::{BackendConfig, BackendEvent, EventStream, SpatialBackend, Tile38Client, Topic};
pub use command::{Command, Page, Reply};
pub use error::{BackendError, Result};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};

#[cfg(test)]
pub(crate) mod testing;
