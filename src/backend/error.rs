use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection pool closed")]
    PoolClosed,

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Subscription closed")]
    SubscriptionClosed,
}

pub type Result<T> = std::result::Result<T, BackendError>;
