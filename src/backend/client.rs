use crate::backend::command::{Command, Reply};
use crate::backend::error::{BackendError, Result};
use crate::backend::pool::{ConnectionPool, PoolConfig};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// A message published on a backend channel
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    /// Channel the message was published on (not the matching pattern)
    pub channel: String,
    /// Raw JSON payload
    pub payload: String,
}

/// Something to subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Exact channel name (SUBSCRIBE)
    Channel(String),
    /// Glob pattern (PSUBSCRIBE)
    Pattern(String),
}

/// Infinite stream of published messages.
///
/// Never ends normally: a broken transport yields one terminal
/// `Err(BackendError::SubscriptionClosed)` and then the stream is done.
pub type EventStream = BoxStream<'static, Result<BackendEvent>>;

/// Command/response and pub/sub access to the spatial backend
#[async_trait]
pub trait SpatialBackend: Send + Sync {
    /// Run one command on a pooled connection
    async fn command(&self, command: &Command) -> Result<Reply>;

    /// Open a dedicated subscription connection for `topics`
    async fn subscribe(&self, topics: &[Topic]) -> Result<EventStream>;
}

/// Backend connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Tile38 address (RESP)
    pub url: String,
    /// Collection holding entity points
    pub collection: String,
    /// Expiry for entity records; the backend garbage-collects stale entities
    pub entity_ttl_seconds: u64,
    pub max_idle: usize,
    pub max_active: usize,
    pub idle_timeout_seconds: u64,
    pub command_timeout_ms: u64,
    pub test_on_borrow: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            url: std::env::var("TILE38_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:9851".to_string()),
            collection: "people".to_string(),
            entity_ttl_seconds: 10,
            max_idle: pool.max_idle,
            max_active: pool.max_active,
            idle_timeout_seconds: pool.idle_timeout.as_secs(),
            command_timeout_ms: 5_000,
            test_on_borrow: pool.test_on_borrow,
        }
    }
}

impl BackendConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_idle: self.max_idle,
            max_active: self.max_active,
            idle_timeout: Duration::from_secs(self.idle_timeout_seconds),
            test_on_borrow: self.test_on_borrow,
        }
    }
}

/// Tile38 client over the Redis protocol
pub struct Tile38Client {
    client: redis::Client,
    pool: ConnectionPool,
    command_timeout: Duration,
}

impl Tile38Client {
    /// Create a client. No connection is made until the first command.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        info!("Using Tile38 at {}", config.url);
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            pool: ConnectionPool::new(client.clone(), config.pool_config()),
            client,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }
}

#[async_trait]
impl SpatialBackend for Tile38Client {
    async fn command(&self, command: &Command) -> Result<Reply> {
        let mut conn = self.pool.get().await?;
        let cmd = command.to_redis();

        let outcome: std::result::Result<redis::RedisResult<Reply>, _> =
            tokio::time::timeout(self.command_timeout, cmd.query_async(&mut *conn)).await;

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    conn.mark_broken();
                }
                Err(e.into())
            }
            Err(_) => {
                conn.mark_broken();
                Err(BackendError::Timeout(self.command_timeout))
            }
        }
    }

    async fn subscribe(&self, topics: &[Topic]) -> Result<EventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for topic in topics {
            match topic {
                Topic::Channel(name) => pubsub.subscribe(name).await?,
                Topic::Pattern(pattern) => pubsub.psubscribe(pattern).await?,
            }
            debug!(topic = ?topic, "Subscribed");
        }

        let events = pubsub.into_on_message().map(|msg| {
            let channel = msg.get_channel_name().to_string();
            msg.get_payload::<String>()
                .map(|payload| BackendEvent { channel, payload })
                .map_err(BackendError::from)
        });
        let closed = stream::once(async { Err(BackendError::SubscriptionClosed) });

        Ok(events.chain(closed).boxed())
    }
}
