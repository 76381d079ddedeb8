use crate::backend::error::{BackendError, Result};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

/// Pool sizing and health-check policy
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle connections kept for reuse
    pub max_idle: usize,
    /// Connections borrowed at the same time
    pub max_active: usize,
    /// Idle connections older than this are closed instead of reused
    pub idle_timeout: Duration,
    /// PING idle connections before handing them out
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 16,
            max_active: 64,
            idle_timeout: Duration::from_secs(240),
            test_on_borrow: true,
        }
    }
}

struct IdleConnection {
    conn: MultiplexedConnection,
    since: Instant,
}

/// Bounded pool of backend connections.
///
/// A connection is borrowed for exactly one command and handed back when
/// the guard drops. Borrowers beyond `max_active` wait for a permit.
pub struct ConnectionPool {
    client: redis::Client,
    idle: Mutex<Vec<IdleConnection>>,
    permits: Semaphore,
    config: PoolConfig,
}

impl ConnectionPool {
    pub fn new(client: redis::Client, config: PoolConfig) -> Self {
        Self {
            client,
            idle: Mutex::new(Vec::with_capacity(config.max_idle)),
            permits: Semaphore::new(config.max_active.max(1)),
            config,
        }
    }

    /// Borrow a healthy connection, dialing a new one when none is idle
    pub async fn get(&self) -> Result<PooledConnection<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BackendError::PoolClosed)?;

        while let Some(mut conn) = self.pop_idle() {
            if !self.config.test_on_borrow || ping(&mut conn).await {
                return Ok(PooledConnection::new(conn, self, permit));
            }
            debug!("Discarding idle backend connection that failed PING");
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        debug!("Opened new backend connection");
        Ok(PooledConnection::new(conn, self, permit))
    }

    /// Number of idle connections currently held
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn pop_idle(&self) -> Option<MultiplexedConnection> {
        let mut idle = self.idle.lock();
        let timeout = self.config.idle_timeout;
        idle.retain(|entry| entry.since.elapsed() < timeout);
        idle.pop().map(|entry| entry.conn)
    }

    fn put_back(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle {
            idle.push(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
    }
}

async fn ping(conn: &mut MultiplexedConnection) -> bool {
    let reply: redis::RedisResult<String> = redis::cmd("PING").query_async(conn).await;
    matches!(reply.as_deref(), Ok("PONG"))
}

/// A borrowed connection, returned to the pool on drop unless marked broken
pub struct PooledConnection<'a> {
    conn: MultiplexedConnection,
    pool: &'a ConnectionPool,
    broken: bool,
    _permit: SemaphorePermit<'a>,
}

impl<'a> PooledConnection<'a> {
    fn new(conn: MultiplexedConnection, pool: &'a ConnectionPool, permit: SemaphorePermit<'a>) -> Self {
        Self {
            conn,
            pool,
            broken: false,
            _permit: permit,
        }
    }

    /// Keep this connection out of the pool after use
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if !self.broken {
            // Multiplexed handles are cheap clones of the same socket
            self.pool.put_back(self.conn.clone());
        }
    }
}
