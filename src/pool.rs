//! Bounded connection pool
//!
//! The pool owns every live [`Connection`]. Each one is either idle in the
//! free list or checked out inside exactly one [`PooledConnection`] guard;
//! ownership makes "both at once" unrepresentable. Pool state sits behind a
//! single mutex that is never held across an `.await`, and a [`Notify`] wakes
//! one waiter per release.
//!
//! Cleanup of stale idle connections is not a background task: it runs inline
//! from `acquire` and `release`, at most once per `cleanup_interval`.

use crate::config::EngineConfig;
use crate::connection::{Connection, HealthCheckResult, DEFAULT_DEGRADED_THRESHOLD_MS};
use crate::error::{CacheError, Result};
use crate::protocol::Value;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured upper bound
    pub pool_size: usize,
    /// Live connections (idle + in use + being created)
    pub total: usize,
    /// Connections waiting in the free list
    pub idle: usize,
    /// Connections checked out or being created
    pub in_use: usize,
    /// Connections opened since the pool started
    pub created: u64,
    /// Connections destroyed since the pool started
    pub destroyed: u64,
    /// Acquire calls that gave up with `PoolExhaustedError`
    pub exhausted: u64,
}

struct PoolState {
    free: VecDeque<Connection>,
    total: usize,
    created: u64,
    destroyed: u64,
    exhausted: u64,
    last_cleanup: Instant,
    closed: bool,
}

enum Checkout {
    Ready(Connection),
    Create,
    Exhausted,
}

/// Connection pool with age/idle eviction
pub struct ConnectionPool {
    config: Arc<EngineConfig>,
    state: Mutex<PoolState>,
    available: Notify,
}

impl ConnectionPool {
    /// Create an empty pool; connections are opened lazily by `acquire`
    pub fn new(config: EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;

        info!(
            "Creating connection pool for {} (size {})",
            config.address(),
            config.pool_size
        );

        Ok(Arc::new(Self {
            config: Arc::new(config),
            state: Mutex::new(PoolState {
                free: VecDeque::new(),
                total: 0,
                created: 0,
                destroyed: 0,
                exhausted: 0,
                last_cleanup: Instant::now(),
                closed: false,
            }),
            available: Notify::new(),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check out a connection
    ///
    /// Reuses a valid idle connection, otherwise opens a new one while the pool
    /// is under capacity, otherwise waits up to `acquire_timeout` for a release
    /// and then fails with [`CacheError::PoolExhaustedError`].
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let deadline = tokio::time::Instant::now() + self.config.acquire_timeout;

        loop {
            // registered before checking so a release in between is not lost
            let released = self.available.notified();

            match self.try_checkout()? {
                Checkout::Ready(conn) => {
                    debug!("Reusing connection {}", conn.id());
                    return Ok(PooledConnection::new(self.clone(), conn));
                }
                Checkout::Create => {
                    let slot = SlotReservation { pool: self, armed: true };
                    let conn = Connection::connect(self.config.clone()).await?;
                    slot.disarm();
                    self.state.lock().created += 1;
                    debug!("Opened connection {}", conn.id());
                    return Ok(PooledConnection::new(self.clone(), conn));
                }
                Checkout::Exhausted => {}
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                let mut state = self.state.lock();
                state.exhausted += 1;
                warn!(
                    "Connection pool exhausted after waiting {:?}",
                    self.config.acquire_timeout
                );
                return Err(CacheError::PoolExhaustedError {
                    max_connections: self.config.pool_size,
                });
            }
        }
    }

    fn try_checkout(&self) -> Result<Checkout> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CacheError::ConnectionError("connection pool is closed".to_string()));
        }
        self.maybe_cleanup(&mut state);

        let now = Instant::now();
        // most recently returned first, so idle stragglers age out
        while let Some(conn) = state.free.pop_back() {
            if conn.is_valid_at(now) {
                return Ok(Checkout::Ready(conn));
            }
            debug!("Destroying stale connection {}", conn.id());
            state.total -= 1;
            state.destroyed += 1;
        }

        if state.total < self.config.pool_size {
            state.total += 1;
            return Ok(Checkout::Create);
        }
        Ok(Checkout::Exhausted)
    }

    /// Return a connection; invalid ones are destroyed
    fn release(&self, conn: Connection) {
        let mut state = self.state.lock();
        if !state.closed && conn.is_valid() {
            state.free.push_back(conn);
        } else {
            debug!("Destroying connection {} on release", conn.id());
            state.total -= 1;
            state.destroyed += 1;
            drop(conn);
        }
        self.maybe_cleanup(&mut state);
        drop(state);
        self.available.notify_one();
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total -= 1;
        drop(state);
        self.available.notify_one();
    }

    fn maybe_cleanup(&self, state: &mut PoolState) {
        if state.last_cleanup.elapsed() < self.config.cleanup_interval {
            return;
        }
        Self::sweep(state);
    }

    fn sweep(state: &mut PoolState) -> usize {
        let now = Instant::now();
        let before = state.free.len();
        state.free.retain(|conn| conn.is_valid_at(now));
        let removed = before - state.free.len();
        state.total -= removed;
        state.destroyed += removed as u64;
        state.last_cleanup = now;
        if removed > 0 {
            debug!("Pool cleanup removed {} stale connections", removed);
        }
        removed
    }

    /// Sweep the free list now, regardless of the cleanup interval
    pub fn cleanup(&self) -> usize {
        let mut state = self.state.lock();
        Self::sweep(&mut state)
    }

    /// Run a query on a pooled connection
    ///
    /// A connection-fatal failure is retried once on a fresh connection, since
    /// the pooled one may have been closed by the engine while idle.
    pub async fn execute(self: &Arc<Self>, text: &str, params: &[Value]) -> Result<Vec<Value>> {
        let mut conn = self.acquire().await?;
        match conn.query(text, params).await {
            Err(e) if e.is_connection_fatal() => {
                debug!("Retrying query on a fresh connection after: {}", e);
                drop(conn);
                let mut conn = self.acquire().await?;
                conn.query(text, params).await
            }
            other => other,
        }
    }

    /// Acquire one connection to prove the engine is reachable
    pub async fn warm_up(self: &Arc<Self>) -> Result<()> {
        let conn = self.acquire().await?;
        drop(conn);
        Ok(())
    }

    /// Ping the engine on a pooled connection and time it
    pub async fn health_check(self: &Arc<Self>) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = match self.acquire().await {
            Ok(mut conn) => conn.ping().await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => HealthCheckResult::healthy(start.elapsed(), DEFAULT_DEGRADED_THRESHOLD_MS),
            Err(e) => HealthCheckResult::unhealthy(start.elapsed(), &e.to_string()),
        }
    }

    /// Close the pool: idle connections are dropped, checked-out ones are
    /// destroyed when returned, and later `acquire` calls fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let idle = state.free.len();
        state.free.clear();
        state.total -= idle;
        state.destroyed += idle as u64;
        drop(state);
        self.available.notify_waiters();
        info!("Connection pool closed ({} idle connections dropped)", idle);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            pool_size: self.config.pool_size,
            total: state.total,
            idle: state.free.len(),
            in_use: state.total - state.free.len(),
            created: state.created,
            destroyed: state.destroyed,
            exhausted: state.exhausted,
        }
    }
}

/// Gives a reserved slot back if connection setup fails or is cancelled
struct SlotReservation<'a> {
    pool: &'a ConnectionPool,
    armed: bool,
}

impl SlotReservation<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}

/// A checked-out connection, returned to the pool on drop
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<Connection>,
}

impl PooledConnection {
    fn new(pool: Arc<ConnectionPool>, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    /// Destroy the connection instead of returning it
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.poison();
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // only `Drop` takes the connection out
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_rejects_invalid_config() {
        let config = EngineConfig::builder().pool_size(0).build();
        assert!(matches!(
            ConnectionPool::new(config),
            Err(CacheError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_connect_releases_slot() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let pool = ConnectionPool::new(
            EngineConfig::builder()
                .port(port)
                .pool_size(1)
                .connection_timeout(Duration::from_millis(200))
                .build(),
        )
        .unwrap();

        for _ in 0..3 {
            assert!(pool.acquire().await.is_err());
            let stats = pool.stats();
            assert_eq!(stats.total, 0);
            assert_eq!(stats.created, 0);
        }
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_acquire() {
        let pool = ConnectionPool::new(EngineConfig::default()).unwrap();
        pool.close();
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, CacheError::ConnectionError(_)));
    }

    #[test]
    fn test_empty_stats() {
        let pool = ConnectionPool::new(EngineConfig::builder().pool_size(3).build()).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.pool_size, 3);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.idle, 0);
        assert_eq!(pool.cleanup(), 0);
    }
}
