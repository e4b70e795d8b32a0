//! Engine connection management and health check types
//!
//! A [`Connection`] is one TCP session with the engine: it performs the
//! handshake, authenticates when the endpoint requires it, and round-trips
//! framed queries. Every network step runs under a timeout; any protocol,
//! network, timeout or authentication failure poisons the connection so the
//! pool destroys it instead of handing it out again.

use crate::config::EngineConfig;
use crate::error::{CacheError, Result};
use crate::protocol::{
    encode_auth, encode_query, read_packet, write_packet, Packet, PacketKind, Value, HANDSHAKE_OK,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Statement used by [`Connection::ping`]
pub const PING_QUERY: &str = "SYSCTL REPORT STATUS";

/// Response time above which a healthy engine is reported as degraded
pub const DEFAULT_DEGRADED_THRESHOLD_MS: u64 = 1000;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Health status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Engine is healthy and responsive
    Healthy,
    /// Engine is responsive but slow (above degraded threshold)
    Degraded,
    /// Engine is not responsive or erroring
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Overall health status
    pub status: HealthStatus,
    /// Response time in milliseconds
    pub response_time_ms: u64,
    /// Timestamp of the health check
    pub timestamp: DateTime<Utc>,
    /// Error message (if unhealthy)
    pub error: Option<String>,
}

impl HealthCheckResult {
    /// Create a result for a successful check, degraded if it was slow
    pub fn healthy(response_time: Duration, degraded_threshold_ms: u64) -> Self {
        let response_time_ms = response_time.as_millis() as u64;
        let status = if response_time_ms > degraded_threshold_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            response_time_ms,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(response_time: Duration, error: &str) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: response_time.as_millis() as u64,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}

/// One authenticated session with the engine
///
/// Not shareable between tasks: a connection is checked out of the pool
/// exclusively and returned before reuse.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    stream: TcpStream,
    config: Arc<EngineConfig>,
    authenticated: bool,
    poisoned: bool,
    created_at: Instant,
    last_used: Instant,
}

impl Connection {
    /// Open a TCP stream, handshake and (for remote endpoints) authenticate
    ///
    /// The whole sequence is bounded by `connection_timeout`.
    pub async fn connect(config: Arc<EngineConfig>) -> Result<Self> {
        let timeout = config.connection_timeout;
        let address = config.address();
        with_timeout(timeout, format!("connecting to {}", address), async move {
            let stream = TcpStream::connect(&address).await.map_err(|e| {
                CacheError::ConnectionError(format!("connect to {} failed: {}", address, e))
            })?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not set TCP_NODELAY on {}: {}", address, e);
            }

            let now = Instant::now();
            let mut conn = Self {
                id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                stream,
                // endpoints that never authenticate count as authenticated
                authenticated: !config.needs_auth(),
                poisoned: false,
                created_at: now,
                last_used: now,
                config,
            };

            conn.handshake().await?;
            if conn.config.needs_auth() {
                conn.authenticate().await?;
            }

            debug!("Connection {} established to {}", conn.id, address);
            Ok(conn)
        })
        .await
    }

    async fn handshake(&mut self) -> Result<()> {
        write_packet(&mut self.stream, &Packet::handshake()).await?;
        let reply = read_packet(&mut self.stream).await?;

        if reply.kind != PacketKind::Handshake {
            return Err(CacheError::protocol(format!(
                "expected handshake reply, got {} packet",
                reply.kind
            )));
        }
        if reply.payload.as_ref() != HANDSHAKE_OK {
            return Err(CacheError::protocol(format!(
                "handshake rejected: {:?}",
                String::from_utf8_lossy(&reply.payload)
            )));
        }
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<()> {
        let (username, password) = match (&self.config.username, &self.config.password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => {
                return Err(CacheError::AuthenticationError(
                    "endpoint requires credentials but none are configured".to_string(),
                ))
            }
        };

        let payload = encode_auth(&username, &password)?;
        write_packet(&mut self.stream, &Packet::new(PacketKind::Auth, payload)).await?;
        let reply = read_packet(&mut self.stream).await?;

        if !matches!(reply.kind, PacketKind::Response | PacketKind::Auth) {
            return Err(CacheError::protocol(format!(
                "expected auth reply, got {} packet",
                reply.kind
            )));
        }

        match Value::decode_exact(&reply.payload)? {
            Value::ResponseCode(0) => {
                self.authenticated = true;
                debug!("Connection {} authenticated as {}", self.id, username);
                Ok(())
            }
            Value::ResponseCode(code) => Err(CacheError::AuthenticationError(format!(
                "engine rejected credentials with code {}",
                code
            ))),
            Value::ErrorCode { code, message } => Err(CacheError::AuthenticationError(format!(
                "{} (code {})",
                message, code
            ))),
            other => Err(CacheError::protocol(format!(
                "unexpected auth reply value with tag {:#04x}",
                other.tag()
            ))),
        }
    }

    /// Send a query and wait for its response
    ///
    /// Returns the result rows. A server `error_code` becomes
    /// [`CacheError::QueryError`] and leaves the connection usable; any
    /// connection-fatal failure poisons it.
    ///
    /// The connection stays poisoned while the request is in flight, so a
    /// caller that drops this future mid-query leaves it unusable rather than
    /// holding an unread response.
    pub async fn query(&mut self, text: &str, params: &[Value]) -> Result<Vec<Value>> {
        if self.poisoned {
            return Err(CacheError::ConnectionError(format!(
                "connection {} is no longer usable",
                self.id
            )));
        }

        let timeout = self.config.query_timeout;
        let context = format!("query on connection {}", self.id);
        self.poisoned = true;
        let result = with_timeout(timeout, context, self.round_trip(text, params)).await;
        self.last_used = Instant::now();

        match &result {
            Err(e) if e.is_connection_fatal() => {
                warn!("Connection {} poisoned: {}", self.id, e);
            }
            _ => self.poisoned = false,
        }
        result
    }

    async fn round_trip(&mut self, text: &str, params: &[Value]) -> Result<Vec<Value>> {
        let payload = encode_query(text, params)?;
        write_packet(&mut self.stream, &Packet::new(PacketKind::Query, payload)).await?;
        let reply = read_packet(&mut self.stream).await?;

        if reply.kind != PacketKind::Response {
            return Err(CacheError::protocol(format!(
                "expected response packet, got {} packet",
                reply.kind
            )));
        }

        match Value::decode_exact(&reply.payload)? {
            Value::List(rows) => Ok(rows),
            Value::ResponseCode(0) => Ok(Vec::new()),
            Value::ResponseCode(code) => Err(CacheError::QueryError {
                code,
                message: "engine returned a non-zero response code".to_string(),
            }),
            Value::ErrorCode { code, message } => Err(CacheError::QueryError { code, message }),
            other => Err(CacheError::protocol(format!(
                "unexpected response value with tag {:#04x}",
                other.tag()
            ))),
        }
    }

    /// Cheap liveness probe
    pub async fn ping(&mut self) -> Result<()> {
        self.query(PING_QUERY, &[]).await.map(|_| ())
    }

    /// Whether the pool may hand this connection out again
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    pub(crate) fn is_valid_at(&self, now: Instant) -> bool {
        if self.poisoned || !self.authenticated {
            return false;
        }
        let age = now.saturating_duration_since(self.created_at);
        let idle = now.saturating_duration_since(self.last_used);
        age <= self.config.max_connection_lifetime && idle <= self.config.max_idle_time
    }

    /// Shut down the write half and drop the socket
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Connection {} shutdown: {}", self.id, e);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }
}

/// Run `fut` under `timeout`, mapping expiry to [`CacheError::TimeoutError`]
async fn with_timeout<T, F>(timeout: Duration, context: String, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::TimeoutError {
            timeout_ms: timeout.as_millis() as u64,
            context,
        }),
    }
}
