//! Error types for cache operations
//!
//! This module defines the error taxonomy for the content-cache library:
//! wire protocol violations, network and timeout failures, authentication,
//! pool exhaustion, corrupt cache entries and capacity limits.

use thiserror::Error;

/// Main error type for cache and engine operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Protocol violation - bad packet kind, unknown value tag, malformed handshake
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Connection error - connect, read or write failure
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Raw socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error - rejected credentials or missing credentials
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Query rejected by the engine with an error code
    #[error("Query error (code {code}): {message}")]
    QueryError { code: u16, message: String },

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Connection pool exhausted - no available connections
    #[error("Connection pool exhausted: all {max_connections} connections are in use")]
    PoolExhaustedError { max_connections: usize },

    /// Stored cache entry failed validation
    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Store or arena capacity reached
    #[error("Capacity error: {0}")]
    CapacityError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Whether a connection that produced this error must be discarded
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            CacheError::ProtocolError(_)
                | CacheError::ConnectionError(_)
                | CacheError::Io(_)
                | CacheError::TimeoutError { .. }
                | CacheError::AuthenticationError(_)
        )
    }

    /// Whether the caller may retry the operation (with backoff)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::PoolExhaustedError { .. }
                | CacheError::ConnectionError(_)
                | CacheError::Io(_)
                | CacheError::TimeoutError { .. }
        )
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        CacheError::ProtocolError(message.into())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
