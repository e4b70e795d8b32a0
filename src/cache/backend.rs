//! Raw key/value backends behind the coordinator
//!
//! The coordinator picks one [`CacheBackend`] at construction time:
//! [`EngineBackend`] when the engine is reachable, [`DummyBackend`] when it
//! is not, or [`MemoryBackend`] for single-process use and tests.

use crate::connection::HealthCheckResult;
use crate::error::{CacheError, Result};
use crate::pool::ConnectionPool;
use crate::protocol::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Engine error code for a missing key
pub const NOT_FOUND_CODE: u16 = 111;

/// Byte-oriented storage used by the cache coordinator
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the bytes stored under `key`; `None` on a miss
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete_raw(&self, key: &str) -> Result<()>;

    /// Create whatever storage structures the backend needs
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Whether values written here can be read back
    fn is_available(&self) -> bool {
        true
    }

    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy(Duration::ZERO, u64::MAX)
    }
}

/// Backend that talks to the engine through a connection pool
pub struct EngineBackend {
    pool: Arc<ConnectionPool>,
    namespace: String,
    table: String,
}

impl EngineBackend {
    /// `namespace` must already be validated as an identifier
    pub fn new(pool: Arc<ConnectionPool>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let table = format!("{}.entries", namespace);
        Self {
            pool,
            namespace,
            table,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// A row of any other shape is reported as a corrupt entry
    fn extract_binary(row: Value) -> Result<Option<Vec<u8>>> {
        match row {
            Value::Binary(bytes) => Ok(Some(bytes)),
            Value::Null => Ok(None),
            Value::List(mut columns) if columns.len() == 1 => match columns.pop() {
                Some(Value::Binary(bytes)) => Ok(Some(bytes)),
                Some(Value::Null) => Ok(None),
                other => Err(CacheError::CorruptEntry(format!(
                    "expected a binary column, got {:?}",
                    other.map(|v| v.tag())
                ))),
            },
            other => Err(CacheError::CorruptEntry(format!(
                "expected a binary row, got tag {:#04x}",
                other.tag()
            ))),
        }
    }
}

fn is_not_found(e: &CacheError) -> bool {
    matches!(e, CacheError::QueryError { code, .. } if *code == NOT_FOUND_CODE)
}

#[async_trait]
impl CacheBackend for EngineBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let query = format!("SELECT v FROM {} WHERE k = ?", self.table);
        let rows = match self.pool.execute(&query, &[Value::from(key)]).await {
            Ok(rows) => rows,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e),
        };
        match rows.into_iter().next() {
            Some(row) => Self::extract_binary(row),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        let query = format!("UPSERT INTO {}(?, ?)", self.table);
        self.pool
            .execute(&query, &[Value::from(key), Value::Binary(value.to_vec())])
            .await?;
        Ok(())
    }

    async fn delete_raw(&self, key: &str) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE k = ?", self.table);
        match self.pool.execute(&query, &[Value::from(key)]).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.pool
            .execute(&format!("CREATE SPACE IF NOT EXISTS {}", self.namespace), &[])
            .await?;
        self.pool
            .execute(
                &format!("CREATE MODEL IF NOT EXISTS {}(k: string, v: binary)", self.table),
                &[],
            )
            .await?;
        debug!("Schema ready for {}", self.table);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "engine"
    }

    async fn health_check(&self) -> HealthCheckResult {
        self.pool.health_check().await
    }
}

/// No-op backend used when the engine cannot be reached
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyBackend;

#[async_trait]
impl CacheBackend for DummyBackend {
    async fn get_raw(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set_raw(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn delete_raw(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dummy"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::unhealthy(Duration::ZERO, "caching disabled: engine unavailable")
    }
}

/// In-process backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete_raw(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::HealthStatus;

    #[tokio::test]
    async fn test_dummy_backend_never_stores() {
        let backend = DummyBackend;
        backend.set_raw("k", b"v").await.unwrap();
        assert_eq!(backend.get_raw("k").await.unwrap(), None);
        backend.delete_raw("k").await.unwrap();
        assert!(!backend.is_available());
        assert_eq!(backend.health_check().await.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        backend.set_raw("k", b"v1").await.unwrap();
        backend.set_raw("k", b"v2").await.unwrap();
        assert_eq!(backend.get_raw("k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(backend.len(), 1);

        backend.delete_raw("k").await.unwrap();
        backend.delete_raw("missing").await.unwrap();
        assert!(backend.is_empty());
        assert_eq!(backend.health_check().await.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_extract_binary_shapes() {
        assert_eq!(
            EngineBackend::extract_binary(Value::Binary(vec![1])).unwrap(),
            Some(vec![1])
        );
        assert_eq!(
            EngineBackend::extract_binary(Value::List(vec![Value::Binary(vec![2])])).unwrap(),
            Some(vec![2])
        );
        assert_eq!(EngineBackend::extract_binary(Value::Null).unwrap(), None);
        assert!(matches!(
            EngineBackend::extract_binary(Value::String("x".into())),
            Err(CacheError::CorruptEntry(_))
        ));
        assert!(matches!(
            EngineBackend::extract_binary(Value::List(vec![])),
            Err(CacheError::CorruptEntry(_))
        ));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(&CacheError::QueryError {
            code: NOT_FOUND_CODE,
            message: "no such key".into()
        }));
        assert!(!is_not_found(&CacheError::QueryError {
            code: 1,
            message: "syntax".into()
        }));
    }
}
