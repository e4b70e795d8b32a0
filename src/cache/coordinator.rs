//! Application-facing cache API
//!
//! The coordinator maps `(url, kind)` to a key, wraps serialized items in a
//! TTL-bearing [`CacheEntry`] and stores it through a [`CacheBackend`].
//! Nothing here returns an error to the caller: backend failures, corrupt
//! entries and an unreachable engine only cost cache hits. Expired and
//! corrupt entries are deleted when they are next read.

use crate::cache::backend::{CacheBackend, DummyBackend, EngineBackend};
use crate::cache::clock::{Clock, SystemClock};
use crate::cache::config::CacheConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::keys::cache_key;
use crate::cache::types::{BatchEntry, CacheStats, StatsCounters};
use crate::config::EngineConfig;
use crate::connection::HealthCheckResult;
use crate::error::{CacheError, Result};
use crate::pool::ConnectionPool;
use crate::schema::{NewsItem, SourceKind};
use crate::store::HotColdStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache front end shared by content extractors
pub struct CacheCoordinator {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    stats: StatsCounters,
    /// Set while the backend is failing, so an outage is logged once
    outage: AtomicBool,
}

impl CacheCoordinator {
    /// Connect to the engine, falling back to [`DummyBackend`]
    ///
    /// Makes up to `init_max_retries` attempts with exponential backoff. Each
    /// attempt opens a connection and creates the schema. Never fails.
    pub async fn connect(engine: EngineConfig, config: CacheConfig) -> Self {
        match Self::connect_engine(engine, &config).await {
            Ok(backend) => {
                info!("Cache coordinator connected (namespace {})", config.namespace);
                Self::with_backend(Arc::new(backend), config)
            }
            Err(e) => {
                warn!("Cache engine unavailable, continuing without caching: {}", e);
                Self::with_backend(Arc::new(DummyBackend), config)
            }
        }
    }

    async fn connect_engine(engine: EngineConfig, config: &CacheConfig) -> Result<EngineBackend> {
        config.validate()?;
        let pool = ConnectionPool::new(engine)?;
        let backend = EngineBackend::new(Arc::clone(&pool), config.namespace.clone());

        let mut attempt = 1;
        loop {
            let outcome = match pool.warm_up().await {
                Ok(()) => backend.ensure_schema().await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => return Ok(backend),
                Err(e) if attempt >= config.init_max_retries => {
                    pool.close();
                    return Err(e);
                }
                Err(e) => {
                    let delay = config.backoff_for(attempt);
                    debug!(
                        "Cache engine attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, config.init_max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Use an explicit backend
    pub fn with_backend(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            clock: Arc::new(SystemClock),
            stats: StatsCounters::default(),
            outage: AtomicBool::new(false),
        }
    }

    /// Replace the clock used for timestamps and expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Key under which `(url, kind)` is stored
    pub fn key_for(&self, url: &str, kind: SourceKind) -> String {
        cache_key(&self.config.namespace, url, kind)
    }

    /// Cached items for `(url, kind)`, or `None` on a miss
    pub async fn get_cached(&self, url: &str, kind: SourceKind) -> Option<Vec<NewsItem>> {
        let key = self.key_for(url, kind);
        let Some(entry) = self.load_entry(&key, kind).await else {
            StatsCounters::bump(&self.stats.misses);
            return None;
        };

        match serde_json::from_slice::<Vec<NewsItem>>(&entry.content) {
            Ok(items) => {
                StatsCounters::bump(&self.stats.hits);
                debug!("Cache hit for {} ({} items)", key, items.len());
                Some(items)
            }
            Err(e) => {
                self.discard_corrupt(&key, &CacheError::from(e)).await;
                StatsCounters::bump(&self.stats.misses);
                None
            }
        }
    }

    /// Whether a live entry exists; same expiry rules as `get_cached`
    pub async fn is_cached(&self, url: &str, kind: SourceKind) -> bool {
        let key = self.key_for(url, kind);
        let found = self.load_entry(&key, kind).await.is_some();
        if found {
            StatsCounters::bump(&self.stats.hits);
        } else {
            StatsCounters::bump(&self.stats.misses);
        }
        found
    }

    /// Store `items` for `(url, kind)` with the kind's TTL
    pub async fn cache(&self, url: &str, kind: SourceKind, items: &[NewsItem]) {
        if let Err(e) = self.put(url, kind, items).await {
            debug!("Cache write for {} skipped: {}", url, e);
        }
    }

    async fn put(&self, url: &str, kind: SourceKind, items: &[NewsItem]) -> Result<()> {
        let key = self.key_for(url, kind);
        let content = serde_json::to_vec(items).map_err(|e| {
            StatsCounters::bump(&self.stats.errors);
            CacheError::from(e)
        })?;
        let entry = CacheEntry::new(content, kind, self.config.ttl(kind), self.clock.now());
        let bytes = entry.encode().map_err(|e| {
            StatsCounters::bump(&self.stats.errors);
            e
        })?;

        match self.backend.set_raw(&key, &bytes).await {
            Ok(()) => {
                self.backend_ok();
                StatsCounters::bump(&self.stats.writes);
                debug!("Cached {} items under {}", items.len(), key);
                Ok(())
            }
            Err(e) => {
                self.backend_failed("set", &e);
                Err(e)
            }
        }
    }

    /// Write several entries in order; returns how many were stored
    ///
    /// A failed entry is logged and skipped.
    pub async fn batch_cache(&self, entries: &[BatchEntry]) -> usize {
        let mut stored = 0;
        for entry in entries {
            match self.put(&entry.url, entry.kind, &entry.items).await {
                Ok(()) => stored += 1,
                Err(e) => debug!("Batch entry {} skipped: {}", entry.url, e),
            }
        }
        debug!("Batch cached {}/{} entries", stored, entries.len());
        stored
    }

    /// Persist every live item of a hot/cold store under `(url, kind)`
    pub async fn cache_store(&self, url: &str, kind: SourceKind, store: &HotColdStore) {
        let items = store.to_news_items();
        self.cache(url, kind, &items).await;
    }

    /// Drop the entry for `(url, kind)`
    pub async fn invalidate(&self, url: &str, kind: SourceKind) {
        let key = self.key_for(url, kind);
        match self.backend.delete_raw(&key).await {
            Ok(()) => self.backend_ok(),
            Err(e) => self.backend_failed("delete", &e),
        }
    }

    /// Fetch and validate an entry, deleting it if expired or corrupt
    async fn load_entry(&self, key: &str, kind: SourceKind) -> Option<CacheEntry> {
        let raw = match self.backend.get_raw(key).await {
            Ok(raw) => {
                self.backend_ok();
                raw?
            }
            Err(e @ CacheError::CorruptEntry(_)) => {
                self.backend_ok();
                self.discard_corrupt(key, &e).await;
                return None;
            }
            Err(e) => {
                self.backend_failed("get", &e);
                return None;
            }
        };

        let entry = match CacheEntry::decode(&raw) {
            Ok(entry) if entry.source_kind == kind => entry,
            Ok(entry) => {
                let e = CacheError::CorruptEntry(format!(
                    "stored kind {} does not match {}",
                    entry.source_kind, kind
                ));
                self.discard_corrupt(key, &e).await;
                return None;
            }
            Err(e) => {
                self.discard_corrupt(key, &e).await;
                return None;
            }
        };

        let now = self.clock.now();
        if entry.is_expired(now) {
            StatsCounters::bump(&self.stats.expired);
            debug!("Cache entry {} expired {}s ago", key, entry.age(now) - entry.ttl_seconds as i64);
            self.delete_quietly(key).await;
            return None;
        }

        Some(entry)
    }

    async fn discard_corrupt(&self, key: &str, error: &CacheError) {
        StatsCounters::bump(&self.stats.corrupt);
        warn!("Discarding cache entry {}: {}", key, error);
        self.delete_quietly(key).await;
    }

    async fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.backend.delete_raw(key).await {
            self.backend_failed("delete", &e);
        }
    }

    fn backend_ok(&self) {
        if self.outage.swap(false, Ordering::AcqRel) {
            info!("Cache backend {} recovered", self.backend.name());
        }
    }

    fn backend_failed(&self, op: &str, error: &CacheError) {
        StatsCounters::bump(&self.stats.errors);
        if self.outage.swap(true, Ordering::AcqRel) {
            debug!("Cache {} failed during outage: {}", op, error);
        } else {
            warn!(
                "Cache backend {} failing, serving without cache: {} failed: {}",
                self.backend.name(),
                op,
                error
            );
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// True when running on a backend that cannot store anything
    pub fn is_degraded(&self) -> bool {
        !self.backend.is_available()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn health_check(&self) -> HealthCheckResult {
        self.backend.health_check().await
    }
}
