//! # Content Cache (content-cache)
//!
//! A local content cache backed by a binary key/value engine, used to avoid
//! re-fetching and re-analyzing content pulled from external sources.
//!
//! ## Features
//!
//! - Length-framed, type-tagged wire protocol client
//! - Bounded async connection pool with lifetime and idle eviction
//! - TTL cache coordinator with lazy expiry and a no-op fallback backend
//! - Columnar hot/cold item store with arena-backed strings
//! - Detailed error handling
//! - Degraded state detection
//!
//! ## Caching Fetched Content
//!
//! The coordinator never fails: if the engine cannot be reached it runs on a
//! no-op backend and every lookup is a miss.
//!
//! ```no_run
//! use content_cache::{CacheConfig, CacheCoordinator, EngineConfig, NewsItem, SourceKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = EngineConfig::builder().host("127.0.0.1").port(2003).build();
//!     let cache = CacheCoordinator::connect(engine, CacheConfig::default()).await;
//!
//!     let url = "https://www.reddit.com/r/rust/top";
//!     if cache.get_cached(url, SourceKind::Reddit).await.is_none() {
//!         let items = vec![NewsItem::new("Rust 2.0", url, SourceKind::Reddit, 1_700_000_000)];
//!         cache.cache(url, SourceKind::Reddit, &items).await;
//!     }
//!
//!     println!("{}", cache.stats());
//!     Ok(())
//! }
//! ```
//!
//! ## Talking to the Engine Directly
//!
//! ```no_run
//! use content_cache::{ConnectionPool, EngineConfig, Value};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = ConnectionPool::new(EngineConfig::from_env()?)?;
//!
//!     let rows = pool
//!         .execute("SELECT v FROM content_cache.entries WHERE k = ?", &[Value::from("key")])
//!         .await?;
//!     println!("{} rows", rows.len());
//!
//!     let health = pool.health_check().await;
//!     if health.status.is_operational() {
//!         println!("Engine is operational ({}ms)", health.response_time_ms);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Bulk Processing
//!
//! ```
//! use content_cache::{HotColdStore, NewsItem, SourceKind};
//!
//! let mut store = HotColdStore::with_capacity(16);
//! store.add_item(&NewsItem::new("Same", "https://x/1", SourceKind::Rss, 2).with_relevance(0.9)).unwrap();
//! store.add_item(&NewsItem::new("Same", "https://x/2", SourceKind::Rss, 1).with_relevance(0.8)).unwrap();
//!
//! assert_eq!(store.deduplicate_hot(), 1);
//! assert_eq!(store.filter_by_relevance_hot(0.5), 1);
//! assert_eq!(store.item(0).unwrap().url, "https://x/1");
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod hash;
pub mod pool;
pub mod protocol;
pub mod schema;
pub mod store;

// Re-export main types for convenience
pub use cache::{
    BatchEntry, CacheBackend, CacheConfig, CacheConfigBuilder, CacheCoordinator, CacheEntry,
    CacheStats, Clock, DummyBackend, EngineBackend, ManualClock, MemoryBackend, SystemClock,
};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use connection::{Connection, HealthCheckResult, HealthStatus};
pub use error::{CacheError, Result};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use protocol::Value;
pub use schema::{NewsItem, SourceKind, SourceMetadata};
pub use store::{HotColdStore, NewsItemView, StringArena, StringRef};
