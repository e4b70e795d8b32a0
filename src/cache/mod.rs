//! # TTL content cache
//!
//! Maps `(source URL, source kind)` pairs to TTL-bearing binary entries stored
//! in the key/value engine.
//!
//! ## Features
//!
//! - **Per-kind TTLs**: social content expires in hours, research content in days
//! - **Lazy expiry**: expired and corrupt entries are deleted on their next read
//! - **Degraded mode**: an unreachable engine is replaced by a no-op backend,
//!   so callers never see a cache error
//! - **Pluggable backends**: engine, in-memory and no-op implementations of
//!   [`CacheBackend`]
//!
//! ## Example
//!
//! ```no_run
//! use content_cache::cache::{CacheConfig, CacheCoordinator};
//! use content_cache::{EngineConfig, NewsItem, SourceKind};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = EngineConfig::from_env()?;
//! let cache = CacheCoordinator::connect(engine, CacheConfig::default()).await;
//!
//! let items = vec![NewsItem::new("Title", "https://x/1", SourceKind::Reddit, 0)];
//! cache.cache("https://x/1", SourceKind::Reddit, &items).await;
//!
//! if let Some(hit) = cache.get_cached("https://x/1", SourceKind::Reddit).await {
//!     println!("Cache hit: {} items", hit.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod keys;
pub mod types;

pub use backend::{CacheBackend, DummyBackend, EngineBackend, MemoryBackend, NOT_FOUND_CODE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder, TtlTable};
pub use coordinator::CacheCoordinator;
pub use entry::{CacheEntry, ENTRY_HEADER_LEN};
pub use keys::cache_key;
pub use types::{BatchEntry, CacheStats};
