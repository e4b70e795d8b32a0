//! Core type definitions for the cache system

use crate::schema::{NewsItem, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of coordinator counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Lookups that returned a live entry
    pub hits: u64,

    /// Lookups that found nothing usable (includes expired and corrupt)
    pub misses: u64,

    /// Entries found expired and deleted
    pub expired: u64,

    /// Entries that failed validation and were deleted
    pub corrupt: u64,

    /// Successful writes
    pub writes: u64,

    /// Backend failures swallowed by the coordinator
    pub errors: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Total lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, expired: {}, corrupt: {}, writes: {}, errors: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.expired,
            self.corrupt,
            self.writes,
            self.errors
        )
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub expired: AtomicU64,
    pub corrupt: AtomicU64,
    pub writes: AtomicU64,
    pub errors: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// One `(url, kind, items)` write for [`batch_cache`](crate::cache::CacheCoordinator::batch_cache)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub url: String,
    pub kind: SourceKind,
    pub items: Vec<NewsItem>,
}

impl BatchEntry {
    pub fn new(url: impl Into<String>, kind: SourceKind, items: Vec<NewsItem>) -> Self {
        Self {
            url: url.into(),
            kind,
            items,
        }
    }
}
