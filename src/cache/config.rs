//! Configuration for the cache coordinator

use crate::error::{CacheError, Result};
use crate::schema::SourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOUR: u32 = 3600;

/// Per-source-kind time-to-live, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlTable {
    seconds: [u32; SourceKind::ALL.len()],
}

impl Default for TtlTable {
    fn default() -> Self {
        let mut table = Self {
            seconds: [0; SourceKind::ALL.len()],
        };
        for kind in SourceKind::ALL {
            table.set(kind, default_ttl_seconds(kind));
        }
        table
    }
}

/// Social content goes stale fast, research content barely at all
fn default_ttl_seconds(kind: SourceKind) -> u32 {
    match kind {
        SourceKind::Reddit => 4 * HOUR,
        SourceKind::HackerNews => 2 * HOUR,
        SourceKind::Twitter => HOUR,
        SourceKind::Rss => 6 * HOUR,
        SourceKind::YouTube => 12 * HOUR,
        SourceKind::Blog | SourceKind::GitHub | SourceKind::HuggingFace => 24 * HOUR,
        SourceKind::Research => 7 * 24 * HOUR,
    }
}

impl TtlTable {
    pub fn get(&self, kind: SourceKind) -> u32 {
        self.seconds[kind.code() as usize]
    }

    pub fn set(&mut self, kind: SourceKind, seconds: u32) {
        self.seconds[kind.code() as usize] = seconds;
    }

    /// Every TTL multiplied by `factor`, never below one second
    pub fn scaled(&self, factor: f64) -> Self {
        let mut table = *self;
        for secs in table.seconds.iter_mut() {
            *secs = ((*secs as f64) * factor).clamp(1.0, u32::MAX as f64) as u32;
        }
        table
    }
}

/// Configuration for the cache coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Key prefix and engine space name; `[A-Za-z0-9_]+`
    pub namespace: String,

    /// Time-to-live per source kind
    pub ttls: TtlTable,

    /// Attempts to reach the engine before falling back to the dummy backend
    pub init_max_retries: u32,

    /// Delay before the second attempt, doubled after each failure
    pub init_backoff: Duration,

    /// Random jitter added to each backoff delay (0.0 - 1.0)
    pub backoff_jitter: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "content_cache".to_string(),
            ttls: TtlTable::default(),
            init_max_retries: 3,
            init_backoff: Duration::from_millis(200),
            backoff_jitter: 0.10,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// TTL applied to entries of `kind`
    pub fn ttl(&self, kind: SourceKind) -> u32 {
        self.ttls.get(kind)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty()
            || !self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(CacheError::ConfigError(format!(
                "namespace must be a non-empty [A-Za-z0-9_] identifier, got {:?}",
                self.namespace
            )));
        }

        if self.init_max_retries == 0 {
            return Err(CacheError::ConfigError(
                "init_max_retries must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(CacheError::ConfigError(
                "backoff_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if let Some(kind) = SourceKind::ALL.into_iter().find(|k| self.ttl(*k) == 0) {
            return Err(CacheError::ConfigError(format!(
                "TTL for {} must be greater than 0",
                kind
            )));
        }

        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based), with jitter applied
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self
            .init_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        if self.backoff_jitter == 0.0 {
            return base;
        }

        let jitter = rand::random::<f64>() * self.backoff_jitter;
        base.mul_f64(1.0 + jitter)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    namespace: Option<String>,
    ttls: Option<TtlTable>,
    ttl_overrides: Vec<(SourceKind, u32)>,
    init_max_retries: Option<u32>,
    init_backoff: Option<Duration>,
    backoff_jitter: Option<f64>,
}

impl CacheConfigBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Replace the whole TTL table
    pub fn ttls(mut self, ttls: TtlTable) -> Self {
        self.ttls = Some(ttls);
        self
    }

    /// Override the TTL of a single source kind
    pub fn ttl(mut self, kind: SourceKind, ttl: Duration) -> Self {
        let secs = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);
        self.ttl_overrides.push((kind, secs));
        self
    }

    pub fn init_max_retries(mut self, retries: u32) -> Self {
        self.init_max_retries = Some(retries);
        self
    }

    pub fn init_backoff(mut self, backoff: Duration) -> Self {
        self.init_backoff = Some(backoff);
        self
    }

    pub fn backoff_jitter(mut self, jitter: f64) -> Self {
        self.backoff_jitter = Some(jitter);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        let mut ttls = self.ttls.unwrap_or(defaults.ttls);
        for (kind, secs) in self.ttl_overrides {
            ttls.set(kind, secs);
        }

        CacheConfig {
            namespace: self.namespace.unwrap_or(defaults.namespace),
            ttls,
            init_max_retries: self.init_max_retries.unwrap_or(defaults.init_max_retries),
            init_backoff: self.init_backoff.unwrap_or(defaults.init_backoff),
            backoff_jitter: self.backoff_jitter.unwrap_or(defaults.backoff_jitter),
        }
    }
}

/// Preset configurations
impl CacheConfig {
    /// Quarter of the default TTLs, for fast-moving feeds
    pub fn short_lived() -> Self {
        Self {
            ttls: TtlTable::default().scaled(0.25),
            ..Default::default()
        }
    }

    /// Four times the default TTLs, for archival runs
    pub fn long_lived() -> Self {
        Self {
            ttls: TtlTable::default().scaled(4.0),
            ..Default::default()
        }
    }
}
