//! Connection and pool configuration for the key-value engine

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Prefix for every environment variable read by [`EngineConfig::from_env`]
pub const ENV_PREFIX: &str = "CONTENT_CACHE_";

/// Configuration for connecting to the engine and sizing the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine host name or IP address
    pub host: String,

    /// Engine TCP port
    pub port: u16,

    /// Whether remote endpoints require authentication
    /// Loopback endpoints never authenticate
    pub auth_required: bool,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Upper bound on live connections
    pub pool_size: usize,

    /// Timeout for TCP connect plus handshake and auth
    pub connection_timeout: Duration,

    /// Timeout for one query round trip
    pub query_timeout: Duration,

    /// How long `acquire` waits for a released connection
    pub acquire_timeout: Duration,

    /// Connections older than this are retired
    pub max_connection_lifetime: Duration,

    /// Connections unused for longer than this are retired
    pub max_idle_time: Duration,

    /// Minimum spacing between free-list sweeps
    pub cleanup_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2003,
            auth_required: false,
            username: None,
            password: None,
            pool_size: 8,
            connection_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
            // 30 minutes
            max_connection_lifetime: Duration::from_secs(30 * 60),
            // 5 minutes
            max_idle_time: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create a new builder for engine configuration
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// `host:port` as passed to the socket layer
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the endpoint is on this machine
    pub fn is_local(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        IpAddr::from_str(&self.host)
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    /// Whether connections to this endpoint must authenticate
    pub fn needs_auth(&self) -> bool {
        self.auth_required && !self.is_local()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CacheError::ConfigError("host must not be empty".to_string()));
        }

        if self.pool_size == 0 {
            return Err(CacheError::ConfigError(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("connection_timeout", self.connection_timeout),
            ("query_timeout", self.query_timeout),
            ("acquire_timeout", self.acquire_timeout),
            ("max_connection_lifetime", self.max_connection_lifetime),
            ("max_idle_time", self.max_idle_time),
        ] {
            if value.is_zero() {
                return Err(CacheError::ConfigError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.auth_required && (self.username.is_none() || self.password.is_none()) {
            return Err(CacheError::ConfigError(
                "auth_required needs both username and password".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from the environment (and a `.env` file if present)
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let defaults = Self::default();

        let mut builder = Self::builder();
        if let Some(host) = var("HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = var("PORT") {
            builder = builder.port(parse_var("PORT", &port)?);
        }
        if let Some(auth) = var("AUTH_REQUIRED") {
            builder = builder.auth_required(parse_bool("AUTH_REQUIRED", &auth)?);
        }
        if let Some(user) = var("USERNAME") {
            builder = builder.username(user);
        }
        if let Some(pass) = var("PASSWORD") {
            builder = builder.password(pass);
        }
        if let Some(size) = var("POOL_SIZE") {
            builder = builder.pool_size(parse_var("POOL_SIZE", &size)?);
        }

        let millis = |suffix: &str, default: Duration| -> Result<Duration> {
            match var(suffix) {
                Some(raw) => Ok(Duration::from_millis(parse_var(suffix, &raw)?)),
                None => Ok(default),
            }
        };
        builder = builder
            .connection_timeout(millis("CONNECTION_TIMEOUT_MS", defaults.connection_timeout)?)
            .query_timeout(millis("QUERY_TIMEOUT_MS", defaults.query_timeout)?)
            .max_connection_lifetime(millis(
                "MAX_CONNECTION_LIFETIME_MS",
                defaults.max_connection_lifetime,
            )?)
            .max_idle_time(millis("MAX_IDLE_TIME_MS", defaults.max_idle_time)?);

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        CacheError::ConfigError(format!("{}{}={:?}: {}", ENV_PREFIX, name, raw, e))
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CacheError::ConfigError(format!(
            "{}{}={:?}: expected a boolean",
            ENV_PREFIX, name, raw
        ))),
    }
}

/// Builder for engine configuration
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    auth_required: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    pool_size: Option<usize>,
    connection_timeout: Option<Duration>,
    query_timeout: Option<Duration>,
    acquire_timeout: Option<Duration>,
    max_connection_lifetime: Option<Duration>,
    max_idle_time: Option<Duration>,
    cleanup_interval: Option<Duration>,
}

impl EngineConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = Some(required);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set credentials and require authentication
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_required(true).username(username).password(password)
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_connection_lifetime = Some(lifetime);
        self
    }

    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = Some(idle);
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the engine configuration
    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();

        EngineConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            auth_required: self.auth_required.unwrap_or(defaults.auth_required),
            username: self.username.or(defaults.username),
            password: self.password.or(defaults.password),
            pool_size: self.pool_size.unwrap_or(defaults.pool_size),
            connection_timeout: self
                .connection_timeout
                .unwrap_or(defaults.connection_timeout),
            query_timeout: self.query_timeout.unwrap_or(defaults.query_timeout),
            acquire_timeout: self.acquire_timeout.unwrap_or(defaults.acquire_timeout),
            max_connection_lifetime: self
                .max_connection_lifetime
                .unwrap_or(defaults.max_connection_lifetime),
            max_idle_time: self.max_idle_time.unwrap_or(defaults.max_idle_time),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.address(), "127.0.0.1:2003");
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_local_endpoints_skip_auth() {
        for host in ["localhost", "127.0.0.1", "::1", "LOCALHOST"] {
            let config = EngineConfig::builder()
                .host(host)
                .credentials("user", "pass")
                .build();
            assert!(config.is_local(), "{} should be local", host);
            assert!(!config.needs_auth());
        }

        let remote = EngineConfig::builder()
            .host("cache.internal")
            .credentials("user", "pass")
            .build();
        assert!(!remote.is_local());
        assert!(remote.needs_auth());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());

        let config = EngineConfig::builder()
            .query_timeout(Duration::ZERO)
            .build();
        assert!(config.validate().is_err());

        let config = EngineConfig::builder().auth_required(true).build();
        assert!(config.validate().is_err());

        let config = EngineConfig::builder()
            .host("10.0.0.5")
            .credentials("u", "p")
            .build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<String, String> = [
            ("CONTENT_CACHE_HOST", "10.1.2.3"),
            ("CONTENT_CACHE_PORT", "9000"),
            ("CONTENT_CACHE_AUTH_REQUIRED", "yes"),
            ("CONTENT_CACHE_USERNAME", "reader"),
            ("CONTENT_CACHE_PASSWORD", "hunter2"),
            ("CONTENT_CACHE_POOL_SIZE", "4"),
            ("CONTENT_CACHE_QUERY_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = EngineConfig::from_lookup(|name| env.get(name).cloned()).unwrap();
        assert_eq!(config.address(), "10.1.2.3:9000");
        assert!(config.needs_auth());
        assert_eq!(config.username.as_deref(), Some("reader"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = EngineConfig::from_lookup(|name| {
            (name == "CONTENT_CACHE_PORT").then(|| "not-a-port".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, CacheError::ConfigError(_)));
        assert!(err.to_string().contains("CONTENT_CACHE_PORT"));

        let err = EngineConfig::from_lookup(|name| {
            (name == "CONTENT_CACHE_AUTH_REQUIRED").then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, CacheError::ConfigError(_)));
    }
}
