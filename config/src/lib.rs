//! # Configuration Management for cachehaus
//!
//! This crate provides the centralized configuration structures for the
//! cache layer: the store endpoint, connection pool tuning and cache
//! defaults.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{CacheSettings, Endpoint, PoolConfig};
//! use std::time::Duration;
//!
//! let endpoint = Endpoint::new("localhost".to_string(), 6379)
//!     .with_database(1);
//!
//! let pool = PoolConfig::default()
//!     .with_max_total(16)
//!     .with_max_wait(Duration::from_millis(500));
//!
//! let cache = CacheSettings::new(300, "orders:");
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [redis]
//! host = "127.0.0.1"
//! port = 6379
//! password = ""
//! database = "0"
//!
//! [pool]
//! max_total = -1
//! max_idle = 1000
//! min_idle = 5
//! max_wait_ms = 3000
//! test_on_borrow = true
//!
//! [cache]
//! default_ttl_seconds = 0
//! key_prefix = ""
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // From CACHEHAUS_CONFIG, ./cachehaus.toml or defaults, plus REDIS_* env vars
//! let config = AppConfig::load()?;
//!
//! // Or from a custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

pub mod endpoint;
pub mod pool;

use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};
use thiserror::Error;

pub use endpoint::{
    Endpoint, RawScalar, RedisSettings, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT,
};
pub use pool::PoolConfig;

const DEFAULT_CONFIG_PATH: &str = "./cachehaus.toml";

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

const CONFIG_PATH_VAR: &str = "CACHEHAUS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
}

/// Complete cache layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub redis: RedisSettings,
    pub pool: PoolConfig,
    pub cache: CacheSettings,
}

/// Cache-wide defaults applied by the cache manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL used when a write does not specify one, 0 means no expiry
    pub default_ttl_seconds: u64,
    /// Prepended to every key before it reaches the store
    pub key_prefix: String,
}

impl CacheSettings {
    pub fn new(default_ttl_seconds: u64, key_prefix: &str) -> Self {
        Self {
            default_ttl_seconds,
            key_prefix: key_prefix.to_string(),
        }
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_seconds > 0).then(|| Duration::from_secs(self.default_ttl_seconds))
    }
}

impl AppConfig {
    /// Load configuration from `.env`, the TOML file it points at (or the
    /// default path) and `REDIS_*` environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let mut config = if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::from_file(&config_path)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };

        config.redis.apply_env();
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.pool = config.pool.sanitized();
        Ok(config)
    }

    /// Resolved store endpoint
    pub fn endpoint(&self) -> Endpoint {
        self.redis.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.endpoint(), Endpoint::default());
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.cache, CacheSettings::default());
        assert_eq!(config.cache.default_ttl(), None);
    }

    #[test]
    fn test_full_document() {
        let config = AppConfig::from_toml_str(
            r#"
            [redis]
            host = "cache.internal"
            port = 6380
            password = "pw"
            database = "3"

            [pool]
            max_total = 8
            max_idle = 4
            min_idle = 6
            max_wait_ms = 250

            [cache]
            default_ttl_seconds = 60
            key_prefix = "app:"
            "#,
        )
        .unwrap();

        let endpoint = config.endpoint();
        assert_eq!(endpoint.host, "cache.internal");
        assert_eq!(endpoint.port, 6380);
        assert_eq!(endpoint.password.as_deref(), Some("pw"));
        assert_eq!(endpoint.database, 3);

        assert_eq!(config.pool.max_total_limit(), Some(8));
        // clamped to max_idle
        assert_eq!(config.pool.min_idle, 4);
        assert_eq!(config.pool.max_wait(), Duration::from_millis(250));
        assert!(config.pool.test_on_borrow);

        assert_eq!(config.cache.default_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.cache.key_prefix, "app:");
    }

    #[test]
    fn test_malformed_redis_values_are_forgiven() {
        let config = AppConfig::from_toml_str(
            r#"
            [redis]
            port = "not-a-port"
            database = "abc"
            "#,
        )
        .unwrap();
        let endpoint = config.endpoint();
        assert_eq!(endpoint.port, DEFAULT_PORT);
        assert_eq!(endpoint.database, DEFAULT_DATABASE);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let result = AppConfig::from_toml_str("[pool\nmax_total = ");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AppConfig::from_file("/definitely/not/here/cachehaus.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
