//! # cachehaus
//!
//! A pooled Redis caching client: a bounded connection pool with
//! health-checking and idle eviction, a deterministic JSON serializer,
//! call-signature key derivation and a get/put/evict/expire facade.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachehaus::prelude::*;
//! use std::time::Duration;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! pub struct Order {
//!     pub id: u64,
//!     pub total_cents: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // .env, CACHEHAUS_CONFIG / ./cachehaus.toml, then REDIS_* variables
//!     let cachehaus = CacheHaus::from_env()?;
//!     let cache = cachehaus.manager();
//!
//!     let order = Order { id: 42, total_cents: 1999 };
//!     let key = cache.key("OrderService", "find", &[&order.id]);
//!
//!     cache.put(&key, &order, Some(Duration::from_secs(300))).await?;
//!     let cached: Option<Order> = cache.get(&key).await?;
//!     println!("cached: {:?}", cached);
//!
//!     cache.evict(&key).await?;
//!     cachehaus.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::CacheHaus;
pub use errors::CacheHausError;

// Re-export centralized config
pub use config::{AppConfig, CacheSettings, ConfigError, Endpoint, PoolConfig, RedisSettings};

// Re-export internal crates used by the public API
pub use cache_system;
pub use config;

// Re-export external dependencies used in public API
pub use async_trait;
pub use anyhow;
