//! Cache system for Redis-based caching
//!
//! This crate provides a bounded connection pool, a JSON serializer, cache
//! key derivation and the [`CacheManager`] facade that ties them together.

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod connection;
pub mod errors;
pub mod keys;
pub mod manager;
pub mod memory;
pub mod pool;
pub mod prelude;
pub mod redis_store;
pub mod serializer;

// Re-export centralized config
pub use config::{CacheSettings, Endpoint, PoolConfig};

pub use connection::{ConnectionFactory, StoreConnection};
pub use errors::{CacheError, PoolError};
pub use keys::{ConcatKeyGenerator, DelimitedKeyGenerator, KeyGenerator, simple_type_name};
pub use manager::CacheManager;
pub use memory::{MemoryConnection, MemoryConnectionFactory, MemoryStore};
pub use pool::{Pool, PoolState, PooledConnection};
pub use redis_store::{RedisConnection, RedisConnectionFactory};
pub use serializer::JsonSerializer;
