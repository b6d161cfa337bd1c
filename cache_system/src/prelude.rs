//! Convenience re-exports for common cache-system usage

// Core cache system components
pub use crate::connection::{ConnectionFactory, StoreConnection};
pub use crate::errors::{CacheError, PoolError};
pub use crate::keys::{ConcatKeyGenerator, DelimitedKeyGenerator, KeyGenerator, simple_type_name};
pub use crate::manager::CacheManager;
pub use crate::memory::{MemoryConnectionFactory, MemoryStore};
pub use crate::pool::{Pool, PoolState, PooledConnection};
pub use crate::redis_store::RedisConnectionFactory;
pub use crate::serializer::JsonSerializer;

// Re-export centralized config
pub use config::{CacheSettings, Endpoint, PoolConfig};

// Common external dependencies
pub use async_trait::async_trait;
pub use redis;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;
