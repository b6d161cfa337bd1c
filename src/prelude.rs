//! Convenience re-exports for common cachehaus usage
//!
//! This prelude module re-exports the most commonly used items from the cachehaus ecosystem,
//! making it easier to import everything you need with a single use statement.
//!
//! # Example
//!
//! ```rust
//! use cachehaus::prelude::*;
//!
//! // Now you have access to all the common cachehaus types and traits
//! let key = ConcatKeyGenerator.generate("Order", "save", &[&42]);
//! assert_eq!(key, "Ordersave42");
//! ```

// Core cachehaus components
pub use crate::core::CacheHaus;
pub use crate::errors::CacheHausError;

// Re-export centralized config
pub use config::{AppConfig, CacheSettings, ConfigError, Endpoint, PoolConfig, RedisSettings};

// Re-export cache system
pub use cache_system::prelude::*;

// Common external dependencies
pub use anyhow;
pub use async_trait;
pub use tokio;
