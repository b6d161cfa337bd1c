//! Error types for cache operations
//!
//! This module defines all error types that can occur
//! during pool management, serialization and Redis interactions.

use std::time::Duration;
use thiserror::Error;

/// Connection pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Connection pool exhausted: no connection available within {0:?}")]
    Exhausted(Duration),

    #[error("Unable to open a usable connection: {0}")]
    Unavailable(String),

    #[error("Connection pool is closed")]
    Closed,
}

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),
}

impl CacheError {
    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }
}

impl From<PoolError> for CacheError {
    fn from(err: PoolError) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}
