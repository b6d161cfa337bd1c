//! Error types for the cachehaus crate
//!
//! This module contains all error types that can be returned by cachehaus operations.

use cache_system::CacheError;
use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheHausError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}
