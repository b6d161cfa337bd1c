//! Core cachehaus functionality
//!
//! This module contains the main CacheHaus struct, which builds the endpoint,
//! pool, serializer and cache manager once at startup and hands them out
//! explicitly to whatever needs cache access.

use cache_system::{CacheManager, ConnectionFactory, Pool, RedisConnectionFactory};
use config::AppConfig;
use tokio::task::JoinHandle;

use crate::errors::CacheHausError;

/// Main coordinator owning the cache manager and its background evictor
pub struct CacheHaus<F: ConnectionFactory = RedisConnectionFactory> {
    manager: CacheManager<F>,
    evictor: Option<JoinHandle<()>>,
}

impl<F: ConnectionFactory> std::fmt::Debug for CacheHaus<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHaus")
            .field("manager", &self.manager)
            .field("evictor_running", &self.evictor.is_some())
            .finish()
    }
}

impl CacheHaus<RedisConnectionFactory> {
    /// Create a Redis-backed cache layer from configuration
    ///
    /// Must be called within a tokio runtime when the pool has an eviction
    /// interval, since the evictor is spawned here.
    pub fn new(config: AppConfig) -> Result<Self, CacheHausError> {
        let factory = RedisConnectionFactory::new(config.endpoint())?;
        Ok(Self::with_factory(factory, config))
    }

    /// Load configuration from `.env`, TOML and `REDIS_*` variables, then
    /// create the cache layer
    pub fn from_env() -> Result<Self, CacheHausError> {
        let config = AppConfig::load()?;
        Self::new(config)
    }
}

impl<F: ConnectionFactory> CacheHaus<F> {
    /// Create a cache layer over any connection factory
    pub fn with_factory(factory: F, config: AppConfig) -> Self {
        let pool = Pool::new(factory, config.pool);
        let evictor = pool.spawn_evictor();
        debug_log!("cache layer ready, evictor running: {}", evictor.is_some());
        let manager = CacheManager::with_pool(pool, config.cache);

        Self { manager, evictor }
    }

    /// Cache manager handle; clones share the pool
    pub fn manager(&self) -> &CacheManager<F> {
        &self.manager
    }

    /// Check store connectivity
    pub async fn health_check(&self) -> Result<(), CacheHausError> {
        self.manager.ping().await?;
        Ok(())
    }

    /// Close the pool and wait for the evictor to stop
    pub async fn shutdown(mut self) {
        trace_log!("shutting down cache layer");
        self.manager.close();
        if let Some(evictor) = self.evictor.take() {
            evictor.abort();
            let _ = evictor.await;
        }
    }
}
