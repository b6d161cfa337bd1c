//! Cache manager implementation
//!
//! This module provides the main CacheManager struct, the single entry
//! point for get/put/evict/expire on top of the connection pool.

use crate::connection::{ConnectionFactory, StoreConnection};
use crate::errors::CacheError;
use crate::keys::{ConcatKeyGenerator, KeyGenerator};
use crate::pool::{Pool, PooledConnection};
use crate::redis_store::RedisConnectionFactory;
use crate::serializer::JsonSerializer;
use config::{AppConfig, CacheSettings, Endpoint, PoolConfig};
use redis::RedisError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Pooled, serializing cache client
///
/// Holds no state between calls besides the pool; cloning is cheap and
/// clones share the pool.
pub struct CacheManager<F: ConnectionFactory = RedisConnectionFactory> {
    pool: Pool<F>,
    serializer: JsonSerializer,
    key_generator: Arc<dyn KeyGenerator>,
    settings: Arc<CacheSettings>,
}

impl<F: ConnectionFactory> Clone for CacheManager<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            serializer: self.serializer,
            key_generator: self.key_generator.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<F: ConnectionFactory> Debug for CacheManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("settings", &self.settings)
            .field("pool", &self.pool)
            .finish()
    }
}

impl CacheManager<RedisConnectionFactory> {
    /// Create a Redis-backed cache manager; connections are opened lazily
    pub fn new(
        endpoint: Endpoint,
        pool_config: PoolConfig,
        settings: CacheSettings,
    ) -> Result<Self, CacheError> {
        let factory = RedisConnectionFactory::new(endpoint)?;
        Ok(Self::with_pool(Pool::new(factory, pool_config), settings))
    }

    /// Create a Redis-backed cache manager from a loaded configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, CacheError> {
        Self::new(config.endpoint(), config.pool.clone(), config.cache.clone())
    }
}

impl<F: ConnectionFactory> CacheManager<F> {
    pub fn with_pool(pool: Pool<F>, settings: CacheSettings) -> Self {
        tracing::info!(
            endpoint = %pool.endpoint().address(),
            "cache manager initialized"
        );
        Self {
            pool,
            serializer: JsonSerializer,
            key_generator: Arc::new(ConcatKeyGenerator),
            settings: Arc::new(settings),
        }
    }

    /// Replace the default [`ConcatKeyGenerator`]
    pub fn with_key_generator<G: KeyGenerator + 'static>(mut self, generator: G) -> Self {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Derive a cache key from a call signature
    pub fn key(&self, owner: &str, operation: &str, args: &[&dyn Display]) -> String {
        self.key_generator.generate(owner, operation, args)
    }

    /// Key as written to the store: prefixed, then JSON-encoded
    fn storage_key(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        if self.settings.key_prefix.is_empty() {
            self.serializer.serialize(key)
        } else {
            self.serializer
                .serialize(&format!("{}{}", self.settings.key_prefix, key))
        }
    }

    async fn checkout(&self) -> Result<PooledConnection<F>, CacheError> {
        Ok(self.pool.get().await?)
    }

    /// Release the connection after a store round trip; a failed round trip
    /// discards it instead
    async fn settle<T>(
        &self,
        conn: PooledConnection<F>,
        result: Result<T, RedisError>,
    ) -> Result<T, CacheError> {
        match result {
            Ok(value) => {
                self.pool.release(conn).await;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "store command failed, discarding connection");
                conn.discard();
                Err(err.into())
            }
        }
    }

    /// Raw stored bytes for a key, `None` when absent
    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let storage_key = self.storage_key(key)?;
        let mut conn = self.checkout().await?;
        let result = conn.fetch(&storage_key).await;
        self.settle(conn, result).await
    }

    /// Cached value for a key, `None` when absent
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(self.serializer.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store a value
    ///
    /// Without an explicit TTL the configured default applies; a zero TTL,
    /// or no TTL and no default, stores the entry without expiry.
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let storage_key = self.storage_key(key)?;
        let bytes = self.serializer.serialize(value)?;
        let ttl = ttl
            .or_else(|| self.settings.default_ttl())
            .filter(|ttl| !ttl.is_zero());

        let mut conn = self.checkout().await?;
        let result = conn.store(&storage_key, &bytes, ttl).await;
        self.settle(conn, result).await
    }

    /// Remove a key; `false` when it did not exist
    pub async fn evict(&self, key: &str) -> Result<bool, CacheError> {
        let storage_key = self.storage_key(key)?;
        let mut conn = self.checkout().await?;
        let result = conn.remove(&storage_key).await;
        self.settle(conn, result).await
    }

    /// Set a TTL on an existing key; `false` when it did not exist
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let storage_key = self.storage_key(key)?;
        let mut conn = self.checkout().await?;
        let result = conn.set_expiry(&storage_key, ttl).await;
        self.settle(conn, result).await
    }

    /// Remaining TTL; `None` for missing keys and keys without expiry
    pub async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let storage_key = self.storage_key(key)?;
        let mut conn = self.checkout().await?;
        let result = conn.time_to_live(&storage_key).await;
        self.settle(conn, result).await
    }

    /// Read-through: return the cached value, or compute, store and return
    /// it on a miss
    pub async fn get_or_compute<T, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: impl FnOnce() -> Fut,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.get(key).await? {
            trace_log!("cache hit for {}", key);
            return Ok(hit);
        }
        trace_log!("cache miss for {}", key);

        let value = compute().await;
        self.put(key, &value, ttl).await?;
        Ok(value)
    }

    /// Round trip to the store
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.checkout().await?;
        let result = conn.check_alive().await;
        self.settle(conn, result).await
    }

    /// Close the underlying pool
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }

    pub fn serializer(&self) -> &JsonSerializer {
        &self.serializer
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::DelimitedKeyGenerator;
    use crate::memory::{MemoryConnectionFactory, MemoryStore};
    use crate::pool::PoolState;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u32,
        name: String,
        tags: Vec<String>,
    }

    fn profile() -> Profile {
        Profile {
            id: 7,
            name: "Ada".to_string(),
            tags: vec!["admin".to_string()],
        }
    }

    fn memory_manager(settings: CacheSettings) -> (CacheManager<MemoryConnectionFactory>, MemoryStore) {
        let store = MemoryStore::new();
        let config = PoolConfig::default()
            .with_max_total(4)
            .with_min_idle(0)
            .with_max_wait(Duration::from_millis(50))
            .with_eviction_interval(None);
        let pool = Pool::new(MemoryConnectionFactory::new(store.clone()), config);
        (CacheManager::with_pool(pool, settings), store)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (cache, _store) = memory_manager(CacheSettings::default());

        cache.put("profile:7", &profile(), None).await.unwrap();
        let cached: Option<Profile> = cache.get("profile:7").await.unwrap();
        assert_eq!(cached, Some(profile()));

        let missing: Option<Profile> = cache.get("profile:8").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let (cache, _store) = memory_manager(CacheSettings::default());

        cache
            .put("k", &"v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(
            cache.time_to_live("k").await.unwrap(),
            Some(Duration::from_secs(5))
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get::<String>("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies() {
        let (cache, _store) = memory_manager(CacheSettings::new(10, ""));

        cache.put("k", &1, None).await.unwrap();
        assert_eq!(
            cache.time_to_live("k").await.unwrap(),
            Some(Duration::from_secs(10))
        );

        cache.put("forever", &1, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(cache.time_to_live("forever").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_prefixed_and_json_encoded() {
        let (cache, store) = memory_manager(CacheSettings::new(0, "app:"));

        cache.put("user", &1, None).await.unwrap();
        assert!(store.contains(b"\"app:user\""));
        assert!(!store.contains(b"app:user"));
    }

    #[tokio::test]
    async fn test_evict_and_expire() {
        let (cache, _store) = memory_manager(CacheSettings::default());

        assert!(!cache.evict("missing").await.unwrap());
        assert!(!cache.expire("missing", Duration::from_secs(1)).await.unwrap());

        cache.put("k", &[1, 2, 3], None).await.unwrap();
        assert!(cache.expire("k", Duration::from_secs(30)).await.unwrap());
        assert!(cache.evict("k").await.unwrap());
        assert_eq!(cache.get_raw("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connections_are_released_on_every_path() {
        let (cache, store) = memory_manager(CacheSettings::default());

        cache.put("k", &"v", None).await.unwrap();
        cache.get::<String>("k").await.unwrap();

        // wrong shape: the round trip succeeded, decoding did not
        let decoded = cache.get::<Vec<u32>>("k").await;
        assert!(matches!(decoded, Err(CacheError::Deserialization(_))));
        assert_eq!(cache.pool().state().borrowed, 0);
        assert_eq!(cache.pool().idle_count(), 1);

        store.set_online(false);
        let failed = cache.get_raw("k").await;
        assert!(matches!(failed, Err(CacheError::StoreUnavailable(_))));

        let PoolState { borrowed, idle, live, .. } = cache.pool().state();
        assert_eq!((borrowed, idle, live), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_store_failures_are_store_unavailable() {
        let (cache, store) = memory_manager(CacheSettings::default());
        store.set_online(false);

        let err = cache.put("k", &"v", None).await.unwrap_err();
        assert!(matches!(err, CacheError::StoreUnavailable(_)));
        assert!(err.is_retryable());
        assert!(cache.ping().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_pool_is_store_unavailable() {
        let (cache, _store) = memory_manager(CacheSettings::default());

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(cache.pool().get().await.unwrap());
        }

        let err = cache.put("k", &"v", None).await.unwrap_err();
        assert!(matches!(err, CacheError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_serialization_error_does_not_borrow() {
        let (cache, _store) = memory_manager(CacheSettings::default());
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1);

        let err = cache.put("k", &map, None).await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert!(!err.is_retryable());
        assert_eq!(cache.pool().state().created, 0);
    }

    #[tokio::test]
    async fn test_get_or_compute_computes_once() {
        let (cache, _store) = memory_manager(CacheSettings::default());
        let key = cache.key("ProfileService", "load", &[&7]);
        assert_eq!(key, "ProfileServiceload7");

        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let loaded: Profile = cache
                .get_or_compute(&key, None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    profile()
                })
                .await
                .unwrap();
            assert_eq!(loaded, profile());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_discards_connection() {
        let store = MemoryStore::new();
        let config = PoolConfig::default()
            .with_max_total(2)
            .with_min_idle(0)
            .with_validation(false, false, false, false)
            .with_eviction_interval(None);
        let pool = Pool::new(MemoryConnectionFactory::new(store.clone()), config);
        let cache = CacheManager::with_pool(pool, CacheSettings::default());

        cache.put("k", &"v", None).await.unwrap();
        assert_eq!(cache.pool().state().live, 1);

        store.set_online(false);
        assert!(cache.get_raw("k").await.is_err());
        let state = cache.pool().state();
        assert_eq!((state.live, state.idle, state.destroyed), (0, 0, 1));

        store.set_online(true);
        assert_eq!(cache.get::<String>("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_custom_key_generator() {
        let (cache, _store) = memory_manager(CacheSettings::default());
        let cache = cache.with_key_generator(DelimitedKeyGenerator::default());
        assert_eq!(cache.key("Order", "save", &[&42]), "Order:save:42");
    }
}
