//! Integration tests for the cache layer
//!
//! Exercises configuration, pooling, serialization and key derivation end to
//! end against the in-process memory store.

use cachehaus::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub customer: String,
    pub total_cents: i64,
}

struct OrderService;

fn test_config() -> AppConfig {
    AppConfig::from_toml_str(
        r#"
        [redis]
        host = "cache.test"
        port = ""
        database = "abc"

        [pool]
        max_total = 2
        min_idle = 0
        max_wait_ms = 50
        eviction_interval_ms = 0
        "#,
    )
    .expect("valid test configuration")
}

fn memory_cachehaus(store: &MemoryStore) -> CacheHaus<MemoryConnectionFactory> {
    let config = test_config();
    let factory = MemoryConnectionFactory::with_endpoint(store.clone(), config.endpoint());
    CacheHaus::with_factory(factory, config)
}

#[tokio::test(start_paused = true)]
async fn test_put_get_expire_round_trip() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let cachehaus = memory_cachehaus(&store);
    let cache = cachehaus.manager();

    let order = Order {
        id: 42,
        customer: "ACME".to_string(),
        total_cents: 1999,
    };
    let key = cache.key(simple_type_name::<OrderService>(), "save", &[&order.id]);
    assert_eq!(key, "OrderServicesave42");

    cache.put(&key, &order, Some(Duration::from_secs(5))).await?;
    let cached: Option<Order> = cache.get(&key).await?;
    assert_eq!(cached, Some(order));

    tokio::time::advance(Duration::from_secs(6)).await;
    let expired: Option<Order> = cache.get(&key).await?;
    assert_eq!(expired, None);

    cachehaus.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_effective_endpoint_uses_defaults() {
    let store = MemoryStore::new();
    let cachehaus = memory_cachehaus(&store);
    let pool = cachehaus.manager().pool();

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.endpoint().host, "cache.test");
    assert_eq!(conn.endpoint().port, 6379);
    assert_eq!(conn.endpoint().database, 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_surfaces_as_store_unavailable() {
    let store = MemoryStore::new();
    let cachehaus = memory_cachehaus(&store);
    let cache = cachehaus.manager();
    let pool = cache.pool();

    let first = pool.get().await.unwrap();
    let second = pool.get().await.unwrap();
    assert!(matches!(
        pool.get().await,
        Err(PoolError::Exhausted(_))
    ));

    let err = cache.put("k", &1, None).await.unwrap_err();
    assert!(err.is_retryable());

    drop((first, second));
    cache.put("k", &1, None).await.unwrap();
    assert_eq!(cache.get::<i32>("k").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_health_check_follows_store() {
    let store = MemoryStore::new();
    let cachehaus = memory_cachehaus(&store);

    assert!(cachehaus.health_check().await.is_ok());
    store.set_online(false);
    assert!(matches!(
        cachehaus.health_check().await,
        Err(CacheHausError::Cache(CacheError::StoreUnavailable(_)))
    ));
}

#[tokio::test]
async fn test_clones_share_the_pool() {
    let store = MemoryStore::new();
    let cachehaus = memory_cachehaus(&store);
    let cache = cachehaus.manager().clone();

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            let key = cache.key("Counter", "set", &[&i]);
            cache.put(&key, &i, None).await.unwrap();
            cache.get::<u32>(&key).await.unwrap()
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Some(i as u32));
    }

    assert_eq!(store.len(), 16);
    assert!(cachehaus.manager().pool().state().live <= 2);
}

#[tokio::test]
async fn test_shutdown_closes_pool() {
    let store = MemoryStore::new();
    let cachehaus = memory_cachehaus(&store);
    let cache = cachehaus.manager().clone();

    cache.put("k", &"v", None).await.unwrap();
    cachehaus.shutdown().await;

    assert!(cache.pool().is_closed());
    let err = cache.get::<String>("k").await.unwrap_err();
    assert!(matches!(err, CacheError::StoreUnavailable(_)));
}
