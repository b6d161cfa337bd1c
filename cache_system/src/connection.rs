//! Store connection abstraction
//!
//! The pool is generic over a [`ConnectionFactory`], which opens and
//! validates [`StoreConnection`]s. Redis and an in-process memory store
//! implement both traits.

use async_trait::async_trait;
use config::{Endpoint, duration_millis};
use redis::RedisError;
use std::time::Duration;

/// One transport session with the store
///
/// Keys and values are raw bytes; encoding is the cache manager's job.
#[async_trait]
pub trait StoreConnection: Send + 'static {
    /// GET; `None` when the key does not exist
    async fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, RedisError>;

    /// SET, with a TTL when given
    async fn store(
        &mut self,
        key: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), RedisError>;

    /// DEL; `true` when a key was removed
    async fn remove(&mut self, key: &[u8]) -> Result<bool, RedisError>;

    /// EXPIRE; `true` when the key exists and the TTL was set
    async fn set_expiry(&mut self, key: &[u8], ttl: Duration) -> Result<bool, RedisError>;

    /// Remaining TTL; `None` for missing keys and keys without expiry
    async fn time_to_live(&mut self, key: &[u8]) -> Result<Option<Duration>, RedisError>;

    /// Lightweight liveness probe (PING)
    async fn check_alive(&mut self) -> Result<(), RedisError>;
}

/// Opens and validates connections for a [`Pool`](crate::pool::Pool)
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Open a new, authenticated connection with the database selected
    async fn connect(&self) -> Result<Self::Connection, RedisError>;

    /// Validation used by the pool's test-on-* flags
    async fn is_valid(&self, conn: &mut Self::Connection) -> bool {
        conn.check_alive().await.is_ok()
    }

    /// Endpoint every connection of this factory talks to
    fn endpoint(&self) -> &Endpoint;
}

/// Round a TTL up to whole milliseconds, at least one
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    let millis = duration_millis(ttl);
    let millis = if Duration::from_millis(millis) < ttl {
        millis.saturating_add(1)
    } else {
        millis
    };
    millis.max(1)
}
