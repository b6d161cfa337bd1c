//! Redis-backed connections
//!
//! Each pooled connection owns its own multiplexed Redis connection. AUTH
//! and SELECT are performed by the client handshake from the endpoint.

use crate::connection::{ConnectionFactory, StoreConnection, ttl_millis};
use crate::errors::CacheError;
use async_trait::async_trait;
use config::Endpoint;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ErrorKind, IntoConnectionInfo, RedisError};
use std::time::Duration;

/// Opens Redis connections for one endpoint
pub struct RedisConnectionFactory {
    client: Client,
    endpoint: Endpoint,
}

impl std::fmt::Debug for RedisConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnectionFactory")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl RedisConnectionFactory {
    /// Create a factory; no connection is opened yet
    pub fn new(endpoint: Endpoint) -> Result<Self, CacheError> {
        let mut info = (endpoint.host.as_str(), endpoint.port)
            .into_connection_info()
            .map_err(|e| CacheError::Config(e.to_string()))?;
        info.redis.db = i64::from(endpoint.database);
        info.redis.password = endpoint.password.clone();

        let client = Client::open(info).map_err(|e| CacheError::Config(e.to_string()))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnectionFactory {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection, RedisError> {
        let timeout = self.endpoint.connect_timeout();
        let connect = self.client.get_multiplexed_async_connection();

        match tokio::time::timeout(timeout, connect).await {
            Ok(conn) => Ok(RedisConnection { inner: conn? }),
            Err(_) => Err(RedisError::from((
                ErrorKind::IoError,
                "timed out connecting to redis",
            ))),
        }
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// A pooled Redis connection
#[derive(Clone)]
pub struct RedisConnection {
    inner: MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, RedisError> {
        let value: Option<Vec<u8>> = self.inner.get(key).await?;
        Ok(value)
    }

    async fn store(
        &mut self,
        key: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), RedisError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut self.inner).await?;
        Ok(())
    }

    async fn remove(&mut self, key: &[u8]) -> Result<bool, RedisError> {
        let deleted: i64 = self.inner.del(key).await?;
        Ok(deleted > 0)
    }

    async fn set_expiry(&mut self, key: &[u8], ttl: Duration) -> Result<bool, RedisError> {
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut self.inner)
            .await?;
        Ok(updated == 1)
    }

    async fn time_to_live(&mut self, key: &[u8]) -> Result<Option<Duration>, RedisError> {
        // -2: missing key, -1: no expiry
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut self.inner)
            .await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn check_alive(&mut self) -> Result<(), RedisError> {
        let _: String = redis::cmd("PING").query_async(&mut self.inner).await?;
        Ok(())
    }
}
