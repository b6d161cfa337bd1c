//! In-process store
//!
//! A `HashMap` behind a mutex with Redis-like TTL semantics. Useful for
//! tests and local development where no Redis server is around. The store
//! can be switched offline to simulate transport failures.

use crate::connection::{ConnectionFactory, StoreConnection};
use async_trait::async_trait;
use config::Endpoint;
use redis::{ErrorKind, RedisError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: Mutex<HashMap<Vec<u8>, MemoryEntry>>,
    offline: AtomicBool,
}

/// Shared handle to an in-process key-value store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Vec<u8>, MemoryEntry>> {
        self.state
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every connection attempt, command and probe fail
    pub fn set_online(&self, online: bool) {
        self.state.offline.store(!online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        !self.state.offline.load(Ordering::SeqCst)
    }

    /// Whether a live (unexpired) entry exists under the raw key
    pub fn contains(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        self.entries()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of live entries; expired ones are dropped on the way
    pub fn len(&self) -> usize {
        let mut entries = self.entries();
        Self::purge_expired(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_online(&self) -> Result<(), RedisError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(RedisError::from((ErrorKind::IoError, "memory store is offline")))
        }
    }

    fn purge_expired(entries: &mut HashMap<Vec<u8>, MemoryEntry>) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// `None` when the deadline is past what the clock can represent
    fn deadline(ttl: Duration) -> Option<Instant> {
        Instant::now().checked_add(ttl)
    }

    fn live_entry(
        entries: &mut HashMap<Vec<u8>, MemoryEntry>,
        key: &[u8],
    ) -> Option<MemoryEntry> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }
}

/// Opens connections to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnectionFactory {
    store: MemoryStore,
    endpoint: Endpoint,
    connects: AtomicUsize,
}

impl MemoryConnectionFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self::with_endpoint(store, Endpoint::default())
    }

    /// The endpoint is only reported back, nothing listens on it
    pub fn with_endpoint(store: MemoryStore, endpoint: Endpoint) -> Self {
        Self {
            store,
            endpoint,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Number of successful `connect` calls
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, RedisError> {
        self.store.ensure_online()?;
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MemoryConnection {
            id,
            store: self.store.clone(),
            endpoint: self.endpoint.clone(),
        })
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// A connection to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    id: usize,
    store: MemoryStore,
    endpoint: Endpoint,
}

impl MemoryConnection {
    /// Sequence number of this connection within its factory, from 1
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn fetch(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, RedisError> {
        self.store.ensure_online()?;
        let mut entries = self.store.entries();
        Ok(MemoryStore::live_entry(&mut entries, key).map(|entry| entry.value))
    }

    async fn store(
        &mut self,
        key: &[u8],
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), RedisError> {
        self.store.ensure_online()?;
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: ttl.and_then(MemoryStore::deadline),
        };
        let mut entries = self.store.entries();
        MemoryStore::purge_expired(&mut entries);
        entries.insert(key.to_vec(), entry);
        Ok(())
    }

    async fn remove(&mut self, key: &[u8]) -> Result<bool, RedisError> {
        self.store.ensure_online()?;
        let mut entries = self.store.entries();
        let existed = MemoryStore::live_entry(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn set_expiry(&mut self, key: &[u8], ttl: Duration) -> Result<bool, RedisError> {
        self.store.ensure_online()?;
        let mut entries = self.store.entries();
        if MemoryStore::live_entry(&mut entries, key).is_none() {
            return Ok(false);
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = MemoryStore::deadline(ttl);
        }
        Ok(true)
    }

    async fn time_to_live(&mut self, key: &[u8]) -> Result<Option<Duration>, RedisError> {
        self.store.ensure_online()?;
        let mut entries = self.store.entries();
        let now = Instant::now();
        Ok(MemoryStore::live_entry(&mut entries, key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn check_alive(&mut self) -> Result<(), RedisError> {
        self.store.ensure_online()
    }
}
