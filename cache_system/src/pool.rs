//! Bounded connection pool
//!
//! The pool lends connections exclusively to one caller at a time. A
//! semaphore with `max_total` permits bounds the number of borrowed
//! connections; each [`PooledConnection`] holds one permit until it is
//! released or dropped. Idle connections live in a LIFO deque guarded by a
//! mutex that is never held across an await point.

use crate::connection::ConnectionFactory;
use crate::errors::PoolError;
use config::{Endpoint, PoolConfig};
use redis::RedisError;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

struct IdleConnection<C> {
    conn: C,
    idle_since: Instant,
}

enum CreateError {
    Connect(RedisError),
    Invalid,
}

/// A live connection that is in neither the idle set nor a borrower's hands
///
/// Closed on drop unless [`kept`](Self::kept), so a caller cancelled while
/// the connection is being validated still settles the live count.
struct InFlight<'a, F: ConnectionFactory> {
    pool: &'a PoolInner<F>,
    conn: Option<F::Connection>,
}

impl<'a, F: ConnectionFactory> InFlight<'a, F> {
    fn new(pool: &'a PoolInner<F>, conn: F::Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    async fn validate(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => self.pool.factory.is_valid(conn).await,
            None => false,
        }
    }

    fn kept(mut self) -> Option<F::Connection> {
        self.conn.take()
    }
}

impl<F: ConnectionFactory> Drop for InFlight<'_, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.destroy(conn);
        }
    }
}

/// Idle connections taken out for an eviction scan
///
/// Whatever has not been evicted goes back to the old end of the idle set on
/// drop, including candidates left unscanned by a cancelled scan.
struct EvictionScan<'a, F: ConnectionFactory> {
    pool: &'a PoolInner<F>,
    pending: VecDeque<IdleConnection<F::Connection>>,
    survivors: Vec<IdleConnection<F::Connection>>,
}

impl<F: ConnectionFactory> Drop for EvictionScan<'_, F> {
    fn drop(&mut self) {
        let mut remaining = std::mem::take(&mut self.survivors);
        remaining.extend(self.pending.drain(..));
        if !remaining.is_empty() {
            self.pool.restore_survivors(remaining);
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub idle: usize,
    pub borrowed: usize,
    pub live: usize,
    pub created: u64,
    pub destroyed: u64,
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    idle: Mutex<VecDeque<IdleConnection<F::Connection>>>,
    permits: Option<Arc<Semaphore>>,
    closed: AtomicBool,
    live: AtomicUsize,
    borrowed: AtomicUsize,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection<F::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn pop_idle(&self) -> Option<IdleConnection<F::Connection>> {
        self.idle().pop_back()
    }

    async fn create(&self, for_borrow: bool) -> Result<F::Connection, CreateError> {
        let conn = self.factory.connect().await.map_err(CreateError::Connect)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        trace_log!("opened connection to {}", self.factory.endpoint().address());

        let mut conn = InFlight::new(self, conn);
        let validate = self.config.test_on_create || (for_borrow && self.config.test_on_borrow);
        if validate && !conn.validate().await {
            return Err(CreateError::Invalid);
        }
        conn.kept().ok_or(CreateError::Invalid)
    }

    async fn checkout(&self) -> Result<F::Connection, PoolError> {
        while let Some(idle) = self.pop_idle() {
            let mut conn = InFlight::new(self, idle.conn);
            if self.config.test_on_borrow && !conn.validate().await {
                debug_log!("idle connection failed validation on borrow, discarding");
                continue;
            }
            if let Some(conn) = conn.kept() {
                return Ok(conn);
            }
        }

        let created = match self.create(true).await {
            Err(CreateError::Invalid) => {
                debug_log!("new connection failed validation, retrying once");
                self.create(true).await
            }
            other => other,
        };

        created.map_err(|err| match err {
            CreateError::Connect(err) => PoolError::Unavailable(err.to_string()),
            CreateError::Invalid => {
                PoolError::Unavailable("new connections keep failing validation".to_string())
            }
        })
    }

    /// Put a connection back into the idle set, or close it when the pool
    /// is closed or the idle set is full
    fn return_idle(&self, conn: F::Connection) {
        let rejected = {
            let mut idle = self.idle();
            let full = self
                .config
                .max_idle_limit()
                .is_some_and(|max_idle| idle.len() >= max_idle);
            if self.is_closed() || full {
                Some(conn)
            } else {
                idle.push_back(IdleConnection {
                    conn,
                    idle_since: Instant::now(),
                });
                None
            }
        };

        if let Some(conn) = rejected {
            self.destroy(conn);
        }
    }

    fn destroy(&self, conn: F::Connection) {
        drop(conn);
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        trace_log!("closed connection to {}", self.factory.endpoint().address());
    }

    /// Take the oldest idle connections out for an eviction scan
    fn take_eviction_batch(&self) -> (EvictionScan<'_, F>, usize) {
        let mut idle = self.idle();
        let total = idle.len();
        let batch = (self.config.eviction_batch_size as usize).min(total);
        let pending: VecDeque<_> = idle.drain(..batch).collect();
        let scan = EvictionScan {
            pool: self,
            survivors: Vec::with_capacity(pending.len()),
            pending,
        };
        (scan, total)
    }

    /// Return scanned survivors to the old end of the idle set, in order
    fn restore_survivors(&self, survivors: Vec<IdleConnection<F::Connection>>) {
        let mut idle = self.idle();
        if self.is_closed() {
            drop(idle);
            for survivor in survivors {
                self.destroy(survivor.conn);
            }
            return;
        }
        for survivor in survivors.into_iter().rev() {
            idle.push_front(survivor);
        }
    }
}

/// Bounded pool of store connections
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ConnectionFactory> Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("endpoint", self.endpoint())
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool; connections are opened lazily
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let config = config.sanitized();
        let permits = config
            .max_total_limit()
            .map(|max_total| Arc::new(Semaphore::new(max_total)));
        debug_log!(
            "created pool for {} (max_total {:?})",
            factory.endpoint().address(),
            config.max_total_limit()
        );

        Self {
            inner: Arc::new(PoolInner {
                factory,
                config,
                idle: Mutex::new(VecDeque::new()),
                permits,
                closed: AtomicBool::new(false),
                live: AtomicUsize::new(0),
                borrowed: AtomicUsize::new(0),
                created: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
            }),
        }
    }

    /// Borrow a connection
    ///
    /// Reuses the most recently returned idle connection, or opens a new one.
    /// When `max_total` connections are already borrowed, waits up to
    /// `max_wait` for one to be released.
    pub async fn get(&self) -> Result<PooledConnection<F>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        if self.inner.config.test_while_idle {
            self.evict_idle().await;
        }

        let permit = match &self.inner.permits {
            Some(semaphore) => {
                let max_wait = self.inner.config.max_wait();
                match timeout(max_wait, semaphore.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => Some(permit),
                    Ok(Err(_)) => return Err(PoolError::Closed),
                    Err(_) => {
                        tracing::warn!(
                            endpoint = %self.endpoint().address(),
                            ?max_wait,
                            "connection pool exhausted"
                        );
                        return Err(PoolError::Exhausted(max_wait));
                    }
                }
            }
            None => None,
        };

        let conn = self.inner.checkout().await?;
        self.inner.borrowed.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Return a borrowed connection, validating it first when
    /// `test_on_return` is set
    pub async fn release(&self, mut conn: PooledConnection<F>) {
        let pool = conn.pool.clone();
        let Some(inner) = conn.conn.take() else {
            return;
        };
        let mut inner = InFlight::new(&pool, inner);
        if pool.config.test_on_return && !inner.validate().await {
            debug_log!("connection failed validation on return, discarding");
            return;
        }
        if let Some(inner) = inner.kept() {
            pool.return_idle(inner);
        }
    }

    /// Close idle connections that outlived `min_evictable_idle`, or that
    /// fail validation when `test_while_idle` is set
    ///
    /// Scans at most `eviction_batch_size` of the oldest idle connections and
    /// never lets age-based eviction shrink the idle set below `min_idle`.
    /// Returns the number of connections closed.
    pub async fn evict_idle(&self) -> usize {
        let inner = &self.inner;
        let (mut scan, mut remaining) = inner.take_eviction_batch();
        if scan.pending.is_empty() {
            return 0;
        }

        let min_idle = inner.config.min_idle as usize;
        let max_idle_age = inner.config.min_evictable_idle();
        let now = Instant::now();
        let mut evicted = 0;

        // the candidate stays in `pending` while it is validated
        while let Some(candidate) = scan.pending.front_mut() {
            let expired = now.saturating_duration_since(candidate.idle_since) > max_idle_age;
            let keep = if expired && remaining > min_idle {
                false
            } else if inner.config.test_while_idle {
                inner.factory.is_valid(&mut candidate.conn).await
            } else {
                true
            };

            let Some(candidate) = scan.pending.pop_front() else {
                break;
            };
            if keep {
                scan.survivors.push(candidate);
            } else {
                inner.destroy(candidate.conn);
                remaining -= 1;
                evicted += 1;
            }
        }

        drop(scan);
        if evicted > 0 {
            debug_log!("evicted {} idle connections", evicted);
        }
        evicted
    }

    /// Open idle connections until `min_idle` are available, without going
    /// past `max_total` live connections. Returns the number opened.
    pub async fn ensure_min_idle(&self) -> Result<usize, PoolError> {
        let inner = &self.inner;
        let min_idle = inner.config.min_idle as usize;
        let max_total = inner.config.max_total_limit();
        let mut opened = 0;

        loop {
            if inner.is_closed() || self.idle_count() >= min_idle {
                break;
            }
            if max_total.is_some_and(|max| inner.live.load(Ordering::SeqCst) >= max) {
                break;
            }
            match inner.create(false).await {
                Ok(conn) => {
                    inner.return_idle(conn);
                    opened += 1;
                }
                Err(CreateError::Connect(err)) => {
                    return Err(PoolError::Unavailable(err.to_string()));
                }
                Err(CreateError::Invalid) => {
                    return Err(PoolError::Unavailable(
                        "new connection failed validation".to_string(),
                    ));
                }
            }
        }
        Ok(opened)
    }

    /// Run eviction and min-idle maintenance every `eviction_interval`
    ///
    /// Returns `None` when the interval is disabled or no tokio runtime is
    /// running. The task ends once the pool is closed or every handle to it
    /// is dropped.
    pub fn spawn_evictor(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.eviction_interval()?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime, idle connection evictor not started");
            return None;
        };
        let weak = Arc::downgrade(&self.inner);

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let pool = Pool { inner };
                if pool.is_closed() {
                    break;
                }
                pool.evict_idle().await;
                if let Err(err) = pool.ensure_min_idle().await {
                    tracing::warn!(error = %err, "failed to replenish idle connections");
                }
            }
        }))
    }

    /// Close the pool
    ///
    /// Idle connections are closed now, borrowed ones when they come back.
    /// Waiting and future borrows fail with [`PoolError::Closed`].
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut idle = self.inner.idle();
            self.inner.closed.store(true, Ordering::SeqCst);
            let drained: Vec<_> = idle.drain(..).collect();
            drained
        };
        if let Some(semaphore) = &self.inner.permits {
            semaphore.close();
        }
        for idle in drained {
            self.inner.destroy(idle.conn);
        }
        tracing::info!(endpoint = %self.endpoint().address(), "connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    pub fn state(&self) -> PoolState {
        PoolState {
            idle: self.idle_count(),
            borrowed: self.inner.borrowed.load(Ordering::SeqCst),
            live: self.inner.live.load(Ordering::SeqCst),
            created: self.inner.created.load(Ordering::SeqCst),
            destroyed: self.inner.destroyed.load(Ordering::SeqCst),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.inner.factory.endpoint()
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }
}

/// A connection lent by a [`Pool`]
///
/// Dereferences to the underlying connection. Dropping it returns the
/// connection to the idle set without return-validation; use
/// [`Pool::release`] to validate, or [`PooledConnection::discard`] for a
/// connection known to be broken.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Connection>,
    pool: Arc<PoolInner<F>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Close the connection instead of returning it
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.destroy(conn);
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.pool.factory.endpoint()
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &F::Connection {
        self.conn
            .as_ref()
            .expect("connection is present until the guard is consumed")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut F::Connection {
        self.conn
            .as_mut()
            .expect("connection is present until the guard is consumed")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_idle(conn);
        }
        self.pool.borrowed.fetch_sub(1, Ordering::SeqCst);
    }
}
