//! The bounded pool of reusable connections to one store endpoint.
//!
//! Checkout hands out at most `pool_size` live connections at a time;
//! checkin either recycles the transport or, if the borrower left
//! pipelined replies unread, closes it. The second case is a policy
//! decision, not a failure: an unflushed pipeline leaves the byte stream
//! in an indeterminate position, so the transport must never be handed to
//! the next borrower.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace};

use crate::errors::RedisError;
use crate::network::connection::{open_connection, Connection, ConnectionConfig};
use crate::network::tls::TlsContext;
use crate::observability::metrics::{Counter, Gauge, StatsScope};

/// The target size of a connection pool: the maximum number of live
/// physical connections, checked-out and idle combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize(pub NonZeroUsize);

impl Default for PoolSize {
    fn default() -> Self {
        PoolSize(NonZeroUsize::new(16).unwrap())
    }
}

impl PoolSize {
    /// Builds a pool size from a plain integer; `None` if zero.
    pub fn new(size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(PoolSize)
    }

    fn get(self) -> usize {
        self.0.get()
    }
}

/// What `get` does when every connection slot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Wait (FIFO) until a borrower returns a connection.
    #[default]
    Block,
    /// Return [`RedisError::PoolExhausted`] immediately.
    FailFast,
}

/// Configuration of one connection pool.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// How connections of this pool are dialed.
    pub connection_config: ConnectionConfig,
    /// Maximum live connections.
    pub pool_size: PoolSize,
    /// Behavior when all slots are taken.
    pub exhaustion_policy: ExhaustionPolicy,
}

struct PoolStats {
    connection_active: Arc<dyn Gauge>,
    connection_total: Arc<dyn Counter>,
    connection_close: Arc<dyn Counter>,
}

impl PoolStats {
    fn register(scope: &dyn StatsScope) -> Self {
        PoolStats {
            connection_active: scope.new_gauge("cx_active"),
            connection_total: scope.new_counter("cx_total"),
            connection_close: scope.new_counter("cx_local_close"),
        }
    }
}

struct PoolInner {
    config: PoolConfig,
    tls: Option<TlsContext>,
    idle: Mutex<VecDeque<Connection>>,
    slots: Arc<Semaphore>,
    stats: PoolStats,
}

impl PoolInner {
    /// Checkin bookkeeping, shared by explicit `put` and RAII drop.
    fn release(&self, connection: Connection) {
        self.stats.connection_active.dec();
        if connection.pipeline_state().is_idle() {
            self.idle
                .lock()
                .expect("pool mutex poisoned")
                .push_back(connection);
        } else {
            // The borrower left pipelined replies unread; the transport's
            // stream position is indeterminate. Close it rather than let the
            // next borrower read someone else's replies.
            debug!(
                "closing connection with {} unread pipelined replies",
                connection.pipeline_state().pending()
            );
            self.stats.connection_close.inc();
            drop(connection);
        }
    }
}

/// A bounded, thread-safe pool of connections to one store endpoint.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.inner.config.connection_config.address)
            .field("pool_size", &self.inner.config.pool_size)
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates a pool and registers its instruments in `scope`.
    ///
    /// No connection is dialed yet; the pool grows on demand up to
    /// `pool_size`.
    pub fn new(scope: Arc<dyn StatsScope>, config: PoolConfig) -> Self {
        let connection_config = &config.connection_config;
        info!(
            "redis connection pool for {} with size {}, authentication {}",
            connection_config.address,
            config.pool_size.get(),
            if connection_config.auth_enabled() {
                "enabled"
            } else {
                "disabled"
            },
        );

        let tls = connection_config
            .use_tls
            .then(TlsContext::with_default_roots);
        let slots = Arc::new(Semaphore::new(config.pool_size.get()));

        ConnectionPool {
            inner: Arc::new(PoolInner {
                tls,
                idle: Mutex::new(VecDeque::with_capacity(config.pool_size.get())),
                slots,
                stats: PoolStats::register(scope.as_ref()),
                config,
            }),
        }
    }

    /// Acquires a connection, reusing an idle one when possible and
    /// dialing otherwise.
    ///
    /// Waits for a free slot or fails fast, per the configured
    /// [`ExhaustionPolicy`]. Increments the active gauge and the total
    /// counter exactly once per success, dialed or reused.
    pub async fn get(&self) -> Result<PooledConnection, RedisError> {
        let permit = self.acquire_slot().await?;

        let connection = match self.pop_idle() {
            Some(connection) => {
                trace!("reusing idle connection {:?}", connection);
                connection
            }
            // Dropping `permit` on the error path releases the slot.
            None => open_connection(
                &self.inner.config.connection_config,
                self.inner.tls.as_ref(),
            )
            .await
            .map_err(RedisError::Connect)?,
        };

        self.inner.stats.connection_active.inc();
        self.inner.stats.connection_total.inc();

        Ok(PooledConnection {
            connection: Some(connection),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Returns a connection to the pool.
    ///
    /// The active gauge is decremented unconditionally. A connection with
    /// an idle pipeline is recycled; one with unread pipelined replies is
    /// closed and counted in `cx_local_close`. Never fails.
    ///
    /// Dropping the [`PooledConnection`] performs the same bookkeeping;
    /// `put` is the explicit spelling of it.
    pub fn put(&self, connection: PooledConnection) {
        drop(connection);
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, RedisError> {
        let slots = Arc::clone(&self.inner.slots);
        match self.inner.config.exhaustion_policy {
            ExhaustionPolicy::Block => Ok(slots
                .acquire_owned()
                .await
                .expect("pool semaphore never closed")),
            ExhaustionPolicy::FailFast => slots
                .try_acquire_owned()
                .map_err(|_| RedisError::PoolExhausted),
        }
    }

    fn pop_idle(&self) -> Option<Connection> {
        self.inner
            .idle
            .lock()
            .expect("pool mutex poisoned")
            .pop_front()
    }

    /// Number of idle connections currently held by the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().expect("pool mutex poisoned").len()
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dereferences to [`Connection`]. Returning it with
/// [`ConnectionPool::put`] (or dropping it) runs checkin bookkeeping.
pub struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
    // Held for its Drop: releasing it frees a slot for the next `get`.
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection.as_mut().expect("connection present until drop")
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledConnection").field(&**self).finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
        }
    }
}
