//! Database connection pooling.
use std::{
    fmt,
    ops::{Deref, DerefMut},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::Instant,
};

use crate::{
    Connection, Result,
    common::{debug, error},
    executor::Executor,
};

mod config;
mod idle;

pub use config::PoolConfig;
pub use idle::{IdlePool, Pooled};

/// Database connection pool.
///
/// At most `max_open` connections are checked out at once, and at most
/// `max_idle` are kept around. Idle connections older than `max_lifetime`
/// are closed by a background task.
///
/// `Pool` is cheaply cloneable, and intended to be shared across tasks.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    idle: Arc<IdlePool<Connection>>,
    open: Arc<Semaphore>,
    config: PoolConfig,
}

impl Pool {
    /// Create [`Pool`] and try to create one connection.
    pub async fn connect(url: &str) -> Result<Self> {
        PoolConfig::from_env().connect(url).await
    }

    /// Create [`Pool`] without trying to create connection.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        PoolConfig::from_env().connect_lazy(url)
    }

    /// Create [`Pool`] and try to create one connection.
    ///
    /// See [`Config::from_env`][1] for more details on env.
    ///
    /// [1]: crate::Config::from_env
    pub async fn connect_env() -> Result<Pool> {
        Self::connect_with(PoolConfig::from_env()).await
    }

    /// Create [`Pool`] and try to create one connection.
    pub async fn connect_with(config: PoolConfig) -> Result<Self> {
        let pool = Self::connect_lazy_with(config);
        drop(pool.acquire().await?);
        Ok(pool)
    }

    /// Create [`Pool`] without trying to create connection.
    ///
    /// # Panics
    ///
    /// Must be called within tokio runtime, the drain task is spawned here.
    pub fn connect_lazy_with(config: PoolConfig) -> Self {
        let idle = Arc::new(IdlePool::new(config.max_idle, config.max_lifetime));
        IdlePool::spawn_drain(&idle);
        Self {
            inner: Arc::new(PoolInner {
                idle,
                open: Arc::new(Semaphore::new(config.max_open)),
                config,
            }),
        }
    }

    /// Retrieves a connection from the pool, dialing a new one when there is
    /// no idle connection.
    ///
    /// Waiting for a slot is bounded by the dial timeout, which then fails
    /// with [`PoolError::AcquireTimeout`].
    pub async fn acquire(&self) -> Result<PoolConnection> {
        let config = &self.inner.config;
        let deadline = Instant::now() + config.conn.dial_timeout;

        let permit = match tokio::time::timeout_at(deadline, self.inner.open.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed.into()),
            Err(_) => return Err(PoolError::AcquireTimeout.into()),
        };

        let conn = match self.inner.idle.get(Some(deadline)) {
            Ok(conn) => conn,
            Err(PoolError::Empty) => match Connection::connect_with(config.conn.clone()).await {
                Ok(conn) => conn,
                Err(err) => {
                    error!("failed to connect: {err}");
                    return Err(err);
                },
            },
            Err(err) => return Err(err.into()),
        };

        Ok(PoolConnection { conn: Some(conn), pool: self.clone(), _permit: permit })
    }

    /// Close every idle connection, subsequent acquire fails.
    ///
    /// Checked out connections are closed when they are released.
    pub fn close(&self) {
        debug!("pool closed");
        self.inner.open.close();
        self.inner.idle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.idle.is_closed()
    }

    /// Number of idle connections.
    pub fn idle(&self) -> usize {
        self.inner.idle.len()
    }

    /// Returns the pool config.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.inner.idle.len())
            .field("available", &self.inner.open.available_permits())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Executor for Pool {
    type Connection = PoolConnection;

    type Future = PoolConnect;

    fn connection(self) -> Self::Future {
        PoolConnect::new(self)
    }
}

impl Executor for &Pool {
    type Connection = PoolConnection;

    type Future = PoolConnect;

    fn connection(self) -> Self::Future {
        PoolConnect::new(self.clone())
    }
}

impl Executor for &mut Pool {
    type Connection = PoolConnection;

    type Future = PoolConnect;

    fn connection(self) -> Self::Future {
        PoolConnect::new(self.clone())
    }
}

/// Future returned from [`Pool`] implementation of [`Executor::connection`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PoolConnect {
    f: Pin<Box<dyn Future<Output = Result<PoolConnection>> + Send>>,
}

impl PoolConnect {
    fn new(pool: Pool) -> Self {
        Self { f: Box::pin(async move { pool.acquire().await }) }
    }
}

impl Future for PoolConnect {
    type Output = Result<PoolConnection>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.f.as_mut().poll(cx)
    }
}

impl fmt::Debug for PoolConnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PoolConnect")
    }
}

/// Instance of [`Pool`] with the checked out connection.
///
/// The connection is returned to the pool on drop, or closed when it is
/// bad, expired, or the pool is full.
#[derive(Debug)]
pub struct PoolConnection {
    conn: Option<Connection>,
    pool: Pool,
    _permit: OwnedSemaphorePermit,
}

impl PoolConnection {
    /// Returns the [`Pool`] handle.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Deref for PoolConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // `conn` only `None` on drop
        self.conn.as_ref().unwrap()
    }
}

impl DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        // `conn` only `None` on drop
        self.conn.as_mut().unwrap()
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.inner.idle.put(conn);
        }
    }
}

impl Pooled for Connection {
    fn connected_at(&self) -> Instant {
        Connection::connected_at(self)
    }

    fn is_bad(&self) -> bool {
        Connection::is_bad(self)
    }

    fn close(mut self) {
        self.mark_closed();
    }
}

/// Pool error.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No idle item left.
    Empty,
    /// Pool is closed.
    Closed,
    /// Deadline elapsed while waiting for a connection.
    AcquireTimeout,
}

impl std::error::Error for PoolError { }

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("pool is empty"),
            Self::Closed => f.write_str("pool is closed"),
            Self::AcquireTimeout => f.write_str("timed out acquiring connection from pool"),
        }
    }
}

impl fmt::Debug for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
