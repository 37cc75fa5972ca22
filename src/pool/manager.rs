use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bb8::{ErrorSink, ManageConnection};
use tokio::sync::Mutex;

use crate::error::RecordError;

use super::config::PoolConfig;
use super::executor::{SharedConnection, run_blocking};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One physical SQLite session plus the bookkeeping the pool needs to judge it.
pub struct StoreConnection {
    conn: SharedConnection,
    id: u64,
    last_used: Instant,
    broken: bool,
}

impl StoreConnection {
    fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            last_used: Instant::now(),
            broken: false,
        }
    }

    /// Process-unique number of this physical connection. A reconnect yields a new id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time since the connection last finished a statement.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Run `func` against the raw `rusqlite` connection on the blocking pool.
    ///
    /// # Errors
    /// Whatever `func` returns, plus `ExecutionError` if the blocking task panics.
    pub async fn with_connection<F, R>(&mut self, func: F) -> Result<R, RecordError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, RecordError> + Send + 'static,
        R: Send + 'static,
    {
        let result = run_blocking(self.handle(), func).await;
        self.settle(&result);
        result
    }

    pub(crate) fn handle(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    /// Record the end of a statement. Any failure except a duplicate key retires the connection.
    pub(crate) fn settle<R>(&mut self, result: &Result<R, RecordError>) {
        self.last_used = Instant::now();
        if let Err(err) = result
            && !err.is_duplicate_key()
        {
            self.mark_broken(err);
        }
    }

    pub(crate) fn mark_broken(&mut self, reason: &RecordError) {
        if !self.broken {
            tracing::debug!(connection = self.id, error = %reason, "retiring connection");
        }
        self.last_used = Instant::now();
        self.broken = true;
    }
}

impl fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConnection")
            .field("id", &self.id)
            .field("idle_for", &self.idle_for())
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

/// bb8 manager for SQLite sessions.
#[derive(Debug, Clone)]
pub struct StoreManager {
    config: Arc<PoolConfig>,
}

impl StoreManager {
    #[must_use]
    pub fn new(config: Arc<PoolConfig>) -> Self {
        Self { config }
    }
}

fn open_session(config: &PoolConfig) -> Result<rusqlite::Connection, RecordError> {
    let conn = rusqlite::Connection::open(Path::new(&config.database))?;
    conn.busy_timeout(config.connect_timeout)?;
    conn.pragma_update(None, "encoding", config.encoding()?)?;
    for statement in &config.pre_execute {
        if let Err(e) = conn.execute_batch(statement) {
            tracing::warn!(statement = %statement, error = %e, "pre-execute statement failed");
        }
    }
    Ok(conn)
}

impl ManageConnection for StoreManager {
    type Connection = StoreConnection;
    type Error = RecordError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let config = Arc::clone(&self.config);
        async move {
            let conn = tokio::task::spawn_blocking(move || open_session(&config))
                .await
                .map_err(|e| {
                    RecordError::ConnectionLost(format!("sqlite connect join error: {e}"))
                })??;
            let conn = StoreConnection::new(conn);
            tracing::debug!(connection = conn.id, "opened connection");
            Ok(conn)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let max_idle = self.config.max_idle_time;
        async move {
            let idle = conn.idle_for();
            if idle > max_idle {
                tracing::debug!(connection = conn.id, ?idle, "connection idle too long");
                return Err(RecordError::ConnectionLost(format!(
                    "connection {} idle for {idle:?}",
                    conn.id
                )));
            }
            run_blocking(conn.handle(), |c| {
                c.query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(RecordError::from)
            })
            .await
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken
    }
}

/// Forwards pool-internal errors (failed background connects) to `tracing`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TracingSink;

impl ErrorSink<RecordError> for TracingSink {
    fn sink(&self, error: RecordError) {
        tracing::warn!(error = %error, "connection pool error");
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<RecordError>> {
        Box::new(*self)
    }
}
