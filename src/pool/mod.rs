//! Pooled connections with idle-aware health checks and the execution modes built on them.
//!
//! Connections are opened lazily: nothing touches the store until the first acquisition, at which
//! point `min_cached` sessions are opened and the pool grows on demand up to `max_cached`. Every
//! checkout is validated (idle threshold, then `SELECT 1`); a stale or dead session is dropped and
//! replaced without the caller noticing.

mod config;
mod executor;
mod iter;
mod manager;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CACHED, DEFAULT_MAX_IDLE_TIME, PoolConfig,
    PoolConfigBuilder, UNCAPPED_MAX_SIZE,
};
pub use iter::RowIter;
pub use manager::{StoreConnection, StoreManager};

use std::sync::Arc;

use bb8::{Pool, PooledConnection};
use tokio::sync::OnceCell;

use crate::error::RecordError;
use crate::results::{ExecOutcome, Row};
use crate::statement::QueryAndParams;
use crate::types::Value;

use executor::{Prepared, execute, execute_in_transaction, query_first, query_rows, run_blocking};
use manager::TracingSink;

/// A checked-out connection. Dropping it returns it to the pool (or discards it when broken).
pub type PooledStore = PooledConnection<'static, StoreManager>;

/// Attempts made by [`ConnectionPool::insert`] before giving up on duplicate keys.
pub const MAX_INSERT_ATTEMPTS: u32 = 3;

/// How a raw statement is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// First row only.
    Get,
    /// Every row, in store order.
    Query,
    /// Lazy row stream.
    Iter,
    /// Mutation; reports the generated identity.
    Execute,
    /// Mutation; reports the affected-row count.
    ExecuteRowCount,
    /// Mutation wrapped in `BEGIN`/`COMMIT`.
    Transaction,
}

/// Result of [`ConnectionPool::run`], shaped by the [`ExecMode`].
#[derive(Debug)]
pub enum Executed {
    Row(Option<Row>),
    Rows(Vec<Row>),
    Iter(RowIter),
    Outcome(ExecOutcome),
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub initialized: bool,
    pub connections: u32,
    pub idle_connections: u32,
}

struct Inner {
    config: Arc<PoolConfig>,
    pool: OnceCell<Pool<StoreManager>>,
}

/// Shared handle to a lazily built connection pool. Cloning is cheap.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionPool {
    /// Validate `config`; no connection is opened yet.
    ///
    /// # Errors
    /// `ConfigError` when the settings do not validate.
    pub fn new(config: PoolConfig) -> Result<Self, RecordError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                pool: OnceCell::new(),
            }),
        })
    }

    #[must_use]
    pub fn builder(database: impl Into<String>) -> PoolConfigBuilder {
        PoolConfigBuilder::new(database)
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    async fn pool(&self) -> Result<&Pool<StoreManager>, RecordError> {
        self.inner
            .pool
            .get_or_try_init(|| async {
                let config = Arc::clone(&self.inner.config);
                tracing::debug!(
                    database = %config.database,
                    min_cached = config.min_cached,
                    max_size = config.max_size(),
                    "initializing connection pool"
                );
                Pool::builder()
                    .max_size(config.max_size())
                    .min_idle(Some(config.min_cached))
                    .connection_timeout(config.connect_timeout)
                    .idle_timeout(Some(config.max_idle_time))
                    .test_on_check_out(true)
                    .error_sink(Box::new(TracingSink))
                    .build(StoreManager::new(config))
                    .await
            })
            .await
    }

    /// Check out a validated connection.
    ///
    /// # Errors
    /// `ConnectionLost` when no connection becomes available within `connect_timeout`, or the
    /// error raised while opening one.
    pub async fn acquire(&self) -> Result<PooledStore, RecordError> {
        let pool = self.pool().await?;
        Ok(pool.get_owned().await?)
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        match self.inner.pool.get() {
            Some(pool) => {
                let state = pool.state();
                PoolStatus {
                    initialized: true,
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            }
            None => PoolStatus::default(),
        }
    }

    async fn on_connection<F, R>(&self, func: F) -> Result<R, RecordError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, RecordError> + Send + 'static,
        R: Send + 'static,
    {
        let mut conn = self.acquire().await?;
        conn.with_connection(func).await
    }

    /// First row of a query, if any.
    ///
    /// # Errors
    /// Store errors; the connection is retired afterwards.
    pub async fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, RecordError> {
        let stmt = Prepared::new(sql, params);
        self.on_connection(move |c| query_first(c, &stmt)).await
    }

    /// Every row of a query, in store order.
    ///
    /// # Errors
    /// Store errors; the connection is retired afterwards.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, RecordError> {
        let stmt = Prepared::new(sql, params);
        self.on_connection(move |c| query_rows(c, &stmt)).await
    }

    /// Lazy row stream; the connection is held until the stream ends or is dropped.
    ///
    /// # Errors
    /// Checkout errors. Query errors arrive through the iterator.
    pub async fn iter(&self, sql: &str, params: &[Value]) -> Result<RowIter, RecordError> {
        let conn = self.acquire().await?;
        Ok(RowIter::spawn(conn, Prepared::new(sql, params)))
    }

    /// Run a mutation.
    ///
    /// # Errors
    /// `DuplicateKey` on unique collisions (the connection is kept); other store errors retire
    /// the connection.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome, RecordError> {
        let stmt = Prepared::new(sql, params);
        self.on_connection(move |c| execute(c, &stmt)).await
    }

    /// Run an INSERT, retrying up to [`MAX_INSERT_ATTEMPTS`] times on duplicate keys. `table`
    /// only labels the failure.
    ///
    /// # Errors
    /// `InsertExhausted` wrapping the last `DuplicateKey`; any other error immediately.
    pub async fn insert(
        &self,
        table: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<ExecOutcome, RecordError> {
        let mut attempt = 1;
        loop {
            match self.execute(sql, params).await {
                Err(err) if err.is_duplicate_key() => {
                    tracing::debug!(table, attempt, "duplicate key on insert");
                    if attempt >= MAX_INSERT_ATTEMPTS {
                        return Err(RecordError::InsertExhausted {
                            table: table.to_string(),
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Run `statements` in one transaction. On success the connection goes back to the pool; on
    /// failure the transaction is rolled back and the connection discarded.
    ///
    /// # Errors
    /// `TransactionFailure` wrapping the statement error.
    pub async fn transaction(
        &self,
        statements: &[QueryAndParams],
    ) -> Result<Vec<ExecOutcome>, RecordError> {
        let prepared: Vec<Prepared> = statements
            .iter()
            .map(|q| Prepared::new(&q.query, &q.params))
            .collect();
        let mut conn = self.acquire().await?;
        let result = run_blocking(conn.handle(), move |c| {
            execute_in_transaction(c, &prepared)
        })
        .await;
        match &result {
            Ok(_) => conn.settle(&result),
            Err(err) => conn.mark_broken(err),
        }
        result
    }

    /// Run a script of `;`-separated statements without parameters.
    ///
    /// # Errors
    /// Store errors.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), RecordError> {
        let sql = sql.to_string();
        self.on_connection(move |c| c.execute_batch(&sql).map_err(RecordError::from_store))
            .await
    }

    /// Run `sql` in the given mode.
    ///
    /// # Errors
    /// Same as the mode's dedicated method.
    pub async fn run(
        &self,
        sql: &str,
        params: &[Value],
        mode: ExecMode,
    ) -> Result<Executed, RecordError> {
        Ok(match mode {
            ExecMode::Get => Executed::Row(self.get(sql, params).await?),
            ExecMode::Query => Executed::Rows(self.query(sql, params).await?),
            ExecMode::Iter => Executed::Iter(self.iter(sql, params).await?),
            ExecMode::Execute | ExecMode::ExecuteRowCount => {
                Executed::Outcome(self.execute(sql, params).await?)
            }
            ExecMode::Transaction => {
                let statement = QueryAndParams::new(sql, params.to_vec());
                let outcome = self
                    .transaction(std::slice::from_ref(&statement))
                    .await?
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                Executed::Outcome(outcome)
            }
        })
    }
}
