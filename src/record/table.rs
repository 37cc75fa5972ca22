use std::sync::Arc;

use crate::error::RecordError;
use crate::pool::ConnectionPool;
use crate::statement::QueryAndParams;
use crate::table::{TableDef, TableDefBuilder};

/// A table definition bound to the pool its records are read from and written to.
///
/// ```rust,no_run
/// use sql_record::prelude::*;
///
/// # async fn demo() -> Result<(), RecordError> {
/// let pool = ConnectionPool::builder("app.db").build()?;
/// let topics = Table::builder("topic")
///     .columns(["id", "title", "status"])
///     .per_page(20)
///     .bind(&pool)?;
/// let open = topics.number(&filters! { "status" => 1 }).await?;
/// # let _ = open;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Table {
    def: Arc<TableDef>,
    pool: ConnectionPool,
}

impl Table {
    /// Bind an already validated definition to `pool`
    ///
    /// # Arguments
    ///
    /// * `def` - The table definition, usually from [`TableDefBuilder::build`]
    /// * `pool` - The pool every operation on this table runs through
    ///
    /// # Returns
    ///
    /// A `Table` that can be cloned cheaply and shared between tasks
    #[must_use]
    pub fn from_def(def: TableDef, pool: ConnectionPool) -> Self {
        Self {
            def: Arc::new(def),
            pool,
        }
    }

    /// Start a definition; finish with [`TableDefBuilder::bind`].
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableDefBuilder {
        TableDef::builder(name)
    }

    #[must_use]
    pub fn def(&self) -> &TableDef {
        &self.def
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Pool used for this table's statements, also handy for raw SQL.
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) fn echo(&self, statement: &QueryAndParams) {
        if self.def.echo() {
            tracing::info!(target: "sql_record::echo", table = self.def.name(), "{statement}");
        }
    }
}

impl TableDefBuilder {
    /// Validate the definition and bind it to `pool`.
    ///
    /// # Errors
    /// See [`TableDefBuilder::build`].
    pub fn bind(self, pool: &ConnectionPool) -> Result<Table, RecordError> {
        Ok(Table::from_def(self.build()?, pool.clone()))
    }
}
