use crate::error::RecordError;
use crate::pool::{ExecMode, Executed, RowIter};
use crate::predicate::{Attrs, Filters, Link, compile};
use crate::results::{ExecOutcome, Row};
use crate::statement::{self, Order, Query, QueryAndParams};
use crate::types::Value;

use super::{Record, Table};

/// Records streamed from [`Table::find_iter`].
#[derive(Debug)]
pub struct RecordIter {
    table: Table,
    rows: RowIter,
}

impl RecordIter {
    pub async fn next(&mut self) -> Option<Result<Record, RecordError>> {
        let row = self.rows.next().await?;
        Some(row.map(|r| Record::from_row(&self.table, r)))
    }
}

impl Table {
    fn hydrate(&self, rows: Vec<Row>) -> Vec<Record> {
        rows.into_iter()
            .map(|r| Record::from_row(self, r))
            .collect()
    }

    async fn fetch_one(&self, statement: QueryAndParams) -> Result<Option<Row>, RecordError> {
        self.echo(&statement);
        self.pool().get(&statement.query, &statement.params).await
    }

    async fn fetch_all(&self, statement: QueryAndParams) -> Result<Vec<Row>, RecordError> {
        self.echo(&statement);
        self.pool().query(&statement.query, &statement.params).await
    }

    /// Insert one row and return it as stored. `None` when `attrs` is empty.
    ///
    /// Duplicate keys are retried before giving up. The row is read back by the identity the
    /// caller supplied, or by the store-generated one.
    ///
    /// # Errors
    /// `SchemaViolation`, `InsertExhausted`, store errors, or `ExecutionError` when the new row
    /// cannot be read back.
    pub async fn new(&self, attrs: Attrs) -> Result<Option<Record>, RecordError> {
        let Some(statement) = statement::insert(self.def(), &attrs)? else {
            return Ok(None);
        };
        self.echo(&statement);
        let outcome = self
            .pool()
            .insert(self.name(), &statement.query, &statement.params)
            .await?;

        let pk = self.def().primary_key();
        let identity = match attrs.get(pk) {
            Some(v) if !v.is_null() => v.clone(),
            _ => outcome.last_insert_id.map(Value::Int).ok_or_else(|| {
                RecordError::ExecutionError(format!(
                    "insert into `{}` returned no identity",
                    self.name()
                ))
            })?,
        };
        let record = self
            .get(&Filters::new().eq(pk, identity.clone()))
            .await?
            .ok_or_else(|| {
                RecordError::ExecutionError(format!(
                    "row `{pk}` = {identity} of `{}` not found after insert",
                    self.name()
                ))
            })?;
        Ok(Some(record))
    }

    /// Insert several rows in one statement. `None` when `items` is empty.
    ///
    /// # Errors
    /// `SchemaViolation`, `MalformedBatch` or store errors.
    pub async fn new_mul(&self, items: &[Attrs]) -> Result<Option<ExecOutcome>, RecordError> {
        let Some(statement) = statement::insert_many(self.def(), items)? else {
            return Ok(None);
        };
        self.echo(&statement);
        let outcome = self
            .pool()
            .execute(&statement.query, &statement.params)
            .await?;
        Ok(Some(outcome))
    }

    /// At most one record matching `filters`.
    ///
    /// # Errors
    /// `SchemaViolation` or store errors.
    pub async fn get(&self, filters: &Filters) -> Result<Option<Record>, RecordError> {
        let statement = statement::select_one(self.def(), None, filters)?;
        Ok(self
            .fetch_one(statement)
            .await?
            .map(|row| Record::from_row(self, row)))
    }

    /// Every matching record.
    ///
    /// # Errors
    /// `SchemaViolation` or store errors.
    pub async fn find(&self, query: impl Into<Query>) -> Result<Vec<Record>, RecordError> {
        let rows = self.find_rows(query).await?;
        Ok(self.hydrate(rows))
    }

    /// Like [`Table::find`] but returns the raw rows, which keeps joined projections intact.
    ///
    /// # Errors
    /// `SchemaViolation` or store errors.
    pub async fn find_rows(&self, query: impl Into<Query>) -> Result<Vec<Row>, RecordError> {
        let statement = statement::select(self.def(), &query.into())?;
        self.fetch_all(statement).await
    }

    /// Lazy version of [`Table::find`].
    ///
    /// # Errors
    /// `SchemaViolation` or checkout errors; query errors arrive through the iterator.
    pub async fn find_iter(&self, query: impl Into<Query>) -> Result<RecordIter, RecordError> {
        let statement = statement::select(self.def(), &query.into())?;
        self.echo(&statement);
        let rows = self
            .pool()
            .iter(&statement.query, &statement.params)
            .await?;
        Ok(RecordIter {
            table: self.clone(),
            rows,
        })
    }

    /// Every record, optionally ordered and limited.
    ///
    /// # Errors
    /// `SchemaViolation` for an unknown ordering column, or store errors.
    pub async fn all(
        &self,
        order: &[Order],
        limit: Option<u64>,
    ) -> Result<Vec<Record>, RecordError> {
        let statement = statement::scan(self.def(), order, limit)?;
        let rows = self.fetch_all(statement).await?;
        Ok(self.hydrate(rows))
    }

    /// The 1-based `page` of matching records; `per_page` defaults to the table's page size.
    ///
    /// # Errors
    /// `SchemaViolation`, `MalformedValue` for a zero page size, or store errors.
    pub async fn page(
        &self,
        page: i64,
        per_page: Option<u32>,
        query: impl Into<Query>,
    ) -> Result<Vec<Record>, RecordError> {
        let statement = statement::page(self.def(), page, per_page, &query.into())?;
        let rows = self.fetch_all(statement).await?;
        Ok(self.hydrate(rows))
    }

    /// # Errors
    /// `SchemaViolation` or store errors.
    pub async fn exists(&self, filters: &Filters) -> Result<bool, RecordError> {
        let statement = statement::exists(self.def(), filters)?;
        Ok(self.fetch_one(statement).await?.is_some())
    }

    /// Count of matching rows.
    ///
    /// # Errors
    /// `SchemaViolation` or store errors.
    pub async fn number(&self, filters: &Filters) -> Result<u64, RecordError> {
        let statement = statement::count(self.def(), filters)?;
        let count = self
            .fetch_one(statement)
            .await?
            .and_then(|row| row.get("count").and_then(Value::as_int))
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Delete matching rows; returns how many went.
    ///
    /// # Errors
    /// `MalformedValue` for empty filters, `SchemaViolation`, or store errors.
    pub async fn delete(&self, filters: &Filters) -> Result<u64, RecordError> {
        let statement = statement::delete(self.def(), filters)?;
        self.echo(&statement);
        let outcome = self
            .pool()
            .execute(&statement.query, &statement.params)
            .await?;
        Ok(outcome.rows_affected)
    }

    /// `UPDATE .. SET sets WHERE filters` in a transaction. Empty `sets` changes nothing and
    /// returns 0.
    ///
    /// # Errors
    /// `SchemaViolation`, `MalformedValue` for non-equality assignments, or `TransactionFailure`.
    pub async fn cls_update(&self, sets: &Filters, filters: &Filters) -> Result<u64, RecordError> {
        let set = compile(sets, None, Some(self.def().schema()), None, Link::Comma)?;
        let Some(statement) = statement::update_where(self.def(), &set, filters)? else {
            return Ok(0);
        };
        self.echo(&statement);
        let outcomes = self
            .pool()
            .transaction(std::slice::from_ref(&statement))
            .await?;
        Ok(outcomes.first().map_or(0, |o| o.rows_affected))
    }

    /// Run hand-written SQL (`%s` placeholders) through this table's pool.
    ///
    /// # Errors
    /// Store errors.
    pub async fn execute_sql(
        &self,
        sql: &str,
        params: &[Value],
        mode: ExecMode,
    ) -> Result<Executed, RecordError> {
        if self.def().echo() {
            self.echo(&QueryAndParams::new(sql, params.to_vec()));
        }
        self.pool().run(sql, params, mode).await
    }
}
