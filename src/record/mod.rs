//! Active records: rows of one [`Table`] with per-instance dirty tracking.

mod dictify;
mod ops;
mod table;

pub use dictify::{DEFAULT_DATE_FORMAT, DictOptions};
pub use ops::RecordIter;
pub use table::Table;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::RecordError;
use crate::predicate::Attrs;
use crate::results::Row;
use crate::statement::update_record;
use crate::types::Value;

/// One row of a table.
///
/// Values are only written back through [`Record::save`] or [`Record::update`]; [`Record::set`]
/// changes the in-memory value and marks the column dirty.
#[derive(Clone)]
pub struct Record {
    table: Table,
    values: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    // identity of the stored row, moved only by a successful write
    stored_identity: Option<Value>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table.name())
            .field("values", &self.values)
            .field("dirty", &self.dirty)
            .field("stored_identity", &self.stored_identity)
            .finish()
    }
}

impl Record {
    /// Hydrate from a fetched row. Columns outside the whitelist are dropped; the record starts
    /// clean.
    #[must_use]
    pub fn from_row(table: &Table, row: Row) -> Self {
        let values: BTreeMap<String, Value> = row
            .into_pairs()
            .into_iter()
            .filter(|(column, _)| table.def().has_column(column))
            .collect();
        let stored_identity = values
            .get(table.def().primary_key())
            .filter(|v| !v.is_null())
            .cloned();
        Self {
            table: table.clone(),
            values,
            dirty: BTreeSet::new(),
            stored_identity,
        }
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// In-memory value of `column`, including unsaved assignments.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    #[must_use]
    pub fn get_int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_int)
    }

    #[must_use]
    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    /// Identity of the row this record was loaded from.
    ///
    /// A pending `set` on the identity column does not change it; the next successful
    /// [`Record::save`] or [`Record::update`] does.
    #[must_use]
    pub fn identity(&self) -> Option<&Value> {
        self.stored_identity.as_ref()
    }

    /// Loaded `(column, value)` pairs, sorted by column name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Assign a value in memory and mark the column dirty.
    ///
    /// # Errors
    /// `SchemaViolation` when `column` is not part of the table.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self, RecordError> {
        self.table.def().schema().check([column])?;
        self.values.insert(column.to_string(), value.into());
        self.dirty.insert(column.to_string());
        Ok(self)
    }

    /// Columns assigned since the last fetch or write, sorted.
    pub fn dirty_columns(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Forget pending changes without writing them.
    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Write `attrs` to this record's row in a transaction. On success the new values are applied
    /// in memory. The dirty set is cleared whatever the outcome.
    ///
    /// Returns the number of rows the store reports as changed.
    ///
    /// # Errors
    /// `SchemaViolation` for unknown columns, `ExecutionError` when the identity is not loaded,
    /// `TransactionFailure` when the write fails.
    pub async fn update(&mut self, attrs: Attrs) -> Result<u64, RecordError> {
        let result = self.write(attrs).await;
        self.dirty.clear();
        result
    }

    /// Flush the dirty columns. Does nothing, and issues no statement, when nothing is dirty.
    ///
    /// # Errors
    /// See [`Record::update`].
    pub async fn save(&mut self) -> Result<u64, RecordError> {
        let attrs: Attrs = self
            .dirty
            .iter()
            .filter_map(|c| self.values.get(c).map(|v| (c.clone(), v.clone())))
            .collect();
        self.update(attrs).await
    }

    async fn write(&mut self, attrs: Attrs) -> Result<u64, RecordError> {
        if attrs.is_empty() {
            return Ok(0);
        }
        let identity = self.identity().cloned().ok_or_else(|| {
            RecordError::ExecutionError(format!(
                "record of `{}` has no `{}` loaded",
                self.table.name(),
                self.table.def().primary_key()
            ))
        })?;
        let Some(statement) = update_record(self.table.def(), &attrs, &identity)? else {
            return Ok(0);
        };
        self.table.echo(&statement);
        let outcomes = self
            .table
            .pool()
            .transaction(std::slice::from_ref(&statement))
            .await?;
        let changed = outcomes.first().map_or(0, |o| o.rows_affected);
        if changed > 0 {
            let pk = self.table.def().primary_key();
            for (column, value) in attrs {
                if column == pk {
                    self.stored_identity = Some(value.clone()).filter(|v| !v.is_null());
                }
                self.values.insert(column, value);
            }
        }
        Ok(changed)
    }
}
