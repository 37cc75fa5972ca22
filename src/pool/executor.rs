use std::sync::Arc;

use rusqlite::types::{Value as SqlValue, ValueRef};
use tokio::sync::Mutex;

use crate::error::RecordError;
use crate::results::{ExecOutcome, Row, index_columns};
use crate::translation::translate_placeholders;
use crate::types::Value;

pub(crate) type SharedConnection = Arc<Mutex<rusqlite::Connection>>;

/// A statement ready to run on the blocking pool: placeholders already rewritten to `?N`.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlValue>,
}

impl Prepared {
    pub(crate) fn new(sql: &str, params: &[Value]) -> Self {
        Self {
            sql: translate_placeholders(sql).into_owned(),
            params: params.iter().map(to_sql_value).collect(),
        }
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedConnection, func: F) -> Result<R, RecordError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, RecordError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| RecordError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Timestamp(dt) => SqlValue::Text(dt.format("%F %T%.f").to_string()),
        Value::Null => SqlValue::Null,
        Value::Json(j) => SqlValue::Text(j.to_string()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value, RecordError> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

/// Run a SELECT and hand each row to `sink` in store order. `sink` returns `false` to stop early.
pub(crate) fn for_each_row(
    conn: &rusqlite::Connection,
    stmt: &Prepared,
    mut sink: impl FnMut(Row) -> bool,
) -> Result<(), RecordError> {
    let mut prepared = conn.prepare(&stmt.sql).map_err(RecordError::from_store)?;
    let column_names: Arc<Vec<String>> = Arc::new(
        prepared
            .column_names()
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
    );
    let index = Arc::new(index_columns(&column_names));
    let mut rows = prepared
        .query(rusqlite::params_from_iter(stmt.params.iter()))
        .map_err(RecordError::from_store)?;
    while let Some(row) = rows.next().map_err(RecordError::from_store)? {
        let mut values = Vec::with_capacity(column_names.len());
        for i in 0..column_names.len() {
            values.push(extract_value(row, i)?);
        }
        if !sink(Row::with_index(
            Arc::clone(&column_names),
            values,
            Arc::clone(&index),
        )) {
            break;
        }
    }
    Ok(())
}

pub(crate) fn query_rows(
    conn: &rusqlite::Connection,
    stmt: &Prepared,
) -> Result<Vec<Row>, RecordError> {
    let mut out = Vec::new();
    for_each_row(conn, stmt, |row| {
        out.push(row);
        true
    })?;
    Ok(out)
}

pub(crate) fn query_first(
    conn: &rusqlite::Connection,
    stmt: &Prepared,
) -> Result<Option<Row>, RecordError> {
    let mut first = None;
    for_each_row(conn, stmt, |row| {
        first = Some(row);
        false
    })?;
    Ok(first)
}

fn is_insert(sql: &str) -> bool {
    let head: String = sql
        .trim_start()
        .chars()
        .take(7)
        .collect::<String>()
        .to_ascii_uppercase();
    head.starts_with("INSERT") || head.starts_with("REPLACE")
}

pub(crate) fn execute(
    conn: &rusqlite::Connection,
    stmt: &Prepared,
) -> Result<ExecOutcome, RecordError> {
    let rows_affected = conn
        .execute(&stmt.sql, rusqlite::params_from_iter(stmt.params.iter()))
        .map_err(RecordError::from_store)?;
    let last_insert_id =
        (is_insert(&stmt.sql) && rows_affected > 0).then(|| conn.last_insert_rowid());
    Ok(ExecOutcome {
        last_insert_id,
        rows_affected: rows_affected as u64,
    })
}

/// `BEGIN`, every statement in order, `COMMIT`. Any failure rolls back and is returned wrapped in
/// `TransactionFailure`.
pub(crate) fn execute_in_transaction(
    conn: &rusqlite::Connection,
    statements: &[Prepared],
) -> Result<Vec<ExecOutcome>, RecordError> {
    conn.execute_batch("BEGIN")
        .map_err(|e| RecordError::TransactionFailure {
            source: Box::new(RecordError::from_store(e)),
        })?;
    let body = statements
        .iter()
        .map(|stmt| execute(conn, stmt))
        .collect::<Result<Vec<_>, _>>()
        .and_then(|outcomes| {
            conn.execute_batch("COMMIT")
                .map_err(RecordError::from_store)?;
            Ok(outcomes)
        });
    match body {
        Ok(outcomes) => Ok(outcomes),
        Err(err) => {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                tracing::debug!(error = %rollback_err, "rollback after failed transaction failed");
            }
            Err(RecordError::TransactionFailure {
                source: Box::new(err),
            })
        }
    }
}
