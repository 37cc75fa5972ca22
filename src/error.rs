use thiserror::Error;

/// Errors raised by the compiler, the statement builder, the pool and the record layer.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A filter, update or insert key is not part of the table's column whitelist.
    #[error("Schema violation on `{table}`: unknown column(s) {keys:?}")]
    SchemaViolation { table: String, keys: Vec<String> },

    #[error("Malformed value for `{key}`: {message}")]
    MalformedValue { key: String, message: String },

    /// A bulk insert item does not supply exactly the columns of the first item.
    #[error("Malformed batch at item {index}: missing {missing:?}, unexpected {unexpected:?}")]
    MalformedBatch {
        index: usize,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Duplicate key: {source}")]
    DuplicateKey {
        #[source]
        source: rusqlite::Error,
    },

    #[error("Insert into `{table}` failed after {attempts} attempts: {source}")]
    InsertExhausted {
        table: String,
        attempts: u32,
        #[source]
        source: Box<RecordError>,
    },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The transaction was rolled back; `source` is the error that caused it.
    #[error("Transaction rolled back: {source}")]
    TransactionFailure {
        #[source]
        source: Box<RecordError>,
    },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl RecordError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::SchemaViolation { .. } => "schema_violation",
            RecordError::MalformedValue { .. } => "malformed_value",
            RecordError::MalformedBatch { .. } => "malformed_batch",
            RecordError::DuplicateKey { .. } => "duplicate_key",
            RecordError::InsertExhausted { .. } => "insert_exhausted",
            RecordError::ConnectionLost(_) => "connection_lost",
            RecordError::TransactionFailure { .. } => "transaction_failure",
            RecordError::Store(_) => "store_error",
            RecordError::ConfigError(_) => "config_error",
            RecordError::ExecutionError(_) => "execution_error",
        }
    }

    /// Keys the error refers to, if any.
    #[must_use]
    pub fn offending_keys(&self) -> Vec<String> {
        match self {
            RecordError::SchemaViolation { keys, .. } => keys.clone(),
            RecordError::MalformedValue { key, .. } => vec![key.clone()],
            RecordError::MalformedBatch {
                missing,
                unexpected,
                ..
            } => missing.iter().chain(unexpected).cloned().collect(),
            RecordError::InsertExhausted { source, .. }
            | RecordError::TransactionFailure { source } => source.offending_keys(),
            _ => Vec::new(),
        }
    }

    /// True for unique or primary-key collisions.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            RecordError::DuplicateKey { .. } => true,
            RecordError::TransactionFailure { source } => source.is_duplicate_key(),
            _ => false,
        }
    }

    /// Sort a backend error into `DuplicateKey` or a plain store error.
    pub(crate) fn from_store(err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            RecordError::DuplicateKey { source: err }
        } else {
            RecordError::Store(err)
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => matches!(
            inner.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

impl From<bb8::RunError<RecordError>> for RecordError {
    fn from(err: bb8::RunError<RecordError>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner,
            bb8::RunError::TimedOut => {
                RecordError::ConnectionLost("timed out waiting for a pooled connection".into())
            }
        }
    }
}
