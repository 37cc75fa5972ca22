mod row;

pub use row::Row;
pub(crate) use row::index_columns;

/// Outcome of a mutation statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    /// Identity generated by the last INSERT on this connection, when the statement inserted rows.
    pub last_insert_id: Option<i64>,
    pub rows_affected: u64,
}

impl ExecOutcome {
    /// The generated identity when there is one, the affected-row count otherwise.
    #[must_use]
    pub fn id_or_count(&self) -> i64 {
        self.last_insert_id
            .unwrap_or_else(|| i64::try_from(self.rows_affected).unwrap_or(i64::MAX))
    }
}
