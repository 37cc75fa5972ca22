use tokio::sync::mpsc;

use crate::error::RecordError;
use crate::results::Row;

use super::PooledStore;
use super::executor::{Prepared, for_each_row};

/// Rows buffered ahead of the consumer.
const ITER_BUFFER: usize = 64;

/// Lazy, finite stream of rows from one query.
///
/// The connection stays checked out while rows are produced and goes back to the pool once the
/// query is exhausted or the iterator is dropped. Not restartable.
#[derive(Debug)]
pub struct RowIter {
    rx: mpsc::Receiver<Result<Row, RecordError>>,
}

impl RowIter {
    pub(crate) fn spawn(mut conn: PooledStore, stmt: Prepared) -> Self {
        let (tx, rx) = mpsc::channel(ITER_BUFFER);
        tokio::task::spawn_blocking(move || {
            let handle = conn.handle();
            let result = {
                let guard = handle.blocking_lock();
                for_each_row(&guard, &stmt, |row| tx.blocking_send(Ok(row)).is_ok())
            };
            conn.settle(&result);
            if let Err(err) = result {
                // receiver may already be gone
                let _ = tx.blocking_send(Err(err));
            }
        });
        Self { rx }
    }

    /// Next row, or `None` once the query is exhausted.
    pub async fn next(&mut self) -> Option<Result<Row, RecordError>> {
        self.rx.recv().await
    }

    /// Drain the remaining rows.
    ///
    /// # Errors
    /// The first error produced by the query.
    pub async fn collect_rows(mut self) -> Result<Vec<Row>, RecordError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}
