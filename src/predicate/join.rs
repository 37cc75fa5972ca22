use crate::error::RecordError;
use crate::types::Value;

use super::{Filters, Link, Predicate, compile, quote_ident};

/// A single extra table joined into a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// ``" JOIN `table` ON <condition>"``
    pub sql: String,
    /// Filters scoped to the joined table, qualified with its name.
    pub predicate: Predicate,
}

impl Join {
    /// `(join fragment, predicate clause, predicate values)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String, Vec<Value>) {
        let (clause, values) = self.predicate.into_parts();
        (self.sql, clause, values)
    }
}

/// Join `table` on the raw `on` condition, with optional filters on the joined table.
///
/// ```rust
/// use sql_record::prelude::*;
///
/// let j = join("items", "items.id = topic_item.item_id", &filters! { "status" => 1 }).unwrap();
/// assert_eq!(j.sql, " JOIN `items` ON items.id = topic_item.item_id");
/// assert_eq!(j.predicate.clause, "(items.`status` = %s)");
/// ```
///
/// # Errors
/// `MalformedValue` when the table name or condition is empty, plus anything [`compile`] reports.
pub fn join(table: &str, on: &str, filters: &Filters) -> Result<Join, RecordError> {
    if table.trim().is_empty() {
        return Err(RecordError::MalformedValue {
            key: "join".into(),
            message: "join table name is empty".into(),
        });
    }
    if on.trim().is_empty() {
        return Err(RecordError::MalformedValue {
            key: table.to_string(),
            message: "join condition is empty".into(),
        });
    }
    let predicate = compile(filters, None, None, Some(table), Link::And)?;
    Ok(Join {
        sql: format!(" JOIN {} ON {}", quote_ident(table), on.trim()),
        predicate,
    })
}
