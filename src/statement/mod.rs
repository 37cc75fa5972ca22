//! Complete statements for a [`TableDef`], built from compiled predicates.
//!
//! Everything here is pure: no I/O, no shared state.

use std::fmt;

use crate::error::RecordError;
use crate::predicate::{Filters, Join, Link, Predicate, compile, qualified, quote_ident};
use crate::table::TableDef;
use crate::types::Value;

mod dml;
mod select;

pub use dml::{delete, insert, insert_many, update_record, update_where};
pub use select::{count, exists, page, page_offset, scan, select, select_one};

/// SQL text with `%s` placeholders and the parameters to bind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryAndParams {
    pub query: String,
    pub params: Vec<Value>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }
}

/// Query text followed by its parameters, as echoed to the log.
impl fmt::Display for QueryAndParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)?;
        if !self.params.is_empty() {
            f.write_str(" -- [")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{p}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term on a whitelisted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Options of a list lookup: filters, an extra pre-built fragment, one join, a projection,
/// ordering and an optional limit.
///
/// `limit: None` means no LIMIT clause; `Some(0)` emits `LIMIT 0`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Filters,
    pub extra: Option<Predicate>,
    pub join: Option<Join>,
    pub fields: Option<Vec<String>>,
    pub order: Vec<Order>,
    pub limit: Option<u64>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Pre-built fragment ANDed with the filters, e.g. an `or(..)` group.
    #[must_use]
    pub fn args(mut self, predicate: Predicate) -> Self {
        self.extra = Some(predicate);
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Filters> for Query {
    fn from(filters: Filters) -> Self {
        Query::new().filter(filters)
    }
}

/// Alias used to qualify columns; only set when a join is present.
fn alias_for<'a>(def: &'a TableDef, join: Option<&Join>) -> Option<&'a str> {
    join.map(|_| def.name())
}

/// Projection list. `None` selects every whitelisted column.
fn select_list(
    def: &TableDef,
    fields: Option<&[String]>,
    alias: Option<&str>,
) -> Result<String, RecordError> {
    let fields = fields.unwrap_or(def.columns());
    if fields.is_empty() {
        return Err(RecordError::MalformedValue {
            key: "fields".into(),
            message: "projection is empty".into(),
        });
    }
    def.schema().check(fields.iter().map(String::as_str))?;
    Ok(fields
        .iter()
        .map(|f| qualified(alias, f))
        .collect::<Vec<_>>()
        .join(", "))
}

/// `" WHERE ..."` (or nothing) for filters, an extra fragment and a join predicate.
fn where_sql(
    def: &TableDef,
    filters: &Filters,
    extra: Option<&Predicate>,
    join: Option<&Join>,
) -> Result<(String, Vec<Value>), RecordError> {
    let alias = alias_for(def, join);
    let mut predicate = compile(filters, extra, Some(def.schema()), alias, Link::And)?;
    if let Some(join) = join
        && !join.predicate.is_empty()
    {
        if predicate.is_empty() {
            predicate = join.predicate.clone();
        } else {
            predicate.clause = format!("{} AND {}", predicate.clause, join.predicate.clause);
            predicate.values.extend(join.predicate.values.iter().cloned());
        }
    }
    if predicate.is_empty() {
        Ok((String::new(), predicate.values))
    } else {
        Ok((format!(" WHERE {}", predicate.clause), predicate.values))
    }
}

fn order_sql(def: &TableDef, order: &[Order], alias: Option<&str>) -> Result<String, RecordError> {
    if order.is_empty() {
        return Ok(String::new());
    }
    def.schema().check(order.iter().map(|o| o.column.as_str()))?;
    let terms: Vec<String> = order
        .iter()
        .map(|o| {
            let dir = match o.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!("{} {dir}", qualified(alias, &o.column))
        })
        .collect();
    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

/// Largest LIMIT or OFFSET the store accepts as an integer.
pub(crate) const MAX_ROWS: u64 = i64::MAX.unsigned_abs();

fn limit_sql(limit: Option<u64>) -> String {
    limit
        .map(|n| format!(" LIMIT {}", n.min(MAX_ROWS)))
        .unwrap_or_default()
}

fn table_sql(def: &TableDef) -> String {
    quote_ident(def.name())
}
