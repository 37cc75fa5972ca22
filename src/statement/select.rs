use crate::error::RecordError;
use crate::predicate::Filters;
use crate::table::TableDef;

use super::{
    MAX_ROWS, Order, Query, QueryAndParams, alias_for, limit_sql, order_sql, select_list,
    table_sql, where_sql,
};

/// Point lookup: at most one row matching `filters`.
///
/// # Errors
/// `SchemaViolation` for unknown filter or projection columns.
pub fn select_one(
    def: &TableDef,
    fields: Option<&[String]>,
    filters: &Filters,
) -> Result<QueryAndParams, RecordError> {
    let projection = select_list(def, fields, None)?;
    let (where_part, params) = where_sql(def, filters, None, None)?;
    Ok(QueryAndParams::new(
        format!(
            "SELECT {projection} FROM {}{where_part} LIMIT 1",
            table_sql(def)
        ),
        params,
    ))
}

/// List lookup with optional join, projection, ordering and limit.
///
/// # Errors
/// `SchemaViolation` for unknown filter, projection or ordering columns.
pub fn select(def: &TableDef, query: &Query) -> Result<QueryAndParams, RecordError> {
    let (body, params) = body(def, query)?;
    Ok(QueryAndParams::new(
        format!("{body}{}", limit_sql(query.limit)),
        params,
    ))
}

/// Row offset for a 1-based page number; anything below 1 reads page 1.
///
/// Offsets past the last representable row saturate at `i64::MAX`, which reads as an empty page.
#[must_use]
pub fn page_offset(page: i64, per_page: u32) -> u64 {
    let page = u64::try_from(page.max(1)).unwrap_or(1);
    (page - 1).saturating_mul(u64::from(per_page)).min(MAX_ROWS)
}

/// The `page`-th slice of `per_page` rows (the table default when `None`). `query.limit` is
/// ignored.
///
/// # Errors
/// Same as [`select`]; also `MalformedValue` for a zero page size.
pub fn page(
    def: &TableDef,
    page: i64,
    per_page: Option<u32>,
    query: &Query,
) -> Result<QueryAndParams, RecordError> {
    let per_page = per_page.unwrap_or(def.per_page());
    if per_page == 0 {
        return Err(RecordError::MalformedValue {
            key: "per_page".into(),
            message: "page size must be positive".into(),
        });
    }
    let (body, params) = body(def, query)?;
    Ok(QueryAndParams::new(
        format!(
            "{body} LIMIT {per_page} OFFSET {}",
            page_offset(page, per_page)
        ),
        params,
    ))
}

/// `SELECT COUNT(*) AS `count`` over the rows matching `filters`.
///
/// # Errors
/// `SchemaViolation` for unknown filter columns.
pub fn count(def: &TableDef, filters: &Filters) -> Result<QueryAndParams, RecordError> {
    let (where_part, params) = where_sql(def, filters, None, None)?;
    Ok(QueryAndParams::new(
        format!(
            "SELECT COUNT(*) AS `count` FROM {}{where_part}",
            table_sql(def)
        ),
        params,
    ))
}

/// Identity column of at most one matching row.
///
/// # Errors
/// `SchemaViolation` for unknown filter columns.
pub fn exists(def: &TableDef, filters: &Filters) -> Result<QueryAndParams, RecordError> {
    let fields = [def.primary_key().to_string()];
    select_one(def, Some(&fields), filters)
}

/// Every row, optionally ordered and limited.
///
/// # Errors
/// `SchemaViolation` for an unknown ordering column.
pub fn scan(
    def: &TableDef,
    order: &[Order],
    limit: Option<u64>,
) -> Result<QueryAndParams, RecordError> {
    let projection = select_list(def, None, None)?;
    let order_part = order_sql(def, order, None)?;
    Ok(QueryAndParams::new_without_params(format!(
        "SELECT {projection} FROM {}{order_part}{}",
        table_sql(def),
        limit_sql(limit)
    )))
}

/// SELECT .. FROM .. JOIN .. WHERE .. ORDER BY, without any LIMIT.
fn body(def: &TableDef, query: &Query) -> Result<(String, Vec<crate::types::Value>), RecordError> {
    let join = query.join.as_ref();
    let alias = alias_for(def, join);
    let projection = select_list(def, query.fields.as_deref(), alias)?;
    let (where_part, params) = where_sql(def, &query.filters, query.extra.as_ref(), join)?;
    let order_part = order_sql(def, &query.order, alias)?;
    let join_part = join.map(|j| j.sql.as_str()).unwrap_or_default();
    Ok((
        format!(
            "SELECT {projection} FROM {}{join_part}{where_part}{order_part}",
            table_sql(def)
        ),
        params,
    ))
}
