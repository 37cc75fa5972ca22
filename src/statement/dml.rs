use crate::error::RecordError;
use crate::predicate::{Attrs, Filters, Link, Predicate, compile, quote_ident};
use crate::table::TableDef;
use crate::types::Value;

use super::{QueryAndParams, table_sql, where_sql};

fn column_list<'a>(columns: impl Iterator<Item = &'a str>) -> String {
    columns.map(quote_ident).collect::<Vec<_>>().join(", ")
}

fn row_placeholders(width: usize) -> String {
    format!("({})", vec!["%s"; width].join(", "))
}

/// Single-row INSERT. `None` when `attrs` is empty.
///
/// # Errors
/// `SchemaViolation` for columns outside the whitelist.
pub fn insert(def: &TableDef, attrs: &Attrs) -> Result<Option<QueryAndParams>, RecordError> {
    if attrs.is_empty() {
        return Ok(None);
    }
    def.schema().check(attrs.columns())?;
    let query = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table_sql(def),
        column_list(attrs.columns()),
        row_placeholders(attrs.len())
    );
    let params = attrs.iter().map(|(_, v)| v.clone()).collect();
    Ok(Some(QueryAndParams::new(query, params)))
}

/// Multi-row INSERT. The first item fixes the column list; every other item must supply exactly
/// those columns, in any order. `None` when `items` is empty.
///
/// # Errors
/// `SchemaViolation` for columns outside the whitelist, `MalformedBatch` for the first item whose
/// columns differ from the first item's, `MalformedValue` when the first item is empty.
pub fn insert_many(
    def: &TableDef,
    items: &[Attrs],
) -> Result<Option<QueryAndParams>, RecordError> {
    let Some(first) = items.first() else {
        return Ok(None);
    };
    if first.is_empty() {
        return Err(RecordError::MalformedValue {
            key: "items".into(),
            message: "first item has no columns".into(),
        });
    }
    def.schema().check(first.columns())?;
    let columns: Vec<&str> = first.columns().collect();

    let mut params: Vec<Value> = Vec::with_capacity(columns.len() * items.len());
    for (index, item) in items.iter().enumerate() {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !item.contains(c))
            .map(|c| (*c).to_string())
            .collect();
        let unexpected: Vec<String> = item
            .columns()
            .filter(|c| !columns.contains(c))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(RecordError::MalformedBatch {
                index,
                missing,
                unexpected,
            });
        }
        for column in &columns {
            if let Some(value) = item.get(column) {
                params.push(value.clone());
            }
        }
    }

    let rows = vec![row_placeholders(columns.len()); items.len()].join(", ");
    let query = format!(
        "INSERT INTO {} ({}) VALUES {rows}",
        table_sql(def),
        column_list(columns.iter().copied())
    );
    Ok(Some(QueryAndParams::new(query, params)))
}

/// DELETE of every row matching `filters`. An empty filter set is refused rather than clearing
/// the table.
///
/// # Errors
/// `MalformedValue` for empty filters, `SchemaViolation` for unknown columns.
pub fn delete(def: &TableDef, filters: &Filters) -> Result<QueryAndParams, RecordError> {
    if filters.is_empty() {
        return Err(RecordError::MalformedValue {
            key: "filters".into(),
            message: format!("refusing to delete from `{}` without a filter", def.name()),
        });
    }
    let (where_part, params) = where_sql(def, filters, None, None)?;
    Ok(QueryAndParams::new(
        format!("DELETE FROM {}{where_part}", table_sql(def)),
        params,
    ))
}

/// UPDATE with a pre-compiled SET list (see [`crate::predicate::set`]). `None` when the SET list
/// is empty. Empty `filters` update every row.
///
/// # Errors
/// `SchemaViolation` for unknown filter columns.
pub fn update_where(
    def: &TableDef,
    set: &Predicate,
    filters: &Filters,
) -> Result<Option<QueryAndParams>, RecordError> {
    if set.is_empty() {
        return Ok(None);
    }
    let (where_part, where_values) = where_sql(def, filters, None, None)?;
    let mut params = set.values.clone();
    params.extend(where_values);
    Ok(Some(QueryAndParams::new(
        format!(
            "UPDATE {} SET {}{where_part}",
            table_sql(def),
            set.clause.trim()
        ),
        params,
    )))
}

/// UPDATE of one record addressed by its identity value. `None` when `attrs` is empty.
///
/// # Errors
/// `SchemaViolation` for columns outside the whitelist.
pub fn update_record(
    def: &TableDef,
    attrs: &Attrs,
    identity: &Value,
) -> Result<Option<QueryAndParams>, RecordError> {
    if attrs.is_empty() {
        return Ok(None);
    }
    let set = compile(
        &attrs.to_filters(),
        None,
        Some(def.schema()),
        None,
        Link::Comma,
    )?;
    let filters = Filters::new().eq(def.primary_key(), identity.clone());
    update_where(def, &set, &filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::set;
    use crate::{attrs, filters};

    fn def() -> TableDef {
        TableDef::builder("test_orm")
            .columns(["id", "name", "content", "type"])
            .build()
            .unwrap()
    }

    #[test]
    fn insert_lists_columns_in_order() {
        let q = insert(&def(), &attrs! { "name" => "a", "type" => 1 })
            .unwrap()
            .unwrap();
        assert_eq!(
            q.query,
            "INSERT INTO `test_orm` (`name`, `type`) VALUES (%s, %s)"
        );
        assert_eq!(q.params, vec![Value::from("a"), Value::from(1)]);
        assert!(insert(&def(), &Attrs::new()).unwrap().is_none());
        assert!(insert(&def(), &attrs! { "nope" => 1 }).is_err());
    }

    #[test]
    fn bulk_insert_follows_first_item_columns() {
        let items = vec![
            attrs! { "name" => "a", "type" => 1 },
            attrs! { "type" => 2, "name" => "b" },
        ];
        let q = insert_many(&def(), &items).unwrap().unwrap();
        assert_eq!(
            q.query,
            "INSERT INTO `test_orm` (`name`, `type`) VALUES (%s, %s), (%s, %s)"
        );
        assert_eq!(
            q.params,
            vec![
                Value::from("a"),
                Value::from(1),
                Value::from("b"),
                Value::from(2)
            ]
        );
        assert!(insert_many(&def(), &[]).unwrap().is_none());
    }

    #[test]
    fn bulk_insert_reports_mismatched_items() {
        let items = vec![
            attrs! { "name" => "a", "type" => 1 },
            attrs! { "name" => "b", "type" => 1 },
            attrs! { "name" => "c", "content" => "x" },
        ];
        match insert_many(&def(), &items).unwrap_err() {
            RecordError::MalformedBatch {
                index,
                missing,
                unexpected,
            } => {
                assert_eq!(index, 2);
                assert_eq!(missing, vec!["type".to_string()]);
                assert_eq!(unexpected, vec!["content".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn delete_needs_a_filter() {
        let q = delete(&def(), &filters! { "id" => 4 }).unwrap();
        assert_eq!(q.query, "DELETE FROM `test_orm` WHERE (`id` = %s)");
        let err = delete(&def(), &Filters::new()).unwrap_err();
        assert_eq!(err.code(), "malformed_value");
    }

    #[test]
    fn update_where_puts_set_values_first() {
        let s = set(&filters! { "type" => 3 }).unwrap();
        let q = update_where(&def(), &s, &filters! { "name__like" => "q" })
            .unwrap()
            .unwrap();
        assert_eq!(
            q.query,
            "UPDATE `test_orm` SET `type` = %s WHERE (`name` LIKE %s)"
        );
        assert_eq!(q.params, vec![Value::from(3), Value::from("%q%")]);

        let q = update_where(&def(), &s, &Filters::new()).unwrap().unwrap();
        assert_eq!(q.query, "UPDATE `test_orm` SET `type` = %s");
        assert!(
            update_where(&def(), &Predicate::default(), &Filters::new())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn update_record_targets_identity() {
        let q = update_record(&def(), &attrs! { "name" => "z" }, &Value::from(9))
            .unwrap()
            .unwrap();
        assert_eq!(q.query, "UPDATE `test_orm` SET `name` = %s WHERE (`id` = %s)");
        assert_eq!(q.params, vec![Value::from("z"), Value::from(9)]);
        assert!(update_record(&def(), &attrs! { "bad" => 1 }, &Value::from(9)).is_err());
    }
}
