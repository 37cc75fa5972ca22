//! Keyword filters compiled into parameterized SQL fragments.
//!
//! Every compiled fragment is a [`Predicate`]: a clause using `%s` placeholders plus the values to
//! bind, in placeholder order. Values never end up inside the SQL text.

mod filter;
mod join;

pub use filter::{Attrs, Filter, FilterValue, Filters, OPERATOR_DELIMITER, Op};
pub use join::{Join, join};

use crate::error::RecordError;
use crate::translation::count_placeholders;
use crate::types::Value;

/// Compiled `(clause, values)` pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    pub clause: String,
    pub values: Vec<Value>,
}

impl Predicate {
    pub fn new(clause: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            values,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clause.trim().is_empty()
    }

    /// Number of `%s` placeholders in the clause.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.clause)
    }

    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.clause, self.values)
    }
}

/// Word placed between compiled terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    And,
    Or,
    /// SET lists: comma separated, never parenthesized.
    Comma,
}

impl Link {
    fn separator(self) -> &'static str {
        match self {
            Link::And => " AND ",
            Link::Or => " OR ",
            Link::Comma => ", ",
        }
    }
}

/// Column whitelist a compile is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
}

impl<'a> Schema<'a> {
    #[must_use]
    pub fn new(table: &'a str, columns: &'a [String]) -> Self {
        Self { table, columns }
    }

    /// Fail with `SchemaViolation` listing every key outside the whitelist.
    ///
    /// # Errors
    /// Returns `RecordError::SchemaViolation` when any key is unknown.
    pub fn check<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Result<(), RecordError> {
        let mut unknown: Vec<String> = Vec::new();
        for key in keys {
            if !self.columns.iter().any(|c| c == key) && !unknown.iter().any(|u| u == key) {
                unknown.push(key.to_string());
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RecordError::SchemaViolation {
                table: self.table.to_string(),
                keys: unknown,
            })
        }
    }
}

/// Back-quote an identifier, doubling embedded back-quotes.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub(crate) fn qualified(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{alias}.{}", quote_ident(column)),
        None => quote_ident(column),
    }
}

/// Compile `filters` into a predicate.
///
/// `extra` is appended verbatim after the filter terms (and after `filters`' own fragments). When
/// `schema` is given every filter column must belong to it; the check runs before any SQL is built.
/// `alias` qualifies columns as ``alias.`column` ``.
///
/// # Errors
/// `SchemaViolation` for unknown columns, `MalformedValue` for empty OR-groups, bad LIKE operands,
/// or operators that make no sense in a SET list.
pub fn compile(
    filters: &Filters,
    extra: Option<&Predicate>,
    schema: Option<Schema<'_>>,
    alias: Option<&str>,
    link: Link,
) -> Result<Predicate, RecordError> {
    if let Some(schema) = schema {
        schema.check(filters.columns())?;
    }

    let mut terms: Vec<String> = Vec::with_capacity(filters.len() + 1);
    let mut values: Vec<Value> = Vec::new();

    for filter in filters.entries() {
        let column = qualified(alias, &filter.column);
        if link == Link::Comma && filter.op != Op::Eq {
            return Err(RecordError::MalformedValue {
                key: filter.column.clone(),
                message: format!("operator `{}` is not allowed in a SET list", filter.op.sql()),
            });
        }
        match &filter.value {
            FilterValue::Any(items) if items.is_empty() => {
                return Err(RecordError::MalformedValue {
                    key: filter.column.clone(),
                    message: "empty value sequence".into(),
                });
            }
            FilterValue::Any(items) if items.len() == 1 => {
                terms.push(term(&column, filter.op));
                values.push(filter.op.bind(&filter.column, items[0].clone())?);
            }
            FilterValue::Any(items) => {
                if link == Link::Comma {
                    return Err(RecordError::MalformedValue {
                        key: filter.column.clone(),
                        message: "a SET list takes a single value per column".into(),
                    });
                }
                let group: Vec<String> = items.iter().map(|_| term(&column, filter.op)).collect();
                terms.push(format!("({})", group.join(" OR ")));
                for item in items {
                    values.push(filter.op.bind(&filter.column, item.clone())?);
                }
            }
            FilterValue::One(value) => {
                terms.push(term(&column, filter.op));
                values.push(filter.op.bind(&filter.column, value.clone())?);
            }
        }
    }

    for fragment in filters.fragments().iter().chain(extra) {
        if fragment.is_empty() {
            continue;
        }
        terms.push(fragment.clause.trim().to_string());
        values.extend(fragment.values.iter().cloned());
    }

    if terms.is_empty() {
        return Ok(Predicate::default());
    }
    let joined = terms.join(link.separator());
    let clause = match link {
        Link::Comma => joined,
        Link::And | Link::Or if terms.len() == 1 && filters.entries().is_empty() => joined,
        Link::And | Link::Or => format!("({joined})"),
    };
    Ok(Predicate::new(clause, values))
}

fn term(column: &str, op: Op) -> String {
    format!("{column} {} %s", op.sql())
}

/// Terms joined with AND.
///
/// # Errors
/// See [`compile`].
pub fn and(filters: &Filters) -> Result<Predicate, RecordError> {
    compile(filters, None, None, None, Link::And)
}

/// Terms joined with OR.
///
/// # Errors
/// See [`compile`].
pub fn or(filters: &Filters) -> Result<Predicate, RecordError> {
    compile(filters, None, None, None, Link::Or)
}

/// Same as [`and`]; reads better at WHERE call sites.
///
/// # Errors
/// See [`compile`].
pub fn where_clause(filters: &Filters) -> Result<Predicate, RecordError> {
    and(filters)
}

/// Comma-joined assignments for an UPDATE, without the `SET` keyword.
///
/// # Errors
/// See [`compile`].
pub fn set(filters: &Filters) -> Result<Predicate, RecordError> {
    compile(filters, None, None, None, Link::Comma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn equality_and_operators() {
        let p = and(&filters! { "name" => "a", "age__gt" => 3, "age__le" => 9 }).unwrap();
        assert_eq!(p.clause, "(`name` = %s AND `age` > %s AND `age` <= %s)");
        assert_eq!(p.values, vec![Value::from("a"), Value::from(3), Value::from(9)]);
    }

    #[test]
    fn every_operator_has_its_symbol() {
        let p = and(&filters! {
            "a__lt" => 1, "b__ge" => 2, "c__no" => 3, "d__like" => "x"
        })
        .unwrap();
        assert_eq!(
            p.clause,
            "(`a` < %s AND `b` >= %s AND `c` <> %s AND `d` LIKE %s)"
        );
        assert_eq!(p.values[3], Value::from("%x%"));
    }

    #[test]
    fn placeholder_count_matches_value_count() {
        let cases = [
            filters! { "id" => 1 },
            filters! { "id" => 1, "name__like" => "q" },
            Filters::new().any("id", [1, 2, 3]).with("type", 2),
            Filters::new().any("id", [7]),
        ];
        for f in &cases {
            let p = compile(f, None, None, None, Link::And).unwrap();
            assert_eq!(p.placeholder_count(), p.values.len(), "clause: {}", p.clause);
        }
    }

    #[test]
    fn or_group_keeps_order_and_parens() {
        let p = and(&Filters::new().with("status", 1).any("id", [5, 3, 9])).unwrap();
        assert_eq!(
            p.clause,
            "(`status` = %s AND (`id` = %s OR `id` = %s OR `id` = %s))"
        );
        assert_eq!(
            p.values,
            vec![Value::from(1), Value::from(5), Value::from(3), Value::from(9)]
        );
    }

    #[test]
    fn single_element_sequence_is_scalar() {
        let p = and(&Filters::new().any("id", [4])).unwrap();
        assert_eq!(p.clause, "(`id` = %s)");
        assert_eq!(p.values, vec![Value::from(4)]);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let err = and(&Filters::new().any("id", Vec::<i64>::new())).unwrap_err();
        assert_eq!(err.code(), "malformed_value");
        assert_eq!(err.offending_keys(), vec!["id".to_string()]);
    }

    #[test]
    fn whitelist_rejects_before_building() {
        let whitelist = cols(&["id", "name"]);
        let f = filters! { "name" => "a", "bogus__gt" => 1, "other" => 2 };
        let err = compile(&f, None, Some(Schema::new("t", &whitelist)), None, Link::And)
            .unwrap_err();
        match err {
            RecordError::SchemaViolation { table, keys } => {
                assert_eq!(table, "t");
                assert_eq!(keys, vec!["bogus".to_string(), "other".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // the base name is what gets checked
        let ok = filters! { "name__like" => "a" };
        assert!(compile(&ok, None, Some(Schema::new("t", &whitelist)), None, Link::And).is_ok());
    }

    #[test]
    fn alias_qualifies_columns() {
        let p = compile(
            &filters! { "status" => 1 },
            None,
            None,
            Some("items"),
            Link::And,
        )
        .unwrap();
        assert_eq!(p.clause, "(items.`status` = %s)");
    }

    #[test]
    fn fragments_join_with_the_same_link() {
        let inner = or(&filters! { "type" => 1, "type__gt" => 5 }).unwrap();
        assert_eq!(inner.clause, "(`type` = %s OR `type` > %s)");
        let outer = and(&filters! { "status" => 1 }.fragment(inner)).unwrap();
        assert_eq!(
            outer.clause,
            "(`status` = %s AND (`type` = %s OR `type` > %s))"
        );
        assert_eq!(outer.values.len(), 3);

        let extra = Predicate::new("`x` IS NOT NULL", vec![]);
        let p = compile(&Filters::new(), Some(&extra), None, None, Link::And).unwrap();
        assert_eq!(p.clause, "`x` IS NOT NULL");
    }

    #[test]
    fn set_list_is_comma_joined_without_parens() {
        let p = set(&filters! { "name" => "z", "type" => 2 }).unwrap();
        assert_eq!(p.clause, "`name` = %s, `type` = %s");
        assert_eq!(p.values, vec![Value::from("z"), Value::from(2)]);

        assert!(set(&filters! { "age__gt" => 1 }).is_err());
        assert!(set(&Filters::new().any("id", [1, 2])).is_err());
    }

    #[test]
    fn empty_filters_compile_to_empty_predicate() {
        let p = where_clause(&Filters::new()).unwrap();
        assert!(p.is_empty());
        assert!(p.values.is_empty());
    }

    #[test]
    fn quoting_doubles_backquotes() {
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }
}
