use chrono::NaiveDateTime;

use crate::error::RecordError;
use crate::types::Value;

use super::Predicate;

/// Separator between a column name and its operator suffix in keyword keys (`age__gt`).
pub const OPERATOR_DELIMITER: &str = "__";

/// Comparison operator attached to a filter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Op {
    #[default]
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
    /// Substring match; the bound value is wrapped as `%value%`.
    Like,
}

impl Op {
    /// Parse a keyword suffix (`gt`, `lt`, `ge`, `le`, `no`, `like`).
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Op> {
        match suffix {
            "gt" => Some(Op::Gt),
            "lt" => Some(Op::Lt),
            "ge" => Some(Op::Ge),
            "le" => Some(Op::Le),
            "no" => Some(Op::Ne),
            "like" => Some(Op::Like),
            _ => None,
        }
    }

    #[must_use]
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Op::Eq => None,
            Op::Gt => Some("gt"),
            Op::Lt => Some("lt"),
            Op::Ge => Some("ge"),
            Op::Le => Some("le"),
            Op::Ne => Some("no"),
            Op::Like => Some("like"),
        }
    }

    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Ne => "<>",
            Op::Like => "LIKE",
        }
    }

    /// Split a keyword key into its column and operator.
    ///
    /// An unknown suffix is not an operator: the whole key stays the column name, so a whitelist
    /// check rejects it instead of silently comparing for equality.
    #[must_use]
    pub fn split_key(key: &str) -> (&str, Op) {
        if let Some((column, suffix)) = key.rsplit_once(OPERATOR_DELIMITER)
            && let Some(op) = Op::from_suffix(suffix)
            && !column.is_empty()
        {
            return (column, op);
        }
        (key, Op::Eq)
    }

    /// Value actually bound for this operator.
    pub(crate) fn bind(self, column: &str, value: Value) -> Result<Value, RecordError> {
        if self != Op::Like {
            return Ok(value);
        }
        let inner = match value {
            Value::Text(s) => s,
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            other => {
                return Err(RecordError::MalformedValue {
                    key: column.to_string(),
                    message: format!("LIKE needs a text or numeric value, got {other:?}"),
                });
            }
        };
        Ok(Value::Text(format!("%{inner}%")))
    }
}

/// Right-hand side of a filter: a single value or an OR-group.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    One(Value),
    /// Compiled as a parenthesized disjunction; must not be empty.
    Any(Vec<Value>),
}

impl FilterValue {
    /// OR-group from any sequence of values.
    pub fn any<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        FilterValue::Any(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        FilterValue::One(v)
    }
}

impl From<Vec<Value>> for FilterValue {
    fn from(v: Vec<Value>) -> Self {
        FilterValue::Any(v)
    }
}

macro_rules! impl_filter_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FilterValue {
                fn from(v: $t) -> Self {
                    FilterValue::One(Value::from(v))
                }
            }
        )*
    };
}

impl_filter_value_from!(
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    bool,
    &str,
    String,
    &String,
    NaiveDateTime
);

impl<T: Into<Value>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        FilterValue::One(Value::from(v))
    }
}

/// One `(column, operator, value)` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Op,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: Op, value: impl Into<FilterValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Build from a keyword key such as `"age__gt"`.
    pub fn keyword(key: &str, value: impl Into<FilterValue>) -> Self {
        let (column, op) = Op::split_key(key);
        Self::new(column, op, value)
    }
}

/// Ordered filter entries plus pre-built fragments appended after them.
///
/// ```rust
/// use sql_record::prelude::*;
///
/// let filters = Filters::new()
///     .with("status", 1)
///     .with("age__gt", 30)
///     .any("type", [1, 2]);
/// assert_eq!(filters.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filters {
    entries: Vec<Filter>,
    fragments: Vec<Predicate>,
}

impl Filters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, filter: Filter) -> Self {
        self.entries.push(filter);
        self
    }

    /// Keyword-style entry (`"name"`, `"age__gt"`, `"title__like"`).
    #[must_use]
    pub fn with(self, key: &str, value: impl Into<FilterValue>) -> Self {
        self.push(Filter::keyword(key, value))
    }

    #[must_use]
    pub fn op(self, column: &str, op: Op, value: impl Into<FilterValue>) -> Self {
        self.push(Filter::new(column, op, value))
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Eq, value)
    }

    #[must_use]
    pub fn gt(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Gt, value)
    }

    #[must_use]
    pub fn lt(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Lt, value)
    }

    #[must_use]
    pub fn ge(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Ge, value)
    }

    #[must_use]
    pub fn le(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Le, value)
    }

    #[must_use]
    pub fn ne(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Ne, value)
    }

    #[must_use]
    pub fn like(self, column: &str, value: impl Into<FilterValue>) -> Self {
        self.op(column, Op::Like, value)
    }

    /// OR-group of equality terms on `column`.
    #[must_use]
    pub fn any<T: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = T>) -> Self {
        self.op(column, Op::Eq, FilterValue::any(values))
    }

    /// Append a pre-built fragment (an `or(..)` group, a join predicate).
    #[must_use]
    pub fn fragment(mut self, predicate: Predicate) -> Self {
        if !predicate.is_empty() {
            self.fragments.push(predicate);
        }
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[Filter] {
        &self.entries
    }

    #[must_use]
    pub fn fragments(&self) -> &[Predicate] {
        &self.fragments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() + self.fragments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.fragments.is_empty()
    }

    /// Base column names of every entry, in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|f| f.column.as_str())
    }
}

impl<K: AsRef<str>, V: Into<FilterValue>> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Filters::new(), |acc, (k, v)| acc.with(k.as_ref(), v))
    }
}

/// Ordered `(column, value)` pairs for inserts and updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs(Vec<(String, Value)>);

impl Attrs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column`; a repeated column keeps its first position and takes the new value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.0.push((column, value));
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Equality filters for every pair, used to compile SET clauses.
    #[must_use]
    pub fn to_filters(&self) -> Filters {
        self.0
            .iter()
            .fold(Filters::new(), |acc, (c, v)| acc.eq(c, v.clone()))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Attrs::new(), |acc, (k, v)| acc.with(k, v))
    }
}

impl IntoIterator for Attrs {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Keyword-style filters: `filters! { "name" => "x", "age__gt" => 30 }`.
#[macro_export]
macro_rules! filters {
    () => { $crate::predicate::Filters::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::predicate::Filters::new()$(.with($key, $value))+
    };
}

/// Column/value pairs: `attrs! { "name" => "x", "type" => 1 }`.
#[macro_export]
macro_rules! attrs {
    () => { $crate::predicate::Attrs::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::predicate::Attrs::new()$(.with($key, $value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_keys_split_into_column_and_operator() {
        assert_eq!(Op::split_key("age__gt"), ("age", Op::Gt));
        assert_eq!(Op::split_key("name__no"), ("name", Op::Ne));
        assert_eq!(Op::split_key("title__like"), ("title", Op::Like));
        assert_eq!(Op::split_key("name"), ("name", Op::Eq));
        // unknown suffix keeps the full key as the column
        assert_eq!(Op::split_key("name__xx"), ("name__xx", Op::Eq));
        assert_eq!(Op::split_key("__gt"), ("__gt", Op::Eq));
    }

    #[test]
    fn like_wraps_text_and_numbers() {
        assert_eq!(
            Op::Like.bind("t", Value::from("abc")).unwrap(),
            Value::from("%abc%")
        );
        assert_eq!(Op::Like.bind("t", Value::from(12)).unwrap(), Value::from("%12%"));
        assert!(Op::Like.bind("t", Value::Null).is_err());
        assert_eq!(Op::Gt.bind("t", Value::from(1)).unwrap(), Value::from(1));
    }

    #[test]
    fn macros_preserve_order() {
        let f = crate::filters! { "b" => 1, "a__le" => 2 };
        let cols: Vec<&str> = f.columns().collect();
        assert_eq!(cols, vec!["b", "a"]);
        assert_eq!(f.entries()[1].op, Op::Le);

        let a = crate::attrs! { "name" => "x", "type" => 1, "name" => "y" };
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("name"), Some(&Value::from("y")));
    }

    #[test]
    fn from_iterator_parses_keywords() {
        let f: Filters = vec![("id__ge", 3), ("status", 1)].into_iter().collect();
        assert_eq!(f.entries()[0], Filter::new("id", Op::Ge, 3));
        assert_eq!(f.entries()[1], Filter::new("status", Op::Eq, 1));
    }
}
