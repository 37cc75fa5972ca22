use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Value;

/// A row from a query result.
///
/// Column names are shared by every row of one result.
#[derive(Debug, Clone)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<Value>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a row
    ///
    /// # Arguments
    ///
    /// * `column_names` - The column names, shared with the other rows of the result
    /// * `values` - The values for this row, in column order
    ///
    /// # Returns
    ///
    /// A new `Row` with its column lookup cache built
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self::with_index(column_names, values, cache)
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        values: Vec<Value>,
        column_index_cache: Arc<HashMap<String, usize>>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index_cache,
        }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(Arc::new(names), values)
    }

    /// Column names in result order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the index of a column by name
    ///
    /// # Arguments
    ///
    /// * `column_name` - The name of the column
    ///
    /// # Returns
    ///
    /// The index of the column, or `None` if the result has no such column
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index_cache.get(column_name).copied()
    }

    /// Get a value by column name
    ///
    /// # Arguments
    ///
    /// * `column_name` - The name of the column
    ///
    /// # Returns
    ///
    /// The value at the column, or `None` if the column wasn't found
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value by position; `None` past the last column.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row into owned `(column, value)` pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.column_names.iter().cloned().zip(self.values).collect()
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
