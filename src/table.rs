use std::sync::LazyLock;

use regex::Regex;

use crate::error::RecordError;
use crate::predicate::Schema;

/// Default number of rows per page.
pub const DEFAULT_PER_PAGE: u32 = 10;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| panic!("identifier regex: {e}"))
});

/// Static description of one table: name, column whitelist, identity column, page size and echo
/// flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    columns: Vec<String>,
    primary_key: String,
    per_page: u32,
    echo: bool,
}

impl TableDef {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableDefBuilder {
        TableDefBuilder::new(name)
    }

    /// Unquoted table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column whitelist in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Identity column; `id` unless the builder said otherwise.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Page size used when `page` is called without one.
    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Whether generated SQL is logged.
    #[must_use]
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Check a column against the whitelist
    ///
    /// # Arguments
    ///
    /// * `column` - Bare column name, without quoting or table prefix
    ///
    /// # Returns
    ///
    /// `true` when the column was declared on this table
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Whitelist view used by the predicate compiler.
    #[must_use]
    pub fn schema(&self) -> Schema<'_> {
        Schema::new(&self.name, &self.columns)
    }
}

/// Fluent builder for [`TableDef`].
#[derive(Debug, Clone)]
pub struct TableDefBuilder {
    name: String,
    columns: Vec<String>,
    primary_key: String,
    per_page: u32,
    echo: bool,
}

impl TableDefBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: "id".to_string(),
            per_page: DEFAULT_PER_PAGE,
            echo: false,
        }
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Identity column used by `update`/`save` and the re-fetch after insert. Defaults to `id`.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    #[must_use]
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    #[must_use]
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// Returns `RecordError::ConfigError` for an empty whitelist, duplicate or malformed
    /// identifiers, an identity column outside the whitelist, or a zero page size.
    pub fn build(self) -> Result<TableDef, RecordError> {
        if !IDENTIFIER.is_match(&self.name) {
            return Err(RecordError::ConfigError(format!(
                "invalid table name `{}`",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(RecordError::ConfigError(format!(
                "table `{}` needs at least one column",
                self.name
            )));
        }
        for (i, column) in self.columns.iter().enumerate() {
            if !IDENTIFIER.is_match(column) {
                return Err(RecordError::ConfigError(format!(
                    "invalid column name `{column}` on `{}`",
                    self.name
                )));
            }
            if self.columns[..i].contains(column) {
                return Err(RecordError::ConfigError(format!(
                    "duplicate column `{column}` on `{}`",
                    self.name
                )));
            }
        }
        if !self.columns.contains(&self.primary_key) {
            return Err(RecordError::ConfigError(format!(
                "identity column `{}` is not a column of `{}`",
                self.primary_key, self.name
            )));
        }
        if self.per_page == 0 {
            return Err(RecordError::ConfigError(format!(
                "page size for `{}` must be positive",
                self.name
            )));
        }
        Ok(TableDef {
            name: self.name,
            columns: self.columns,
            primary_key: self.primary_key,
            per_page: self.per_page,
            echo: self.echo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let def = TableDef::builder("test_orm")
            .columns(["id", "name", "content", "type"])
            .build()
            .unwrap();
        assert_eq!(def.primary_key(), "id");
        assert_eq!(def.per_page(), DEFAULT_PER_PAGE);
        assert!(!def.echo());
        assert!(def.has_column("type"));
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(TableDef::builder("t").build().is_err());
        assert!(TableDef::builder("t; drop").columns(["id"]).build().is_err());
        assert!(TableDef::builder("t").columns(["id", "id"]).build().is_err());
        assert!(TableDef::builder("t").columns(["name"]).build().is_err());
        assert!(TableDef::builder("t").columns(["id", "na me"]).build().is_err());
        assert!(TableDef::builder("t").columns(["id"]).per_page(0).build().is_err());
    }
}
