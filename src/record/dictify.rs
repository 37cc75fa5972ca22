use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::{Map, Value as JsonValue};

use crate::types::Value;

use super::Record;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type Formatter = Arc<dyn Fn(&NaiveDateTime) -> String + Send + Sync>;

/// Options for [`Record::dictify`].
#[derive(Clone)]
pub struct DictOptions {
    /// Columns to include; `None` means every loaded column.
    pub fields: Option<Vec<String>>,
    /// Render date/time values through `formatter`. Text that parses as a timestamp counts, since
    /// SQLite hands timestamps back as text.
    pub convert_dates: bool,
    formatter: Formatter,
}

impl Default for DictOptions {
    fn default() -> Self {
        Self {
            fields: None,
            convert_dates: true,
            formatter: Arc::new(|dt| dt.format(DEFAULT_DATE_FORMAT).to_string()),
        }
    }
}

impl fmt::Debug for DictOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictOptions")
            .field("fields", &self.fields)
            .field("convert_dates", &self.convert_dates)
            .finish_non_exhaustive()
    }
}

impl DictOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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
    pub fn convert_dates(mut self, convert: bool) -> Self {
        self.convert_dates = convert;
        self
    }

    #[must_use]
    pub fn formatter(
        mut self,
        f: impl Fn(&NaiveDateTime) -> String + Send + Sync + 'static,
    ) -> Self {
        self.formatter = Arc::new(f);
        self
    }

    fn render(&self, value: &Value) -> JsonValue {
        if self.convert_dates
            && matches!(value, Value::Timestamp(_) | Value::Text(_))
            && let Some(dt) = value.as_timestamp()
        {
            return JsonValue::String((self.formatter)(&dt));
        }
        value.to_json()
    }
}

impl Record {
    /// Plain map of the record's columns.
    #[must_use]
    pub fn dictify(&self, options: &DictOptions) -> Map<String, JsonValue> {
        self.iter()
            .filter(|(column, _)| {
                options
                    .fields
                    .as_ref()
                    .is_none_or(|f| f.iter().any(|c| c == column))
            })
            .map(|(column, value)| (column.to_string(), options.render(value)))
            .collect()
    }
}
