//! Convenient imports for common functionality.
//!
//! ```rust
//! use sql_record::prelude::*;
//! ```

pub use crate::error::RecordError;
pub use crate::pool::{
    ConnectionPool, ExecMode, Executed, PoolConfig, PoolConfigBuilder, PoolStatus, RowIter,
};
pub use crate::predicate::{
    Attrs, Filter, FilterValue, Filters, Join, Op, Predicate, and, join, or, set, where_clause,
};
pub use crate::record::{DictOptions, Record, RecordIter, Table};
pub use crate::results::{ExecOutcome, Row};
pub use crate::statement::{Direction, Order, Query, QueryAndParams};
pub use crate::table::{TableDef, TableDefBuilder};
pub use crate::translation::translate_placeholders;
pub use crate::types::Value;
pub use crate::{attrs, filters};
