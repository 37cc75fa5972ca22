//! Active-record tables over a pooled SQLite store.
//!
//! Keyword filters (`"age__gt" => 30`) compile into parameterized SQL fragments, a statement
//! builder turns them into complete statements checked against each table's column whitelist,
//! and a bb8 pool runs them with idle-aware health checks and transparent reconnection.
//!
//! ```rust,no_run
//! use sql_record::prelude::*;
//!
//! # async fn demo() -> Result<(), RecordError> {
//! let pool = ConnectionPool::builder("app.db")
//!     .pre_execute("PRAGMA foreign_keys = ON")
//!     .build()?;
//! let users = Table::builder("users")
//!     .columns(["id", "name", "age"])
//!     .bind(&pool)?;
//!
//! let mut alice = users.new(attrs! { "name" => "alice", "age" => 31 }).await?.unwrap();
//! alice.set("age", 32)?;
//! alice.save().await?;
//!
//! let adults = users
//!     .find(Query::new().filter(filters! { "age__ge" => 18 }).order_by(Order::desc("id")))
//!     .await?;
//! # let _ = adults;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pool;
pub mod predicate;
pub mod prelude;
pub mod record;
pub mod results;
pub mod statement;
pub mod table;
pub mod translation;
pub mod types;

pub use error::RecordError;
pub use pool::{ConnectionPool, PoolConfig};
pub use record::{Record, Table};
pub use types::Value;
