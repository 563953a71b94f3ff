//! DataFusion-backed operations for hivelake tables.
//!
//! `hivelake-core` owns storage and metadata but never evaluates an
//! expression. This crate adds everything that needs a compute engine:
//!
//! - [`TableOperation`] and [`TableQuery`], plain descriptions built with
//!   [`table`].
//! - Partition pruning of filter and delete predicates.
//! - The delete executor and the query planner.
//! - The [`Database`] handle, opened with [`connect`].
//!
//! Predicates are DataFusion logical expressions; `col`, `lit` and
//! `ScalarValue` are re-exported for convenience.
#![deny(missing_docs)]

mod database;
mod delete;
mod error;
mod operation;
mod options;
mod planner;
mod pruning;
mod query;
mod rowset;

pub use database::{Database, connect, connect_with_options};
pub use datafusion::{
    prelude::{Expr, col, lit},
    scalar::ScalarValue,
};
pub use delete::DeleteSummary;
pub use error::{DatabaseError, DatabaseResult};
pub use operation::{TableBuilder, TableOperation, table};
pub use options::DatabaseOptions;
pub use query::{JoinKeys, JoinKind, QueryStage, SortKey, TableQuery};
pub use rowset::RowSet;
