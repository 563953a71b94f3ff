//! Wrapper prelude.
//!
//! Downstream code should prefer importing from this prelude instead of
//! depending on the inner crates' module paths.

pub use arrow::array::RecordBatch;

pub use crate::{
    ColumnType, Database, DatabaseError, DatabaseOptions, ExistencePolicy, JoinKeys, JoinKind,
    PartitionKeySpec, RowSet, SortKey, TableError, TableSchema, col, connect,
    connect_with_options, lit, table,
};
