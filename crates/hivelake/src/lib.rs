//! # hivelake
//!
//! Database-like primitives (create, insert, query, delete, drop, optimize)
//! over a directory of hive-partitioned Parquet files, with one JSON metadata
//! document per table.
//!
//! This crate is the supported public entry point and re-exports a small,
//! stable surface from `hivelake-core` and `hivelake-datafusion`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hivelake::prelude::*;
//!
//! # async fn run(batches: Vec<RecordBatch>) -> Result<(), DatabaseError> {
//! let db = connect("/tmp/prices-db").await?;
//! let schema = TableSchema::new([
//!     ("date", ColumnType::Date),
//!     ("ticker", ColumnType::String),
//!     ("price", ColumnType::Float64),
//! ])
//! .expect("valid schema");
//!
//! db.command(table("stock_prices").create(
//!     schema,
//!     vec![PartitionKeySpec::year("date"), PartitionKeySpec::column("ticker")],
//! ))
//! .await?;
//! db.insert("stock_prices", &batches).await?;
//!
//! let aapl = db
//!     .query(table("stock_prices").filter(col("ticker").eq(lit("AAPL"))))
//!     .await?;
//! println!("{} rows", aapl.num_rows());
//! # Ok(())
//! # }
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Storage-engine types that most callers do not need directly.
pub mod engine {
    pub use hivelake_core::{
        CreateOutcome, DecodedPartition, InsertSummary, MetadataStore, OptimizeSummary,
        PartitionPath, PartitionValue, StorageError, TableMetadata, WriteOptions,
    };
}

pub use hivelake_core::{
    Column, ColumnType, Compression, ExistencePolicy, PartitionKeyError, PartitionKeySpec,
    SchemaDefinitionError, SchemaValidationError, TableError, TableSchema,
};
pub use hivelake_datafusion::{
    Database, DatabaseError, DatabaseOptions, DatabaseResult, DeleteSummary, Expr, JoinKeys,
    JoinKind, RowSet, ScalarValue, SortKey, TableBuilder, TableOperation, TableQuery, col,
    connect, connect_with_options, lit, table,
};
