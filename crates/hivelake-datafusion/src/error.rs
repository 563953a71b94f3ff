//! Errors surfaced by the database handle.

use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use hivelake_core::{StorageError, TableError};
use snafu::prelude::*;

/// Errors from `Database` commands and queries.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatabaseError {
    /// Metadata, schema, partitioning or storage failure in the core engine.
    #[snafu(display("{source}"))]
    Table {
        /// Underlying table error.
        source: TableError,
    },

    /// A caller-supplied predicate is malformed, references unknown columns
    /// or is not boolean.
    #[snafu(display("Invalid predicate for table {table}: {source}"))]
    Predicate {
        /// Table the predicate was applied to.
        table: String,
        /// Planning error reported by the engine.
        source: DataFusionError,
    },

    /// A join stage cannot be planned as described.
    #[snafu(display("Invalid join on table {table}: {reason}"))]
    InvalidJoin {
        /// Left-hand table of the join.
        table: String,
        /// What is wrong with the join.
        reason: String,
    },

    /// Failure while planning or executing a query in the engine.
    #[snafu(display("Query engine error: {source}"))]
    Engine {
        /// Underlying engine error.
        source: DataFusionError,
    },

    /// Arrow error while assembling results.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

impl From<TableError> for DatabaseError {
    fn from(source: TableError) -> Self {
        DatabaseError::Table { source }
    }
}

impl From<StorageError> for DatabaseError {
    fn from(source: StorageError) -> Self {
        DatabaseError::Table {
            source: TableError::Storage { source },
        }
    }
}

impl DatabaseError {
    /// The core table error, if this is one.
    pub fn as_table_error(&self) -> Option<&TableError> {
        match self {
            DatabaseError::Table { source } => Some(source),
            _ => None,
        }
    }
}

/// Result alias for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
