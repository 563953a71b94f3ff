//! Error types and SNAFU context selectors for table operations.
//!
//! `TableError` is the single error surfaced by the core crate's public API.
//! Context selectors are `pub(crate)` so sibling modules can attach context
//! without re-exporting them at the crate root.

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use crate::{
    partition::PartitionKeyError,
    schema::{SchemaDefinitionError, SchemaValidationError},
    storage::StorageError,
};

/// Errors from table lifecycle, insert, scan and optimize operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// No metadata document exists for the table.
    #[snafu(display("Table not found: {table_name}"))]
    TableNotFound {
        /// Name of the missing table.
        table_name: String,
    },

    /// Create with `FailIfExists` on a table that already has metadata.
    #[snafu(display("Table already exists: {table_name}"))]
    TableAlreadyExists {
        /// Name of the existing table.
        table_name: String,
    },

    /// Inserted rows do not match the table schema.
    #[snafu(display("Schema validation failed for table {table_name}: {source}"))]
    SchemaValidation {
        /// Table the rows were inserted into.
        table_name: String,
        /// Which column is missing, extra or mistyped.
        source: SchemaValidationError,
    },

    /// A schema definition was rejected (empty, duplicate column, unknown type).
    #[snafu(display("Invalid schema: {source}"))]
    InvalidSchema {
        /// Underlying definition error.
        source: SchemaDefinitionError,
    },

    /// A partition key could not be resolved or evaluated.
    #[snafu(display("Partition key error for table {table_name}: {source}"))]
    PartitionKey {
        /// Table whose partition keys failed.
        table_name: String,
        /// Underlying partition key error.
        source: PartitionKeyError,
    },

    /// The table name is not usable as a file and directory name.
    #[snafu(display(
        "Invalid table name {table_name:?}: expected 1-128 ASCII letters, digits, '.', '_' or '-', not starting with '.' or '_'"
    ))]
    InvalidTableName {
        /// The rejected name.
        table_name: String,
    },

    /// A metadata document could not be parsed.
    #[snafu(display("Corrupt metadata for table {table_name}: {source}"))]
    CorruptMetadata {
        /// Table whose document failed to parse.
        table_name: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A metadata document parsed but is internally inconsistent.
    #[snafu(display("Inconsistent metadata for table {table_name}: {reason}"))]
    InconsistentMetadata {
        /// Table whose document is inconsistent.
        table_name: String,
        /// Human-readable description of the inconsistency.
        reason: String,
    },

    /// A metadata document could not be serialized.
    #[snafu(display("Failed to serialize metadata for table {table_name}: {source}"))]
    SerializeMetadata {
        /// Table being written.
        table_name: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Storage error while accessing metadata or data files.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// Parquet encode or decode error.
    #[snafu(display("Parquet error for {path}: {source}"))]
    Parquet {
        /// File being read or written.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Arrow compute or conversion error.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;
