//! Core engine for hivelake: table metadata and hive-partitioned Parquet storage.
//!
//! This crate owns everything that has real invariants in a hivelake
//! database directory:
//!
//! - A closed column type model and ordered table schemas (`schema` module).
//! - Partition key specs and the hive-style `key=value` path codec
//!   (`partition` module).
//! - The JSON metadata sidecar per table and the create/drop lifecycle
//!   (`metadata` module).
//! - Directory layout conventions and async filesystem helpers
//!   (`layout` and `storage` modules).
//! - Parquet encoding/decoding of row batches (`formats` module).
//! - Partition discovery, the insert path and the compactor
//!   (`scan`, `write` and `optimize` modules).
//!
//! Expression evaluation (filters, joins, sorts) is intentionally absent: the
//! `hivelake-datafusion` crate layers a query engine on top of these
//! primitives.
#![deny(missing_docs)]

pub mod error;
pub mod formats;
pub mod layout;
pub mod metadata;
pub mod optimize;
pub mod options;
pub mod partition;
pub mod scan;
pub mod schema;
pub mod storage;
pub mod write;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::{TableError, TableResult};
pub use metadata::{CreateOutcome, ExistencePolicy, MetadataStore, TableMetadata};
pub use optimize::OptimizeSummary;
pub use options::{Compression, WriteOptions};
pub use partition::{
    DecodedPartition, PartitionKeyError, PartitionKeySpec, PartitionPath, PartitionValue,
};
pub use scan::PartitionDir;
pub use schema::{Column, ColumnType, SchemaDefinitionError, SchemaValidationError, TableSchema};
pub use storage::{DatabaseLocation, StorageError};
pub use write::{InsertSummary, RewriteSummary};
