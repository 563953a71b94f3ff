//! Table metadata documents and the create/drop lifecycle.
//!
//! Each table has exactly one JSON document at `_metadata/<table>.json`:
//!
//! ```json
//! {
//!   "table_name": "stock_prices",
//!   "schema": {"date": "Date", "ticker": "String", "price": "Float64"},
//!   "partition_keys": ["date_year", "ticker"],
//!   "created_at": "2024-01-01T00:00:00Z",
//!   "last_modified": "2024-01-01T00:00:00Z"
//! }
//! ```
//!
//! The set of documents is the catalog. [`MetadataStore`] never caches a
//! document; every call reads the current file.

use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{
        CorruptMetadataSnafu, InconsistentMetadataSnafu, PartitionKeySnafu, SerializeMetadataSnafu,
        StorageSnafu, TableAlreadyExistsSnafu, TableError, TableNotFoundSnafu, TableResult,
    },
    layout,
    partition::{self, PartitionKeySpec},
    schema::TableSchema,
    storage::{self, DatabaseLocation, StorageError},
};

/// What `create` does when the table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistencePolicy {
    /// Fail with `TableError::TableAlreadyExists`.
    #[default]
    FailIfExists,
    /// Leave the existing table (schema and data) untouched.
    NoOpIfExists,
    /// Drop the existing table's data and metadata, then create afresh.
    ReplaceIfExists,
}

/// Result of a successful `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// No table existed; a new one was created.
    Created,
    /// A table existed and was left untouched (`NoOpIfExists`).
    AlreadyExisted,
    /// A table existed and was replaced (`ReplaceIfExists`).
    Replaced,
}

/// Persisted form: partition keys are stored by directory key name.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataDocument {
    table_name: String,
    schema: TableSchema,
    partition_keys: Vec<String>,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

/// Schema, partitioning and timestamps of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    table_name: String,
    schema: TableSchema,
    partition_keys: Vec<PartitionKeySpec>,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl TableMetadata {
    /// Name of the table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Table schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Partition key specs in nesting order.
    pub fn partition_keys(&self) -> &[PartitionKeySpec] {
        &self.partition_keys
    }

    /// Directory key names of the partition keys, in nesting order.
    pub fn partition_key_names(&self) -> Vec<String> {
        self.partition_keys
            .iter()
            .map(PartitionKeySpec::key_name)
            .collect()
    }

    /// When the table was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the table's data last changed.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn to_document(&self) -> MetadataDocument {
        MetadataDocument {
            table_name: self.table_name.clone(),
            schema: self.schema.clone(),
            partition_keys: self.partition_key_names(),
            created_at: self.created_at,
            last_modified: self.last_modified,
        }
    }

    fn from_document(expected_name: &str, doc: MetadataDocument) -> TableResult<Self> {
        ensure!(
            doc.table_name == expected_name,
            InconsistentMetadataSnafu {
                table_name: expected_name,
                reason: format!("document names table {:?}", doc.table_name),
            }
        );

        let mut partition_keys = Vec::with_capacity(doc.partition_keys.len());
        for key in &doc.partition_keys {
            let spec = PartitionKeySpec::resolve(key, &doc.schema).map_err(|e| {
                TableError::InconsistentMetadata {
                    table_name: expected_name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            partition_keys.push(spec);
        }

        Ok(Self {
            table_name: doc.table_name,
            schema: doc.schema,
            partition_keys,
            created_at: doc.created_at,
            last_modified: doc.last_modified,
        })
    }
}

impl fmt::Display for TableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.table_name)?;
        for (i, c) in self.schema.columns().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", c.name, c.column_type)?;
        }
        f.write_str(")")?;
        if !self.partition_keys.is_empty() {
            write!(f, " partitioned by [{}]", self.partition_key_names().join(", "))?;
        }
        Ok(())
    }
}

/// Reads and writes table metadata documents under a database root.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    location: DatabaseLocation,
}

impl MetadataStore {
    /// Create a store rooted at a database location.
    pub fn new(location: DatabaseLocation) -> Self {
        Self { location }
    }

    /// The database location this store reads from.
    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    async fn write_document(&self, meta: &TableMetadata) -> TableResult<()> {
        let rel = layout::metadata_rel_path(&meta.table_name)?;
        let json = serde_json::to_vec_pretty(&meta.to_document()).context(
            SerializeMetadataSnafu {
                table_name: meta.table_name.clone(),
            },
        )?;
        storage::write_atomic(&self.location, &rel, &json)
            .await
            .context(StorageSnafu)
    }

    /// True if a metadata document exists for `table_name`.
    pub async fn exists(&self, table_name: &str) -> TableResult<bool> {
        let rel = layout::metadata_rel_path(table_name)?;
        storage::exists(&self.location, &rel)
            .await
            .context(StorageSnafu)
    }

    /// Create a table, applying `policy` if it already exists.
    ///
    /// On success the metadata document is written with
    /// `created_at == last_modified == now` and an empty data directory is
    /// created. Partition specs are validated against the schema first; an
    /// invalid spec leaves any existing table untouched.
    pub async fn create(
        &self,
        table_name: &str,
        schema: TableSchema,
        partition_keys: Vec<PartitionKeySpec>,
        policy: ExistencePolicy,
    ) -> TableResult<CreateOutcome> {
        layout::validate_table_name(table_name)?;
        partition::validate_specs(&partition_keys, &schema)
            .context(PartitionKeySnafu { table_name })?;

        let mut outcome = CreateOutcome::Created;
        if self.exists(table_name).await? {
            match policy {
                ExistencePolicy::FailIfExists => {
                    return TableAlreadyExistsSnafu { table_name }.fail();
                }
                ExistencePolicy::NoOpIfExists => {
                    let existing = self.load(table_name).await?;
                    if !existing.schema.is_compatible_with(&schema)
                        || existing.partition_keys != partition_keys
                    {
                        warn!(
                            "create({table_name}) with NoOpIfExists: existing table differs from requested definition; keeping existing"
                        );
                    }
                    return Ok(CreateOutcome::AlreadyExisted);
                }
                ExistencePolicy::ReplaceIfExists => {
                    self.drop(table_name).await?;
                    outcome = CreateOutcome::Replaced;
                }
            }
        }

        let data_dir = layout::table_rel_dir(table_name)?;
        storage::create_dir_all(&self.location, &data_dir)
            .await
            .context(StorageSnafu)?;

        let now = Utc::now();
        let meta = TableMetadata {
            table_name: table_name.to_string(),
            schema,
            partition_keys,
            created_at: now,
            last_modified: now,
        };
        self.write_document(&meta).await?;

        match outcome {
            CreateOutcome::Replaced => info!("replaced table {meta}"),
            _ => info!("created table {meta}"),
        }
        Ok(outcome)
    }

    /// Load a table's metadata.
    ///
    /// Fails with `TableError::TableNotFound` if no document exists.
    pub async fn load(&self, table_name: &str) -> TableResult<TableMetadata> {
        let rel = layout::metadata_rel_path(table_name)?;
        let json = match storage::read_to_string(&self.location, &rel).await {
            Ok(s) => s,
            Err(StorageError::NotFound { .. }) => {
                return TableNotFoundSnafu { table_name }.fail();
            }
            Err(source) => return Err(TableError::Storage { source }),
        };

        let doc: MetadataDocument =
            serde_json::from_str(&json).context(CorruptMetadataSnafu { table_name })?;
        TableMetadata::from_document(table_name, doc)
    }

    /// Set `last_modified` to the current time.
    pub async fn touch(&self, table_name: &str) -> TableResult<TableMetadata> {
        let mut meta = self.load(table_name).await?;
        meta.last_modified = Utc::now().max(meta.last_modified);
        self.write_document(&meta).await?;
        debug!("touched table {table_name} at {}", meta.last_modified);
        Ok(meta)
    }

    /// Remove a table's data directory and metadata document.
    ///
    /// Fails with `TableError::TableNotFound` if no document exists. Files or
    /// directories already removed by someone else are not an error.
    pub async fn drop(&self, table_name: &str) -> TableResult<()> {
        ensure!(
            self.exists(table_name).await?,
            TableNotFoundSnafu { table_name }
        );

        let data_dir = layout::table_rel_dir(table_name)?;
        storage::remove_dir_all_tolerant(&self.location, &data_dir)
            .await
            .context(StorageSnafu)?;

        let rel = layout::metadata_rel_path(table_name)?;
        storage::remove_file_if_exists(&self.location, &rel)
            .await
            .context(StorageSnafu)?;

        info!("dropped table {table_name}");
        Ok(())
    }

    /// Names of all tables with a metadata document, sorted.
    pub async fn list(&self) -> TableResult<Vec<String>> {
        let dir = PathBuf::from(layout::METADATA_DIR);
        let entries = match storage::list_dir(&self.location, &dir).await {
            Ok(entries) => entries,
            Err(StorageError::NotFound { .. }) => return Ok(Vec::new()),
            Err(source) => return Err(TableError::Storage { source }),
        };

        Ok(entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| layout::table_name_from_metadata_file(&e.name))
            .map(str::to_string)
            .collect())
    }
}
