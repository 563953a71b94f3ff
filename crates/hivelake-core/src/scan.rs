//! Partition discovery and reading of partition contents.
//!
//! The partition tree of a table is walked level by level. Only directories at
//! exactly the depth of the table's partition keys can hold data; at that depth
//! each directory is decoded against the current specs and its visible
//! `*.parquet` files are collected. Anything that does not decode is skipped
//! with a warning.

use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use log::{debug, warn};

use crate::{
    error::{TableError, TableResult},
    formats::parquet::decode_batches,
    layout,
    metadata::TableMetadata,
    partition::{self, DecodedPartition},
    storage::{self, DatabaseLocation, StorageError},
};

/// One partition directory with its data files.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDir {
    /// Decoded partition key values.
    pub partition: DecodedPartition,
    /// Directory relative to the database root.
    pub rel_dir: PathBuf,
    /// Data files relative to the database root, sorted by name.
    pub files: Vec<PathBuf>,
}

async fn list_or_empty(
    location: &DatabaseLocation,
    rel: &Path,
) -> TableResult<Vec<storage::DirEntry>> {
    match storage::list_dir(location, rel).await {
        Ok(entries) => Ok(entries),
        // Removed concurrently, or a table created before its directory.
        Err(StorageError::NotFound { .. }) => Ok(Vec::new()),
        Err(source) => Err(TableError::Storage { source }),
    }
}

/// List every partition directory of a table that holds at least one data file.
///
/// Partitions come back ordered by directory path.
pub async fn list_partitions(
    location: &DatabaseLocation,
    meta: &TableMetadata,
) -> TableResult<Vec<PartitionDir>> {
    let table_dir = layout::table_rel_dir(meta.table_name())?;
    let depth = meta.partition_keys().len();

    // Directories relative to the table root, one level at a time.
    let mut level: Vec<PathBuf> = vec![PathBuf::new()];
    for _ in 0..depth {
        let mut next = Vec::new();
        for rel in &level {
            for entry in list_or_empty(location, &table_dir.join(rel)).await? {
                if entry.is_dir {
                    next.push(rel.join(&entry.name));
                }
            }
        }
        level = next;
    }

    let mut out = Vec::with_capacity(level.len());
    for rel in level {
        let Some(partition) = partition::decode(meta.schema(), meta.partition_keys(), &rel) else {
            warn!(
                "skipping directory {} of table {}: does not match partition keys [{}]",
                rel.display(),
                meta.table_name(),
                meta.partition_key_names().join(", ")
            );
            continue;
        };

        let rel_dir = table_dir.join(&rel);
        let files: Vec<PathBuf> = list_or_empty(location, &rel_dir)
            .await?
            .into_iter()
            .filter(|e| !e.is_dir && layout::is_data_file_name(&e.name))
            .map(|e| rel_dir.join(e.name))
            .collect();

        if files.is_empty() {
            continue;
        }
        out.push(PartitionDir {
            partition,
            rel_dir,
            files,
        });
    }

    Ok(out)
}

/// Read every row of a partition.
///
/// A file that disappears between listing and reading (a concurrent rewrite)
/// is skipped.
pub async fn read_partition(
    location: &DatabaseLocation,
    meta: &TableMetadata,
    dir: &PartitionDir,
) -> TableResult<Vec<RecordBatch>> {
    let mut out = Vec::new();
    for file in &dir.files {
        let data = match storage::read_all_bytes(location, file).await {
            Ok(data) => data,
            Err(StorageError::NotFound { .. }) => {
                debug!("data file {} vanished before read", file.display());
                continue;
            }
            Err(source) => return Err(TableError::Storage { source }),
        };
        out.extend(decode_batches(meta.table_name(), meta.schema(), data, file)?);
    }
    Ok(out)
}

/// Read every row of a table, across all partitions.
pub async fn read_table(
    location: &DatabaseLocation,
    meta: &TableMetadata,
) -> TableResult<Vec<RecordBatch>> {
    let mut out = Vec::new();
    for dir in list_partitions(location, meta).await? {
        out.extend(read_partition(location, meta, &dir).await?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{ExistencePolicy, MetadataStore},
        options::WriteOptions,
        test_util::{date, price_rows, prices_batch, prices_schema, prices_specs},
        write,
    };
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn lists_only_matching_partitions_with_visible_files() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DatabaseLocation::local(tmp.path());
        let store = MetadataStore::new(location.clone());
        store
            .create("prices", prices_schema(), prices_specs(), ExistencePolicy::FailIfExists)
            .await?;

        let batch = prices_batch(&[
            (date(2024, 1, 1), "AAPL", 150.0),
            (date(2024, 1, 2), "MSFT", 300.0),
        ]);
        write::insert(&store, "prices", &[batch], &WriteOptions::default()).await?;

        // Stray content that must be ignored.
        std::fs::create_dir_all(tmp.path().join("prices/not_a_partition/x=1"))?;
        std::fs::create_dir_all(tmp.path().join("prices/date_year=2024/ticker=EMPTY"))?;
        std::fs::write(
            tmp.path().join("prices/date_year=2024/ticker=AAPL/.part-x.parquet.tmp"),
            b"partial",
        )?;

        let meta = store.load("prices").await?;
        let dirs = list_partitions(&location, &meta).await?;
        let names: Vec<String> = dirs.iter().map(|d| d.partition.path.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "date_year=2024/ticker=AAPL".to_string(),
                "date_year=2024/ticker=MSFT".to_string()
            ]
        );
        assert!(dirs.iter().all(|d| d.files.len() == 1));

        let rows = price_rows(&read_table(&location, &meta).await?);
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_table_directory_reads_as_empty() -> TestResult {
        let tmp = TempDir::new()?;
        let location = DatabaseLocation::local(tmp.path());
        let store = MetadataStore::new(location.clone());
        store
            .create("prices", prices_schema(), prices_specs(), ExistencePolicy::FailIfExists)
            .await?;
        std::fs::remove_dir_all(tmp.path().join("prices"))?;

        let meta = store.load("prices").await?;
        assert!(list_partitions(&location, &meta).await?.is_empty());
        Ok(())
    }
}
