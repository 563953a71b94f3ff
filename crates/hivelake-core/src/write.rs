//! Insert path and partition rewrites.
//!
//! Inserts are additive at the file level: every insert writes one new file
//! per touched partition and never edits or replaces an existing file.
//! Rewrites (used by delete and optimize) write the replacement files first
//! and only then remove the old ones, so a partition is never left without
//! its rows.

use std::{collections::BTreeMap, path::{Path, PathBuf}};

use arrow::{
    array::{RecordBatch, UInt64Array},
    compute::{concat_batches, take_record_batch},
};
use log::debug;
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, PartitionKeySnafu, SchemaValidationSnafu, StorageSnafu, TableResult},
    formats::parquet::encode_batches,
    layout,
    metadata::{MetadataStore, TableMetadata},
    options::WriteOptions,
    partition::{self, PartitionPath},
    scan::PartitionDir,
    storage::{self, DatabaseLocation},
};

/// Files and rows written by an insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertSummary {
    /// Rows written.
    pub rows: usize,
    /// New data files, relative to the database root.
    pub files: Vec<PathBuf>,
}

/// Result of rewriting one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Replacement files written.
    pub files_written: Vec<PathBuf>,
    /// Old files removed.
    pub files_removed: usize,
    /// True if the partition ended up empty and its directory was removed.
    pub dir_removed: bool,
}

/// Write `batches` into a new data file inside `rel_dir`.
///
/// Returns the new file's path relative to the database root.
pub async fn write_data_file(
    location: &DatabaseLocation,
    meta: &TableMetadata,
    rel_dir: &Path,
    batches: &[RecordBatch],
    options: &WriteOptions,
) -> TableResult<PathBuf> {
    let rel_path = rel_dir.join(layout::new_data_file_name());
    let bytes = encode_batches(meta.schema(), batches, options, &rel_path)?;
    storage::write_new_visible(location, &rel_path, &bytes)
        .await
        .context(StorageSnafu)?;

    debug!(
        "wrote {} rows to {}",
        batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        rel_path.display()
    );
    Ok(rel_path)
}

/// Validate, partition and conform `batches` without touching storage.
fn partition_batches(
    meta: &TableMetadata,
    batches: &[RecordBatch],
) -> TableResult<BTreeMap<PartitionPath, Vec<RecordBatch>>> {
    let table_name = meta.table_name();
    let schema = meta.schema();

    let mut out: BTreeMap<PartitionPath, Vec<RecordBatch>> = BTreeMap::new();
    for batch in batches {
        schema
            .validate_arrow_schema(&batch.schema())
            .context(SchemaValidationSnafu { table_name })?;
        let batch = schema.conform_batch(batch).context(ArrowSnafu)?;

        let groups = partition::group_rows(schema, meta.partition_keys(), &batch)
            .context(PartitionKeySnafu { table_name })?;
        for (path, rows) in groups {
            let part = if rows.len() == batch.num_rows() {
                batch.clone()
            } else {
                take_record_batch(&batch, &UInt64Array::from(rows)).context(ArrowSnafu)?
            };
            out.entry(path).or_default().push(part);
        }
    }
    Ok(out)
}

/// Insert rows into a table.
///
/// Every batch is validated against the schema and every row's partition is
/// computed before anything is written, so a schema or partition key error
/// leaves the table untouched. Columns may arrive in any order.
pub async fn insert(
    store: &MetadataStore,
    table_name: &str,
    batches: &[RecordBatch],
    options: &WriteOptions,
) -> TableResult<InsertSummary> {
    let meta = store.load(table_name).await?;
    let location = store.location();
    let table_dir = layout::table_rel_dir(table_name)?;

    let partitions = partition_batches(&meta, batches)?;

    let mut summary = InsertSummary::default();
    for (path, parts) in partitions {
        let rel_dir = table_dir.join(path.to_rel_path());
        let file = write_data_file(location, &meta, &rel_dir, &parts, options).await?;
        summary.rows += parts.iter().map(RecordBatch::num_rows).sum::<usize>();
        summary.files.push(file);
    }

    store.touch(table_name).await?;
    Ok(summary)
}

/// Replace the contents of a partition with `batches`.
///
/// The rows are split into `file_count` files of near-equal size (at least
/// one file when there are rows). New files are fully written before any old
/// file is removed. If `batches` holds no rows the old files are removed and
/// the directory, plus any parents left empty, is deleted up to the table
/// directory.
pub async fn rewrite_partition(
    location: &DatabaseLocation,
    meta: &TableMetadata,
    dir: &PartitionDir,
    batches: &[RecordBatch],
    file_count: usize,
    options: &WriteOptions,
) -> TableResult<RewriteSummary> {
    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    let mut summary = RewriteSummary::default();

    if rows > 0 {
        let all = concat_batches(&meta.schema().to_arrow_schema(), batches).context(ArrowSnafu)?;
        let file_count = file_count.clamp(1, rows);
        let per_file = rows.div_ceil(file_count);

        let mut offset = 0;
        while offset < rows {
            let len = per_file.min(rows - offset);
            let chunk = all.slice(offset, len);
            let file = write_data_file(location, meta, &dir.rel_dir, &[chunk], options).await?;
            summary.files_written.push(file);
            offset += len;
        }
    }

    for old in &dir.files {
        if storage::remove_file_if_exists(location, old)
            .await
            .context(StorageSnafu)?
        {
            summary.files_removed += 1;
            debug!("removed {}", old.display());
        }
    }

    if rows == 0 {
        let table_dir = layout::table_rel_dir(meta.table_name())?;
        let removed = storage::remove_empty_dirs(location, &dir.rel_dir, &table_dir)
            .await
            .context(StorageSnafu)?;
        summary.dir_removed = removed > 0;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TableError,
        metadata::ExistencePolicy,
        scan::{list_partitions, read_partition, read_table},
        schema::SchemaValidationError,
        test_util::{date, price_rows, prices_batch, prices_batch_nullable, prices_schema, prices_specs},
    };
    use arrow::{
        array::{Float64Array, Int64Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn setup(tmp: &TempDir) -> Result<MetadataStore, TableError> {
        let store = MetadataStore::new(DatabaseLocation::local(tmp.path()));
        store
            .create("prices", prices_schema(), prices_specs(), ExistencePolicy::FailIfExists)
            .await?;
        Ok(store)
    }

    fn count_files(root: &Path) -> usize {
        let mut n = 0;
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let entry = entry.unwrap();
                if entry.file_type().unwrap().is_dir() {
                    stack.push(entry.path());
                } else {
                    n += 1;
                }
            }
        }
        n
    }

    #[tokio::test]
    async fn insert_writes_one_file_per_partition() -> TestResult {
        let tmp = TempDir::new()?;
        let store = setup(&tmp).await?;

        let batch = prices_batch(&[
            (date(2024, 1, 1), "AAPL", 150.0),
            (date(2024, 1, 2), "AAPL", 151.0),
            (date(2023, 1, 2), "MSFT", 250.0),
        ]);
        let summary = insert(&store, "prices", &[batch], &WriteOptions::default()).await?;
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.files.len(), 2);
        assert!(summary.files[0].starts_with("prices/date_year=2023/ticker=MSFT"));
        assert!(summary.files[1].starts_with("prices/date_year=2024/ticker=AAPL"));

        let meta = store.load("prices").await?;
        let rows = price_rows(&read_table(store.location(), &meta).await?);
        assert_eq!(
            rows,
            vec![
                (date(2023, 1, 2), "MSFT".to_string(), 250.0),
                (date(2024, 1, 1), "AAPL".to_string(), 150.0),
                (date(2024, 1, 2), "AAPL".to_string(), 151.0),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_inserts_add_files() -> TestResult {
        let tmp = TempDir::new()?;
        let store = setup(&tmp).await?;
        let batch = prices_batch(&[(date(2024, 1, 1), "AAPL", 150.0)]);

        insert(&store, "prices", &[batch.clone()], &WriteOptions::default()).await?;
        insert(&store, "prices", &[batch], &WriteOptions::default()).await?;

        let meta = store.load("prices").await?;
        let dirs = list_partitions(store.location(), &meta).await?;
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].files.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn schema_mismatch_writes_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let store = setup(&tmp).await?;
        let good = prices_batch(&[(date(2024, 1, 1), "AAPL", 150.0)]);

        let missing = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("ticker", DataType::Utf8, true),
                Field::new("price", DataType::Float64, true),
            ])),
            vec![
                Arc::new(StringArray::from(vec!["AAPL"])),
                Arc::new(Float64Array::from(vec![1.0])),
            ],
        )?;
        let err = insert(&store, "prices", &[good.clone(), missing], &WriteOptions::default())
            .await
            .unwrap_err();
        match err {
            TableError::SchemaValidation { source, .. } => {
                assert!(matches!(source, SchemaValidationError::MissingColumn { ref column } if column == "date"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let mistyped = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("date", DataType::Date32, true),
                Field::new("ticker", DataType::Utf8, true),
                Field::new("price", DataType::Int64, true),
            ])),
            vec![
                Arc::new(arrow::array::Date32Array::from(vec![19723])),
                Arc::new(StringArray::from(vec!["AAPL"])),
                Arc::new(Int64Array::from(vec![1])),
            ],
        )?;
        let err = insert(&store, "prices", &[mistyped], &WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TableError::SchemaValidation {
                source: SchemaValidationError::TypeMismatch { .. },
                ..
            }
        ));

        assert_eq!(count_files(&tmp.path().join("prices")), 0);
        Ok(())
    }

    #[tokio::test]
    async fn null_partition_value_writes_nothing() -> TestResult {
        let tmp = TempDir::new()?;
        let store = setup(&tmp).await?;
        let batch = prices_batch_nullable(&[
            (Some(date(2024, 1, 1)), Some("AAPL"), Some(1.0)),
            (Some(date(2024, 1, 1)), None, Some(2.0)),
        ]);

        let err = insert(&store, "prices", &[batch], &WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::PartitionKey { .. }));
        assert_eq!(count_files(&tmp.path().join("prices")), 0);
        Ok(())
    }

    #[tokio::test]
    async fn rewrite_to_empty_removes_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let store = setup(&tmp).await?;
        let batch = prices_batch(&[
            (date(2024, 1, 1), "AAPL", 150.0),
            (date(2024, 1, 1), "MSFT", 300.0),
        ]);
        insert(&store, "prices", &[batch], &WriteOptions::default()).await?;

        let meta = store.load("prices").await?;
        let dirs = list_partitions(store.location(), &meta).await?;
        let aapl = &dirs[0];

        let summary =
            rewrite_partition(store.location(), &meta, aapl, &[], 1, &WriteOptions::default())
                .await?;
        assert!(summary.dir_removed);
        assert_eq!(summary.files_removed, 1);
        assert!(!tmp.path().join("prices/date_year=2024/ticker=AAPL").exists());
        assert!(tmp.path().join("prices/date_year=2024/ticker=MSFT").exists());
        Ok(())
    }

    #[tokio::test]
    async fn rewrite_splits_rows_across_files() -> TestResult {
        let tmp = TempDir::new()?;
        let store = setup(&tmp).await?;
        let rows: Vec<_> = (1..=5).map(|d| (date(2024, 1, d), "AAPL", d as f64)).collect();
        insert(&store, "prices", &[prices_batch(&rows)], &WriteOptions::default()).await?;

        let meta = store.load("prices").await?;
        let dir = list_partitions(store.location(), &meta).await?.remove(0);
        let batches = read_partition(store.location(), &meta, &dir).await?;

        let summary =
            rewrite_partition(store.location(), &meta, &dir, &batches, 2, &WriteOptions::default())
                .await?;
        assert_eq!(summary.files_written.len(), 2);

        let dir = list_partitions(store.location(), &meta).await?.remove(0);
        assert_eq!(dir.files.len(), 2);
        let back = price_rows(&read_partition(store.location(), &meta, &dir).await?);
        assert_eq!(back.len(), 5);
        Ok(())
    }
}
