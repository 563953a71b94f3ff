//! Per-partition compaction: de-duplication and small-file merging.
//!
//! Every partition of the table is visited. Its rows are read, exact
//! duplicates (equal in every column) are dropped, and the rest is rewritten
//! into `WriteOptions::target_file_count` files, or the current file count if
//! that is smaller. Replacement files are written
//! before the old ones are removed; a crash in between leaves the old and new
//! files side by side, which reads as duplicated rows until the next
//! successful optimize.

use std::collections::HashSet;

use arrow::{
    array::{RecordBatch, UInt64Array},
    compute::{concat_batches, take_record_batch},
    row::{RowConverter, SortField},
};
use log::{debug, info};
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, TableResult},
    metadata::MetadataStore,
    options::WriteOptions,
    scan::{list_partitions, read_partition},
    write::rewrite_partition,
};

/// What an optimize run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeSummary {
    /// Partitions visited.
    pub partitions: usize,
    /// Partitions whose files were rewritten.
    pub partitions_rewritten: usize,
    /// Data files before the run.
    pub files_before: usize,
    /// Data files after the run.
    pub files_after: usize,
    /// Rows before de-duplication.
    pub rows_before: usize,
    /// Rows after de-duplication.
    pub rows_after: usize,
}

/// Keep the first occurrence of every distinct row.
///
/// Returns the batch unchanged when it has no duplicates.
pub fn dedup_rows(batch: &RecordBatch) -> TableResult<RecordBatch> {
    let fields: Vec<SortField> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(fields).context(ArrowSnafu)?;
    let rows = converter
        .convert_columns(batch.columns())
        .context(ArrowSnafu)?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let mut keep = Vec::with_capacity(rows.num_rows());
    for (i, row) in rows.iter().enumerate() {
        if seen.insert(row) {
            keep.push(i as u64);
        }
    }

    if keep.len() == batch.num_rows() {
        return Ok(batch.clone());
    }
    take_record_batch(batch, &UInt64Array::from(keep)).context(ArrowSnafu)
}

/// Compact every partition of `table_name`.
///
/// A partition is rewritten if it holds duplicate rows or more files than
/// its target file count; otherwise it is left alone. `touch` is called once
/// all partitions are done.
pub async fn optimize(
    store: &MetadataStore,
    table_name: &str,
    options: &WriteOptions,
) -> TableResult<OptimizeSummary> {
    let meta = store.load(table_name).await?;
    let location = store.location();
    let arrow_schema = meta.schema().to_arrow_schema();

    let mut summary = OptimizeSummary::default();
    for dir in list_partitions(location, &meta).await? {
        summary.partitions += 1;
        summary.files_before += dir.files.len();

        let batches = read_partition(location, &meta, &dir).await?;
        let all = concat_batches(&arrow_schema, &batches).context(ArrowSnafu)?;
        let deduped = dedup_rows(&all)?;

        let rows_before = all.num_rows();
        let rows_after = deduped.num_rows();
        summary.rows_before += rows_before;
        summary.rows_after += rows_after;

        // Never more files than the partition already has.
        let target = options
            .target_file_count(rows_after)
            .min(dir.files.len().max(1));
        if rows_after == rows_before && dir.files.len() <= target {
            debug!("partition {} already compact", dir.partition.path);
            summary.files_after += dir.files.len();
            continue;
        }

        let rewrite =
            rewrite_partition(location, &meta, &dir, &[deduped], target, options).await?;
        debug!(
            "compacted partition {}: {} files -> {}, {} rows -> {}",
            dir.partition.path,
            dir.files.len(),
            rewrite.files_written.len(),
            rows_before,
            rows_after
        );
        summary.partitions_rewritten += 1;
        summary.files_after += rewrite.files_written.len();
    }

    store.touch(table_name).await?;
    info!(
        "optimized table {table_name}: {} of {} partitions rewritten, files {} -> {}, rows {} -> {}",
        summary.partitions_rewritten,
        summary.partitions,
        summary.files_before,
        summary.files_after,
        summary.rows_before,
        summary.rows_after
    );
    Ok(summary)
}
