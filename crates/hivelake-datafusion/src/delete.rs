//! Predicate-driven row deletion.
//!
//! Partitions are pruned with the predicate first. A partition where the
//! predicate cannot hold is left alone without being read; a partition where
//! it holds for every row is emptied without evaluating it row by row; any
//! other partition is read and rewritten only if at least one row matches.
//!
//! Partitions are processed one at a time. A failure partway through leaves
//! finished partitions rewritten and the rest untouched; nothing is rolled
//! back.

use arrow::array::RecordBatch;
use datafusion::{execution::context::SessionContext, prelude::Expr};
use hivelake_core::{
    MetadataStore, WriteOptions,
    scan::{list_partitions, read_partition},
    write::rewrite_partition,
};
use log::{debug, info};
use snafu::prelude::*;

use crate::{
    error::{DatabaseResult, EngineSnafu, PredicateSnafu},
    planner::mem_frame,
    pruning::{IntervalTruth, prune_partitions},
};

/// What a delete did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Rows removed.
    pub rows_deleted: usize,
    /// Partitions whose files were replaced by a smaller set of rows.
    pub partitions_rewritten: usize,
    /// Partitions emptied and removed from disk.
    pub partitions_removed: usize,
}

impl DeleteSummary {
    /// True if any partition changed.
    pub fn modified(&self) -> bool {
        self.partitions_rewritten + self.partitions_removed > 0
    }
}

/// Delete every row of `table_name` for which `predicate` is true.
///
/// Rows where the predicate is false or null are kept. The predicate is
/// planned against the table schema before any partition is touched, so an
/// unknown column or a non-boolean predicate fails without side effects.
pub(crate) async fn delete(
    store: &MetadataStore,
    table_name: &str,
    predicate: &Expr,
    options: &WriteOptions,
) -> DatabaseResult<DeleteSummary> {
    let meta = store.load(table_name).await?;
    let location = store.location();
    let ctx = SessionContext::new();
    let arrow_schema = meta.schema().to_arrow_schema();

    mem_frame(&ctx, arrow_schema.clone(), Vec::new())?
        .filter(predicate.clone())
        .context(PredicateSnafu { table: table_name })?;

    let keep = predicate.clone().is_not_true();
    let dirs = list_partitions(location, &meta).await?;

    let mut summary = DeleteSummary::default();
    for (dir, truth) in prune_partitions(meta.schema(), dirs, &[predicate]) {
        let batches = read_partition(location, &meta, &dir).await?;
        let rows_before: usize = batches.iter().map(RecordBatch::num_rows).sum();
        if rows_before == 0 {
            continue;
        }

        let kept = if truth == IntervalTruth::AlwaysTrue {
            Vec::new()
        } else {
            mem_frame(&ctx, arrow_schema.clone(), batches)?
                .filter(keep.clone())
                .context(PredicateSnafu { table: table_name })?
                .collect()
                .await
                .context(EngineSnafu)?
        };
        let rows_after: usize = kept.iter().map(RecordBatch::num_rows).sum();
        if rows_after == rows_before {
            continue;
        }

        let rewrite = rewrite_partition(location, &meta, &dir, &kept, 1, options).await?;
        debug!(
            "deleted {} rows from partition {}",
            rows_before - rows_after,
            dir.partition.path
        );
        summary.rows_deleted += rows_before - rows_after;
        if rewrite.files_written.is_empty() {
            summary.partitions_removed += 1;
        } else {
            summary.partitions_rewritten += 1;
        }
    }

    if summary.modified() {
        store.touch(table_name).await?;
    }
    info!(
        "deleted {} rows from table {table_name} ({} partitions rewritten, {} removed)",
        summary.rows_deleted, summary.partitions_rewritten, summary.partitions_removed
    );
    Ok(summary)
}
