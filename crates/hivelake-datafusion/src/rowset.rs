//! Materialized query results.

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    datatypes::SchemaRef,
    error::ArrowError,
};

/// Rows returned by `Database::query`.
#[derive(Debug, Clone)]
pub struct RowSet {
    /// Output schema, in output column order.
    pub schema: SchemaRef,
    /// Result batches. May be empty.
    pub batches: Vec<RecordBatch>,
}

impl RowSet {
    /// Total rows across all batches.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// True if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Output column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    /// All rows as one batch.
    pub fn concat(&self) -> Result<RecordBatch, ArrowError> {
        concat_batches(&self.schema, &self.batches)
    }
}
