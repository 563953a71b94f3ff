//! Options that shape how data files are written.

use parquet::file::properties::WriterProperties;

pub use parquet::basic::Compression;

/// Default row-count target per data file produced by the optimizer.
pub const DEFAULT_MAX_ROWS_PER_FILE: usize = 1_000_000;

/// Parquet writing and compaction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Upper bound on rows per file written by the optimizer.
    ///
    /// A partition of `n` rows is compacted into
    /// `max(1, ceil(n / max_rows_per_file))` files.
    pub max_rows_per_file: usize,
    /// Parquet compression codec for every file written.
    pub compression: Compression,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            max_rows_per_file: DEFAULT_MAX_ROWS_PER_FILE,
            compression: Compression::SNAPPY,
        }
    }
}

impl WriteOptions {
    /// Set the optimizer's rows-per-file target. Zero is treated as one.
    pub fn with_max_rows_per_file(mut self, max_rows_per_file: usize) -> Self {
        self.max_rows_per_file = max_rows_per_file.max(1);
        self
    }

    /// Set the Parquet compression codec.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Number of files a partition of `rows` rows is compacted into.
    pub fn target_file_count(&self, rows: usize) -> usize {
        rows.div_ceil(self.max_rows_per_file.max(1)).max(1)
    }

    pub(crate) fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .build()
    }
}
