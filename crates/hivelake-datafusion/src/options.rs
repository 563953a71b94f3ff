//! Database-level configuration.

use hivelake_core::{Compression, WriteOptions};

/// Options for a [`Database`](crate::Database) handle.
///
/// There is no config file or environment layer; callers build this in code
/// and pass it to [`connect_with_options`](crate::connect_with_options).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseOptions {
    write: WriteOptions,
}

impl DatabaseOptions {
    /// Row-count target per file produced by `optimize`. Zero is treated as one.
    pub fn with_max_rows_per_file(mut self, max_rows_per_file: usize) -> Self {
        self.write = self.write.with_max_rows_per_file(max_rows_per_file);
        self
    }

    /// Parquet compression codec for every file written.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.write = self.write.with_compression(compression);
        self
    }

    /// Options passed down to the storage engine.
    pub fn write_options(&self) -> &WriteOptions {
        &self.write
    }
}
