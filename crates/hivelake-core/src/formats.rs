//! Format-specific helpers.
//!
//! Data files are Parquet; this module is the only place that talks to the
//! Parquet reader and writer.

pub mod parquet;
