//! Directory layout of a hivelake database.
//!
//! ```text
//! <database-root>/
//!   _metadata/<table_name>.json       (one metadata document per table)
//!   <table_name>/                     (table data directory)
//!     <key1>=<v1>/<key2>=<v2>/...     (hive-style partition directories)
//!       part-<uuid v7>.parquet        (data files)
//! ```
//!
//! Names starting with `_` or `.` are reserved at the database root, which is
//! why table names may not start with either.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{InvalidTableNameSnafu, TableResult};

/// Directory (relative to the database root) holding metadata documents.
pub const METADATA_DIR: &str = "_metadata";
/// File extension of metadata documents.
pub const METADATA_EXT: &str = "json";
/// File extension of data files.
pub const DATA_FILE_EXT: &str = "parquet";
/// Prefix of data file names.
pub const DATA_FILE_PREFIX: &str = "part-";

const MAX_TABLE_NAME_LEN: usize = 128;

/// Validates that a table name is safe to use as a directory and file name.
///
/// A valid table name must:
/// - Not be empty and not exceed 128 characters
/// - Not start with `_` or `.` (reserved for internal entries)
/// - Not contain path separators (`/`, `\`) or `..` sequences
/// - Only contain ASCII alphanumeric characters, dots, underscores, and hyphens
pub fn validate_table_name(table_name: &str) -> TableResult<()> {
    let ok = !table_name.is_empty()
        && table_name.len() <= MAX_TABLE_NAME_LEN
        && !table_name.starts_with('_')
        && !table_name.starts_with('.')
        && !table_name.contains("..")
        && table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if !ok {
        return InvalidTableNameSnafu { table_name }.fail();
    }
    Ok(())
}

/// Relative path: `_metadata/<table_name>.json`
pub fn metadata_rel_path(table_name: &str) -> TableResult<PathBuf> {
    validate_table_name(table_name)?;
    let mut p = PathBuf::from(METADATA_DIR);
    p.push(format!("{table_name}.{METADATA_EXT}"));
    Ok(p)
}

/// Relative path: `<table_name>/`
pub fn table_rel_dir(table_name: &str) -> TableResult<PathBuf> {
    validate_table_name(table_name)?;
    Ok(PathBuf::from(table_name))
}

/// A fresh data file name: `part-<uuid v7>.parquet`.
///
/// UUID v7 values are time-ordered and unique per call, so two writes never
/// produce the same name.
pub fn new_data_file_name() -> String {
    format!("{DATA_FILE_PREFIX}{}.{DATA_FILE_EXT}", Uuid::now_v7())
}

/// Returns true if `name` is a visible data file.
///
/// Hidden files (leading `.`), including in-progress temporaries, are never
/// data files.
pub fn is_data_file_name(name: &str) -> bool {
    !name.starts_with('.')
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == DATA_FILE_EXT)
}

/// Extracts the table name from a metadata document file name, if it is one.
pub fn table_name_from_metadata_file(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(METADATA_EXT)?.strip_suffix('.')?;
    validate_table_name(stem).ok()?;
    Some(stem)
}
