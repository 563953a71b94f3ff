//! Filesystem access for a hivelake database root.
//!
//! Every read and write performed by the engine goes through this module so
//! that path handling and error classification live in one place:
//!
//! - Metadata documents are replaced with write-then-rename
//!   ([`write_atomic`]).
//! - Data files are made visible only once fully written and synced, and
//!   never replace an existing file ([`write_new_visible`]).
//! - Directory removal tolerates entries that disappeared concurrently
//!   ([`remove_dir_all_tolerant`]).
//!
//! Only the local filesystem is supported; [`DatabaseLocation`] keeps the
//! door open for other backends without touching the callers.

use snafu::{Backtrace, prelude::*};
use std::{
    error::Error,
    fmt,
    future::Future,
    io,
    path::{Path, PathBuf},
    pin::Pin,
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root location of a hivelake database.
#[derive(Clone, Debug)]
pub enum DatabaseLocation {
    /// A database stored on the local filesystem at the given path.
    Local(PathBuf),
}

impl DatabaseLocation {
    /// Creates a new `DatabaseLocation` for a local filesystem path.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        DatabaseLocation::Local(root.into())
    }

    /// Returns the absolute path for `rel` under this location.
    pub fn resolve(&self, rel: &Path) -> PathBuf {
        match self {
            DatabaseLocation::Local(root) => root.join(rel),
        }
    }

    /// Returns the root path of this location.
    pub fn root(&self) -> &Path {
        match self {
            DatabaseLocation::Local(root) => root.as_path(),
        }
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseLocation::Local(root) => write!(f, "{}", root.display()),
        }
    }
}

/// Errors produced by the storage backend implementation.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The target path already exists and the operation refuses to replace it.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// The path that was found to already exist.
        path: String,
        /// Underlying backend error that indicates the existing resource.
        source: BackendError,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Any other I/O error on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Returns true if this error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

fn classify(abs: &Path, e: io::Error) -> StorageError {
    let path = abs.display().to_string();
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        },
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        },
        _ => StorageError::OtherIo {
            path,
            source: BackendError::Local(e),
            backtrace: Backtrace::capture(),
        },
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Guard that removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup while another error is already propagating.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn write_synced(path: &Path, contents: &[u8], create_new: bool) -> StorageResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(!create_new)
        .create_new(create_new)
        .truncate(!create_new)
        .open(path)
        .await
        .map_err(|e| classify(path, e))?;

    file.write_all(contents)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path.display().to_string(),
        })?;

    file.sync_all()
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: path.display().to_string(),
        })?;

    Ok(())
}

/// Hidden sibling used while a file is being written: `.<name>.tmp`.
fn hidden_tmp_path(abs: &Path) -> PathBuf {
    let name = abs
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    abs.with_file_name(format!(".{name}.tmp"))
}

/// Write `contents` to `rel_path`, atomically replacing any previous file.
///
/// The payload is written to a hidden temporary file next to the target,
/// synced, and renamed into place. Parent directories are created as needed.
pub async fn write_atomic(
    location: &DatabaseLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = location.resolve(rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = hidden_tmp_path(&abs);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    write_synced(&tmp_path, contents, false).await?;

    fs::rename(&tmp_path, &abs)
        .await
        .map_err(BackendError::Local)
        .context(OtherIoSnafu {
            path: abs.display().to_string(),
        })?;

    guard.disarm();
    Ok(())
}

/// Create a *new* file at `rel_path` whose contents become visible all at once.
///
/// Unlike [`write_atomic`] this never replaces an existing file: if the target
/// already exists `StorageError::AlreadyExists` is returned and nothing is
/// left behind. Readers that ignore hidden (dot-prefixed) files never observe
/// a partially written file.
pub async fn write_new_visible(
    location: &DatabaseLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = location.resolve(rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = hidden_tmp_path(&abs);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    write_synced(&tmp_path, contents, true).await?;

    // Linking fails if the target exists, so publishing cannot overwrite.
    fs::hard_link(&tmp_path, &abs)
        .await
        .map_err(|e| classify(&abs, e))?;

    guard.disarm();
    fs::remove_file(&tmp_path)
        .await
        .map_err(|e| classify(&tmp_path, e))?;
    Ok(())
}

/// Read the file at `rel_path` as UTF-8 text.
///
/// A missing file yields `StorageError::NotFound`.
pub async fn read_to_string(location: &DatabaseLocation, rel_path: &Path) -> StorageResult<String> {
    let abs = location.resolve(rel_path);
    fs::read_to_string(&abs)
        .await
        .map_err(|e| classify(&abs, e))
}

/// Read the full contents of the file at `rel_path`.
pub async fn read_all_bytes(location: &DatabaseLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = location.resolve(rel_path);
    fs::read(&abs).await.map_err(|e| classify(&abs, e))
}

/// Returns true if something exists at `rel_path`.
pub async fn exists(location: &DatabaseLocation, rel_path: &Path) -> StorageResult<bool> {
    let abs = location.resolve(rel_path);
    fs::try_exists(&abs).await.map_err(|e| classify(&abs, e))
}

/// Create the directory at `rel_path` and all of its parents.
pub async fn create_dir_all(location: &DatabaseLocation, rel_path: &Path) -> StorageResult<()> {
    let abs = location.resolve(rel_path);
    fs::create_dir_all(&abs)
        .await
        .map_err(|e| classify(&abs, e))
}

/// Remove the file at `rel_path`.
///
/// Returns `Ok(false)` if the file was already gone.
pub async fn remove_file_if_exists(
    location: &DatabaseLocation,
    rel_path: &Path,
) -> StorageResult<bool> {
    let abs = location.resolve(rel_path);
    match fs::remove_file(&abs).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(classify(&abs, e)),
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File or directory name (last path component).
    pub name: String,
    /// True if the entry is a directory.
    pub is_dir: bool,
}

/// List the direct children of the directory at `rel_path`, sorted by name.
///
/// A missing directory yields `StorageError::NotFound`. Entries whose names
/// are not valid UTF-8 are skipped.
pub async fn list_dir(location: &DatabaseLocation, rel_path: &Path) -> StorageResult<Vec<DirEntry>> {
    let abs = location.resolve(rel_path);
    let mut rd = fs::read_dir(&abs).await.map_err(|e| classify(&abs, e))?;

    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(|e| classify(&abs, e))? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            // Removed between read_dir and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(classify(&entry.path(), e)),
        };
        out.push(DirEntry {
            name,
            is_dir: file_type.is_dir(),
        });
    }

    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn remove_tree(abs: PathBuf) -> Pin<Box<dyn Future<Output = StorageResult<()>> + Send>> {
    Box::pin(async move {
        let mut rd = match fs::read_dir(&abs).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(classify(&abs, e)),
        };

        while let Some(entry) = rd.next_entry().await.map_err(|e| classify(&abs, e))? {
            let path = entry.path();
            let is_dir = match entry.file_type().await {
                Ok(t) => t.is_dir(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(classify(&path, e)),
            };

            if is_dir {
                remove_tree(path).await?;
            } else {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(classify(&path, e)),
                }
            }
        }

        match fs::remove_dir(&abs).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(classify(&abs, e)),
        }
    })
}

/// Recursively remove the directory at `rel_path`.
///
/// Entries that vanish while the walk is in progress, or a directory that is
/// already gone, are not errors.
pub async fn remove_dir_all_tolerant(
    location: &DatabaseLocation,
    rel_path: &Path,
) -> StorageResult<()> {
    remove_tree(location.resolve(rel_path)).await
}

/// Remove `rel_dir` if it is empty, then walk up removing empty parents.
///
/// The walk stops at `stop_at` (which is never removed) or at the first
/// non-empty directory. Returns the number of directories removed.
pub async fn remove_empty_dirs(
    location: &DatabaseLocation,
    rel_dir: &Path,
    stop_at: &Path,
) -> StorageResult<usize> {
    let mut removed = 0;
    let mut current = rel_dir.to_path_buf();

    while current != stop_at && current.starts_with(stop_at) {
        let abs = location.resolve(&current);
        match fs::remove_dir(&abs).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => break,
            Err(e) => return Err(classify(&abs, e)),
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    Ok(removed)
}
