//! Error taxonomy for the streaming log store.
//!
//! The store never panics on malformed input; panics are reserved for
//! programmer errors (e.g. a poisoned lock). Everything a caller can
//! trigger from the outside — a missing file, a bad regex, a cancelled
//! scan — comes back as a [`StoreError`] variant.

use std::fmt;
use std::path::PathBuf;

/// Errors returned by the streaming log store's public operations.
#[derive(Debug)]
pub enum StoreError {
    /// `path` could not be opened: missing, not a regular file, or the
    /// open call failed for a reason other than a permissions error.
    FileOpenFailed { path: PathBuf, source: std::io::Error },
    /// `path` exists but the OS denied read access to it.
    PermissionDenied { path: PathBuf },
    /// An I/O error occurred mid-read, after the file was successfully opened.
    FileReadFailed { path: PathBuf, source: std::io::Error },
    /// An operation that requires a built [`crate::index::FileIndex`] was
    /// called before `load` (or after `close`).
    IndexUnbuilt,
    /// A predicate failed to compile (malformed regex or numeric literal).
    /// Raised only at expression-construction time, never during evaluation.
    PredicateCompile { field: String, reason: String },
    /// Cooperative cancellation was acknowledged before the operation completed.
    Cancelled,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::FileOpenFailed { path, source } => {
                write!(f, "failed to open log file '{}': {}", path.display(), source)
            }
            StoreError::PermissionDenied { path } => {
                write!(f, "permission denied reading log file '{}'", path.display())
            }
            StoreError::FileReadFailed { path, source } => {
                write!(f, "I/O error reading log file '{}': {}", path.display(), source)
            }
            StoreError::IndexUnbuilt => {
                write!(f, "operation requires a loaded file; call load() first")
            }
            StoreError::PredicateCompile { field, reason } => {
                write!(f, "predicate on field '{}' failed to compile: {}", field, reason)
            }
            StoreError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::FileOpenFailed { source, .. } => Some(source),
            StoreError::FileReadFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl StoreError {
    /// Builds the right variant from an I/O error encountered while opening `path`.
    pub fn from_open_error(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            StoreError::PermissionDenied { path: path.to_path_buf() }
        } else {
            StoreError::FileOpenFailed { path: path.to_path_buf(), source }
        }
    }
}

/// Convenience result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
