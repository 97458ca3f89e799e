//! Error types for copy and archive operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for fileops operations.
#[derive(Debug, Error)]
pub enum FileOpError {
    /// A source path does not exist.
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// The filesystem refused access to a path.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The target of a create operation already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A generic read/write failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A directory tree holds more entries than the caller allows.
    #[error("Too many entries under {root}: more than {limit}")]
    TooManyEntries {
        /// Root of the enumeration that hit the cap
        root: PathBuf,
        /// Configured entry cap
        limit: usize,
    },

    /// The operation was cancelled by the operator.
    #[error("Aborted by operator")]
    Aborted,

    /// The archive format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The archive is corrupted or malformed.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// A search pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A directory would be copied into its own subtree.
    #[error("Cannot copy {directory} into itself ({destination})")]
    DestinationInsideSource {
        /// Directory being copied
        directory: PathBuf,
        /// Destination inside it
        destination: PathBuf,
    },

    /// Source and destination of a copy are the same place.
    #[error("Source and destination are the same: {0}")]
    SameLocation(PathBuf),

    /// A file selected for an archive does not live under its parent directory.
    #[error("{file} is outside {parent}")]
    OutsideParent {
        /// Selected file
        file: PathBuf,
        /// Directory entry names are relative to
        parent: PathBuf,
    },

    /// Another operation is already running.
    #[error("Another operation is already running")]
    Busy,

    /// An archive entry name is unsafe to extract.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),
}

impl FileOpError {
    /// Map an I/O error onto the taxonomy, keeping the offending path.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileOpError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => FileOpError::PermissionDenied(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => FileOpError::AlreadyExists(path.to_path_buf()),
            _ => FileOpError::Io(err),
        }
    }

    /// Whether this error ends the operation rather than a single entry.
    pub fn is_aborted(&self) -> bool {
        matches!(self, FileOpError::Aborted)
    }
}

/// Security-related errors for archive entry names.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),
}

/// Extension trait to attach a path to `io::Result` values.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T, FileOpError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, FileOpError> {
        self.map_err(|e| FileOpError::from_io(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_kinds() {
        let path = Path::new("/tmp/x");

        let err = FileOpError::from_io(io::Error::from(io::ErrorKind::NotFound), path);
        assert!(matches!(err, FileOpError::NotFound(p) if p == path));

        let err = FileOpError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), path);
        assert!(matches!(err, FileOpError::PermissionDenied(_)));

        let err = FileOpError::from_io(io::Error::from(io::ErrorKind::AlreadyExists), path);
        assert!(matches!(err, FileOpError::AlreadyExists(_)));

        let err = FileOpError::from_io(io::Error::from(io::ErrorKind::UnexpectedEof), path);
        assert!(matches!(err, FileOpError::Io(_)));
    }

    #[test]
    fn test_display_too_many_entries() {
        let err = FileOpError::TooManyEntries {
            root: PathBuf::from("/data"),
            limit: 10,
        };
        assert_eq!(err.to_string(), "Too many entries under /data: more than 10");
    }
}
