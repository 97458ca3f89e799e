//! Create and delete places in a panel directory.

use crate::error::{FileOpError, IoResultExt};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Create an empty file `name` under `parent`.
///
/// # Errors
///
/// `AlreadyExists` when the path is taken, `PermissionDenied` when the file
/// cannot be created.
pub fn create_file(parent: &Path, name: &str) -> Result<PathBuf, FileOpError> {
    let path = target_path(parent, name)?;
    if path.symlink_metadata().is_ok() {
        return Err(FileOpError::AlreadyExists(path));
    }

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| creation_error(e, &path))?;

    tracing::info!(path = %path.display(), "created file");
    Ok(path)
}

/// Create directory `name` under `parent`, with any missing intermediate
/// directories.
pub fn create_folder(parent: &Path, name: &str) -> Result<PathBuf, FileOpError> {
    let path = target_path(parent, name)?;
    if path.symlink_metadata().is_ok() {
        return Err(FileOpError::AlreadyExists(path));
    }

    fs::create_dir_all(&path).map_err(|e| creation_error(e, &path))?;

    tracing::info!(path = %path.display(), "created folder");
    Ok(path)
}

/// Delete files and whole directory trees, in order.
///
/// Stops at the first failure; paths before it stay deleted. Returns the
/// number of places removed.
pub fn delete_places(paths: &[PathBuf]) -> Result<usize, FileOpError> {
    for (deleted, path) in paths.iter().enumerate() {
        let metadata = path.symlink_metadata().at(path)?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, deleted, "delete terminated");
            return Err(FileOpError::from_io(e, path));
        }
        tracing::debug!(path = %path.display(), "deleted");
    }

    tracing::info!(count = paths.len(), "delete finished");
    Ok(paths.len())
}

fn target_path(parent: &Path, name: &str) -> Result<PathBuf, FileOpError> {
    if name.trim().is_empty() {
        return Err(FileOpError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path name is required",
        )));
    }
    Ok(parent.join(name))
}

// Anything but a name clash is reported as a permission problem.
fn creation_error(err: io::Error, path: &Path) -> FileOpError {
    match err.kind() {
        io::ErrorKind::AlreadyExists => FileOpError::AlreadyExists(path.to_path_buf()),
        _ => {
            tracing::debug!(path = %path.display(), error = %err, "create failed");
            FileOpError::PermissionDenied(path.to_path_buf())
        }
    }
}
