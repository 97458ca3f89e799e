//! Classification of filesystem paths ("places").

use crate::error::{FileOpError, IoResultExt};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The kind of a place, as far as copying and archiving care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceType {
    /// A directory with no children
    EmptyDirectory,
    /// A directory with at least one child
    Directory,
    /// A regular file
    RegularFile,
    /// Anything else: symlink, device, socket, fifo
    Other,
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaceType::EmptyDirectory => "EmptyDir",
            PlaceType::Directory => "Dir",
            PlaceType::RegularFile => "File",
            PlaceType::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Classify a path.
///
/// Symlinks are not followed, so a link to a directory is `Other`.
///
/// # Errors
///
/// Returns `NotFound` if the path does not exist, `PermissionDenied` if it
/// cannot be inspected or a directory cannot be listed.
pub fn classify(path: &Path) -> Result<PlaceType, FileOpError> {
    let metadata = fs::symlink_metadata(path).at(path)?;
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        let mut children = fs::read_dir(path).at(path)?;
        return Ok(match children.next() {
            None => PlaceType::EmptyDirectory,
            Some(_) => PlaceType::Directory,
        });
    }

    if file_type.is_file() {
        return Ok(PlaceType::RegularFile);
    }

    Ok(PlaceType::Other)
}

/// List the immediate children of a directory, ordered by file name.
///
/// Entries that fail to read are skipped.
pub fn path_contents(dir: &Path) -> Result<Vec<PathBuf>, FileOpError> {
    let read_dir = fs::read_dir(dir).at(dir)?;

    let mut children = Vec::new();
    for entry in read_dir {
        match entry {
            Ok(entry) => children.push(entry.path()),
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable entry"),
        }
    }
    children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(children)
}
