//! Entry naming and path safety for archives.
//!
//! Names stored in archives are always relative and `/`-separated. Names read
//! back from archives are validated before they are joined onto a destination
//! directory, so a crafted entry cannot escape it (zip-slip).

use crate::error::{FileOpError, IoResultExt, SecurityError};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Compute the stored name of `file` relative to `parent`.
///
/// Both paths are made absolute first, so relative inputs such as a parent
/// of `.` work. Separators are normalized to `/`. Directories get a trailing
/// `/` when `is_dir` is set. `file` equal to `parent` is stored under its
/// base name.
///
/// # Errors
///
/// `OutsideParent` when `file` does not live under `parent`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use fileops::safety::archive_name;
///
/// let name = archive_name(Path::new("/home/u"), Path::new("/home/u/docs/a.txt"), false).unwrap();
/// assert_eq!(name, "docs/a.txt");
///
/// let dir = archive_name(Path::new("/home/u"), Path::new("/home/u/docs"), true).unwrap();
/// assert_eq!(dir, "docs/");
///
/// assert!(archive_name(Path::new("/home/u"), Path::new("/etc/passwd"), false).is_err());
/// ```
pub fn archive_name(parent: &Path, file: &Path, is_dir: bool) -> Result<String, FileOpError> {
    let parent = absolute_path(parent).at(parent)?;
    let absolute = absolute_path(file).at(file)?;

    let relative = match absolute.strip_prefix(&parent) {
        Ok(rel) if rel.as_os_str().is_empty() => absolute.file_name().map(PathBuf::from).unwrap_or_default(),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => {
            return Err(FileOpError::OutsideParent {
                file: file.to_path_buf(),
                parent,
            })
        }
    };

    let mut name = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    name = name.replace('\\', "/");

    if is_dir && !name.is_empty() && !name.ends_with('/') {
        name.push('/');
    }
    Ok(name)
}

/// Make `path` absolute against the current directory and fold away `.`
/// and `..` components. Symlinks are left alone.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Turn an entry path read from an archive into a safe relative path.
///
/// Absolute paths, drive prefixes and `..` components are refused. `.`
/// components are dropped. A name that reduces to nothing is refused too.
///
/// ```
/// use std::path::Path;
/// use fileops::safety::validate_entry_path;
///
/// assert_eq!(validate_entry_path(Path::new("./dir//file.txt")).unwrap(), Path::new("dir/file.txt"));
/// assert!(validate_entry_path(Path::new("dir/../../x")).is_err());
/// assert!(validate_entry_path(Path::new("/etc/passwd")).is_err());
/// ```
pub fn validate_entry_path(path: &Path) -> Result<PathBuf, SecurityError> {
    let shown = || path.display().to_string();
    let mut relative = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(SecurityError::PathTraversal(shown())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(shown()))
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal(format!("{} (empty name)", shown())));
    }
    Ok(relative)
}

/// Validate a stored entry name. A trailing `/` (directory marker) is ignored.
pub fn validate_entry_name(name: &str) -> Result<PathBuf, SecurityError> {
    let trimmed = name.trim_end_matches('/');
    validate_entry_path(Path::new(trimmed))
}
