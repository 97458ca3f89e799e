//! Depth-first directory traversal.
//!
//! The walker visits `root` first and then every entry below it in pre-order,
//! siblings ordered by file name. It never caps the enumeration itself; a
//! visitor stops it by returning [`ControlFlow::Break`]. [`collect_tree`] is
//! the capped helper used when a whole selection must be listed up front.

use crate::error::FileOpError;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default cap on the number of entries a caller enumerates.
pub const DEFAULT_TREE_LIMIT: usize = 50_000;

/// Outcome of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Paths handed to the visitor
    pub visited: usize,
    /// Entries skipped because they could not be read
    pub unreadable: usize,
    /// Whether the visitor stopped the walk early
    pub stopped: bool,
}

/// Walk `root` depth-first, pre-order, calling `visit` with each path.
///
/// Unreadable entries are logged and skipped; they never surface as errors.
pub fn walk<F>(root: &Path, mut visit: F) -> WalkSummary
where
    F: FnMut(&Path) -> ControlFlow<()>,
{
    let mut summary = WalkSummary::default();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "walk: skipping entry");
                summary.unreadable += 1;
                continue;
            }
        };

        summary.visited += 1;
        if visit(entry.path()).is_break() {
            summary.stopped = true;
            break;
        }
    }

    tracing::debug!(
        root = %root.display(),
        visited = summary.visited,
        stopped = summary.stopped,
        "walk finished"
    );
    summary
}

/// Enumerate every path under each root, roots included, in walk order.
///
/// # Errors
///
/// Returns `TooManyEntries` as soon as more than `limit` paths would be
/// collected. At most `limit + 1` entries are visited.
pub fn collect_tree(roots: &[PathBuf], limit: usize) -> Result<Vec<PathBuf>, FileOpError> {
    let mut paths = Vec::new();

    for root in roots {
        let summary = walk(root, |path| {
            if paths.len() >= limit {
                return ControlFlow::Break(());
            }
            paths.push(path.to_path_buf());
            ControlFlow::Continue(())
        });

        if summary.stopped {
            return Err(FileOpError::TooManyEntries {
                root: root.clone(),
                limit,
            });
        }
    }

    Ok(paths)
}
