//! Find paths under a directory tree that match a pattern.

use crate::error::FileOpError;
use crate::walk::walk;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of a search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindResult {
    /// Matching paths, in walk order
    pub matches: Vec<PathBuf>,

    /// Paths examined
    pub visited: usize,

    /// The search stopped because `max_results` matches were found
    pub limited: bool,

    /// The search stopped because the cancel flag was raised
    pub cancelled: bool,
}

/// Compile a search pattern. Matching is case-insensitive.
pub fn compile_pattern(pattern: &str) -> Result<Regex, FileOpError> {
    if pattern.is_empty() {
        return Err(FileOpError::InvalidPattern("empty pattern".to_string()));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| FileOpError::InvalidPattern(e.to_string()))
}

/// Walk `root` and collect every path whose full text matches `pattern`.
///
/// The search stops after `max_results` matches (0 means no cap) or as soon
/// as `cancel_flag` is raised; whatever was found until then is returned.
///
/// # Errors
///
/// `InvalidPattern` when the pattern is empty or fails to compile.
pub fn find(
    root: &Path,
    pattern: &str,
    max_results: usize,
    cancel_flag: Arc<AtomicBool>,
) -> Result<FindResult, FileOpError> {
    let regex = compile_pattern(pattern)?;
    let mut result = FindResult::default();

    let summary = walk(root, |path| {
        if cancel_flag.load(Ordering::Relaxed) {
            result.cancelled = true;
            return ControlFlow::Break(());
        }
        if regex.is_match(&path.to_string_lossy()) {
            result.matches.push(path.to_path_buf());
            if max_results > 0 && result.matches.len() >= max_results {
                result.limited = true;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });
    result.visited = summary.visited;

    tracing::info!(
        root = %root.display(),
        pattern,
        found = result.matches.len(),
        visited = result.visited,
        "find finished"
    );
    Ok(result)
}
