//! # fileops
//!
//! The copy and archive core of a two-pane file manager.
//!
//! This library copies files and directory trees with an operator-driven
//! error protocol (retry, skip, skip all, abort), creates and unpacks zip,
//! tar and gzip archives, and walks directory trees with a caller-enforced
//! entry cap.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fileops::{copy, CopyFailure, CopyTask, ErrorDecision, OverwritePolicy};
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let task = CopyTask::new(vec![PathBuf::from("photos")], "/backup")
//!     .with_overwrite(OverwritePolicy::LatestOnly);
//!
//! // Skip anything that fails, keep going
//! let mut handler = |failure: &CopyFailure| {
//!     eprintln!("{}: {}", failure.path.display(), failure.message);
//!     ErrorDecision::Skip
//! };
//! let progress = |path: &Path| println!("Copying: {}", path.display());
//! let cancel_flag = Arc::new(AtomicBool::new(false));
//!
//! let stats = copy(&task, &mut handler, &progress, cancel_flag)?;
//! println!("Copied {} files ({} bytes)", stats.files_copied, stats.bytes_copied);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod copy;
pub mod error;
pub mod finder;
pub mod manage;
pub mod place;
pub mod places;
pub mod recovery;
pub mod safety;
pub mod session;
pub mod types;
pub mod walk;

// Re-export main types
pub use archive::ArchiveFormat;
pub use config::EngineConfig;
pub use error::{FileOpError, SecurityError};
pub use finder::FindResult;
pub use place::PlaceType;
pub use places::{LocalPlaces, PlacesProvider};
pub use recovery::{CopyFailure, ErrorDecision, ErrorHandler, RecoverySession, RecoveryState};
pub use session::{Canceller, OperationEvent, OperationHandle, Operations};
pub use types::{
    ArchiveEntry, CompressStats, CopyStats, CopyTask, ExtractStats, OverwritePolicy,
};

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Type alias for progress callback functions.
///
/// Called once per entry visited, before the entry is processed. The
/// callback cannot cancel; use the cancel flag for that.
pub type ProgressPulse<'a> = dyn Fn(&Path) + Send + Sync + 'a;

/// Copy files and directory trees.
///
/// See [`copy::copy_places`].
pub fn copy(
    task: &CopyTask,
    handler: &mut dyn ErrorHandler,
    progress: &ProgressPulse<'_>,
    cancel_flag: Arc<AtomicBool>,
) -> Result<CopyStats, FileOpError> {
    copy::copy_places(task, handler, progress, cancel_flag)
}

/// Write `files` into a new archive at `output`, names relative to `parent`.
///
/// Returns the final archive path, with the format's extension appended
/// when `output` had none.
///
/// # Errors
///
/// Returns an error if:
/// - A source file doesn't exist
/// - The output directory is not writable
/// - Any other I/O failure occurs
pub fn compress(
    format: ArchiveFormat,
    output: &Path,
    parent: &Path,
    files: &[PathBuf],
    progress: &ProgressPulse<'_>,
) -> Result<PathBuf, FileOpError> {
    let stats = archive::compress(
        format,
        output,
        parent,
        files,
        &EngineConfig::default(),
        progress,
    )?;
    Ok(stats.archive)
}

/// Unpack an archive into `destination`.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist or is corrupted
/// - The destination cannot be created
/// - I/O errors occur
pub fn extract(
    format: ArchiveFormat,
    archive_path: &Path,
    destination: &Path,
    progress: &ProgressPulse<'_>,
) -> Result<ExtractStats, FileOpError> {
    archive::extract(format, archive_path, destination, progress)
}

/// Classify a path.
pub fn classify(path: &Path) -> Result<PlaceType, FileOpError> {
    place::classify(path)
}
