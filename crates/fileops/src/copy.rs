//! Recursive copy of files and directory trees.

use crate::error::{FileOpError, IoResultExt};
use crate::place::{classify, path_contents, PlaceType};
use crate::recovery::{ErrorHandler, RecoverySession, Resolution};
use crate::safety::absolute_path;
use crate::types::{CopyStats, CopyTask, OverwritePolicy};
use crate::ProgressPulse;
use filetime::FileTime;
use std::ffi::OsStr;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Result of copying one regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCopyOutcome {
    /// Bytes were written
    Copied(u64),
    /// The destination was at least as new as the source (LatestOnly)
    UpToDate,
}

/// Copy every source of `task` into `task.destination`.
///
/// Sources are processed in order; directories are descended depth-first in
/// file name order. `progress` is pulsed once per entry visited. A file that
/// fails to copy is presented to `handler`, which decides between retrying,
/// skipping and aborting. Files already copied stay in place when the
/// operation is aborted.
///
/// # Errors
///
/// Returns the triggering error when the operator aborts, `Aborted` when the
/// cancel flag is raised, `DestinationInsideSource` when a directory would be
/// copied into itself, and `SameLocation` when a source already lives in the
/// destination. A file that resolves to its own target fails with
/// `SameLocation` through the recovery protocol.
pub fn copy_places(
    task: &CopyTask,
    handler: &mut dyn ErrorHandler,
    progress: &ProgressPulse<'_>,
    cancel_flag: Arc<AtomicBool>,
) -> Result<CopyStats, FileOpError> {
    let start_time = Instant::now();

    validate_destination_not_inside_source(&task.sources, &task.destination)?;
    validate_not_same_location(&task.sources, &task.destination)?;
    fs::create_dir_all(&task.destination).at(&task.destination)?;

    tracing::info!(
        sources = task.sources.len(),
        destination = %task.destination.display(),
        overwrite = ?task.overwrite,
        "copy started"
    );

    let mut engine = CopyEngine {
        task,
        handler,
        progress,
        cancel_flag,
        session: RecoverySession::new(),
        stats: CopyStats::default(),
        buffer: vec![0; task.effective_buffer_size()],
    };

    let result = engine.copy_entries(&task.sources, &task.destination);

    let mut stats = engine.stats;
    stats.duration = start_time.elapsed();

    match result {
        Ok(()) => {
            tracing::info!(
                files = engine.session.file_count,
                directories = engine.session.directory_count,
                skipped = stats.files_skipped,
                "copy finished"
            );
            Ok(stats)
        }
        Err(e) => {
            tracing::info!(error = %e, files = engine.session.file_count, "copy aborted");
            Err(e)
        }
    }
}

/// Reject copies of a directory into its own subtree.
///
/// Paths are compared in absolute, symlink-resolved form, so a relative
/// destination that does not exist yet is still caught.
pub fn validate_destination_not_inside_source(
    sources: &[PathBuf],
    destination: &Path,
) -> Result<(), FileOpError> {
    let destination = resolve_path(destination).at(destination)?;

    for source in sources {
        if !source.is_dir() {
            continue;
        }
        let source = resolve_path(source).at(source)?;
        if destination.starts_with(&source) {
            return Err(FileOpError::DestinationInsideSource {
                directory: source,
                destination,
            });
        }
    }
    Ok(())
}

/// Reject copies of an entry into the directory it already lives in.
pub fn validate_not_same_location(sources: &[PathBuf], destination: &Path) -> Result<(), FileOpError> {
    let destination = resolve_path(destination).at(destination)?;

    for source in sources {
        let absolute = absolute_path(source).at(source)?;
        let Some(parent) = absolute.parent() else {
            continue;
        };
        if resolve_path(parent).at(parent)? == destination {
            return Err(FileOpError::SameLocation(source.clone()));
        }
    }
    Ok(())
}

/// Absolute form of `path` with symlinks resolved as far as it exists.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = absolute_path(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |resolved, part| resolved.join(part)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return Ok(absolute.clone()),
        }
    }
}

struct CopyEngine<'a> {
    task: &'a CopyTask,
    handler: &'a mut dyn ErrorHandler,
    progress: &'a ProgressPulse<'a>,
    cancel_flag: Arc<AtomicBool>,
    session: RecoverySession,
    stats: CopyStats,
    buffer: Vec<u8>,
}

impl CopyEngine<'_> {
    fn copy_entries(&mut self, entries: &[PathBuf], destination: &Path) -> Result<(), FileOpError> {
        for source in entries {
            (self.progress)(source.as_path());

            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(FileOpError::Aborted);
            }

            let Some(place) = self.attempt(source, |_| classify(source))? else {
                continue;
            };
            tracing::debug!(path = %source.display(), place = %place, "copying");

            match place {
                PlaceType::Directory => {
                    let target = destination.join(entry_name(source)?);
                    create_dir_best_effort(&target);
                    let Some(children) = self.attempt(source, |_| path_contents(source))? else {
                        continue;
                    };
                    self.copy_entries(&children, &target)?;
                    copy_mtime_best_effort(source, &target);
                    self.session.directory_count += 1;
                    self.stats.directories += 1;
                }
                PlaceType::EmptyDirectory => {
                    let target = destination.join(entry_name(source)?);
                    create_dir_best_effort(&target);
                    copy_mtime_best_effort(source, &target);
                    self.session.directory_count += 1;
                    self.stats.directories += 1;
                }
                PlaceType::RegularFile => {
                    let outcome = self.attempt(source, |engine| engine.copy_file(source, destination))?;
                    self.session.file_count += 1;
                    match outcome {
                        Some(FileCopyOutcome::Copied(bytes)) => {
                            self.stats.files_copied += 1;
                            self.stats.bytes_copied += bytes;
                        }
                        Some(FileCopyOutcome::UpToDate) => self.stats.files_up_to_date += 1,
                        None => {}
                    }
                }
                PlaceType::Other => {
                    tracing::warn!(path = %source.display(), "unable to copy, not a file or directory");
                    self.stats.files_skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Run `op` until it succeeds or the operator gives up on it.
    ///
    /// `Ok(None)` means the entry was skipped.
    fn attempt<T, F>(&mut self, source: &Path, mut op: F) -> Result<Option<T>, FileOpError>
    where
        F: FnMut(&mut Self) -> Result<T, FileOpError>,
    {
        let mut attempt = 0;
        loop {
            let err = match op(self) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => e,
            };
            tracing::debug!(path = %source.display(), error = %err, attempt, "copy failure");

            match self.session.resolve(source, &err, attempt, &mut *self.handler) {
                Resolution::Retry => attempt += 1,
                Resolution::Skip => {
                    self.stats.files_skipped += 1;
                    return Ok(None);
                }
                Resolution::Abort => return Err(err),
            }
        }
    }

    fn copy_file(&mut self, source: &Path, destination_dir: &Path) -> Result<FileCopyOutcome, FileOpError> {
        let target = destination_dir.join(entry_name(source)?);

        let source_meta = fs::metadata(source).at(source)?;
        let source_mtime = FileTime::from_last_modification_time(&source_meta);

        match fs::metadata(&target) {
            Ok(target_meta) => {
                if is_same_file(source, &source_meta, &target, &target_meta) {
                    return Err(FileOpError::SameLocation(source.to_path_buf()));
                }
                let target_mtime = FileTime::from_last_modification_time(&target_meta);
                if self.task.overwrite == OverwritePolicy::LatestOnly && source_mtime <= target_mtime {
                    tracing::debug!(path = %target.display(), "destination is current, skipping");
                    return Ok(FileCopyOutcome::UpToDate);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(FileOpError::from_io(e, &target)),
        }

        let mut input = File::open(source).at(source)?;
        let mut output = File::create(&target).at(&target)?;

        let mut written = 0u64;
        loop {
            let n = match input.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileOpError::from_io(e, source)),
            };
            output.write_all(&self.buffer[..n]).at(&target)?;
            written += n as u64;
        }
        output.flush().at(&target)?;
        drop(output);

        if let Err(e) = filetime::set_file_times(&target, source_mtime, source_mtime) {
            tracing::warn!(path = %target.display(), error = %e, "failed to reset modification time");
        }

        Ok(FileCopyOutcome::Copied(written))
    }
}

fn entry_name(path: &Path) -> Result<&OsStr, FileOpError> {
    path.file_name().ok_or_else(|| {
        FileOpError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {}", path.display()),
        ))
    })
}

#[cfg(unix)]
fn is_same_file(_source: &Path, source_meta: &Metadata, _target: &Path, target_meta: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    source_meta.dev() == target_meta.dev() && source_meta.ino() == target_meta.ino()
}

#[cfg(not(unix))]
fn is_same_file(source: &Path, _source_meta: &Metadata, target: &Path, _target_meta: &Metadata) -> bool {
    match (source.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn create_dir_best_effort(path: &Path) {
    if let Err(e) = fs::create_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to create directory");
    }
}

fn copy_mtime_best_effort(source: &Path, target: &Path) {
    let result = fs::metadata(source).and_then(|meta| {
        let mtime = FileTime::from_last_modification_time(&meta);
        filetime::set_file_mtime(target, mtime)
    });
    if let Err(e) = result {
        tracing::warn!(path = %target.display(), error = %e, "failed to copy directory time");
    }
}
