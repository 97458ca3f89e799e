//! Zip, tar and gzip creation and extraction.
//!
//! All three formats share one contract: [`compress`] stores a list of paths
//! relative to a parent directory, [`extract`] restores them under a
//! destination directory. Both pulse the progress callback once per entry.
//! Failures are not recoverable entry by entry: the whole call fails.
//!
//! Gzip extraction detects a tar payload ("tgz") from the embedded file name
//! or from a `.tgz` archive name; see [`is_tar_payload`].

mod gzip_codec;
mod tar_codec;
mod zip_codec;

pub use gzip_codec::{host_os_code, is_tar_payload};

use crate::config::EngineConfig;
use crate::error::{FileOpError, IoResultExt};
use crate::types::{ArchiveEntry, CompressStats, ExtractStats};
use crate::walk::collect_tree;
use crate::ProgressPulse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, Metadata};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Gzip,
}

impl ArchiveFormat {
    /// Detect the format from a file name's extension.
    ///
    /// `.zip` is zip; `.tar` is tar; `.gz`, `.tgz` and `.gzip` are gzip.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "tar" => Some(ArchiveFormat::Tar),
            "gz" | "tgz" | "gzip" => Some(ArchiveFormat::Gzip),
            _ => None,
        }
    }

    /// Extension appended to archive names that have none.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Gzip => "gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Gzip => "gzip",
        };
        f.write_str(name)
    }
}

impl FromStr for ArchiveFormat {
    type Err = FileOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            "gzip" | "gz" | "tgz" => Ok(ArchiveFormat::Gzip),
            other => Err(FileOpError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Append the format's extension when `path` has no extension at all.
pub fn with_archive_extension(path: &Path, format: ArchiveFormat) -> PathBuf {
    if path.extension().is_some() {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// Directory an archive is unpacked into when the caller names none:
/// `root/<archive base name with '.' replaced by '_'>`.
pub fn default_extract_dir(root: &Path, archive: &Path) -> PathBuf {
    let base = archive
        .file_name()
        .map(|n| n.to_string_lossy().replace('.', "_"))
        .unwrap_or_else(|| "archive".to_string());
    root.join(base)
}

/// Write `files` into a new archive at `output`.
///
/// Each path is stored relative to `parent`. Directories become directory
/// entries; their contents are only stored if they are listed too (see
/// [`compress_selection`]). The archive is written to a temporary file next
/// to `output` and moved into place only when complete.
///
/// # Errors
///
/// `NotFound` for a missing source, `PermissionDenied` when the output
/// directory is not writable, `Io` for any other failure.
pub fn compress(
    format: ArchiveFormat,
    output: &Path,
    parent: &Path,
    files: &[PathBuf],
    config: &EngineConfig,
    progress: &ProgressPulse<'_>,
) -> Result<CompressStats, FileOpError> {
    let start_time = Instant::now();
    let output = with_archive_extension(output, format);
    let output_dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    tracing::info!(
        format = %format,
        archive = %output.display(),
        files = files.len(),
        "compress started"
    );

    let mut temp = archive_temp_file(&output_dir).at(&output_dir)?;
    let level = config.compression_level.min(9);

    let entries = {
        let writer = BufWriter::new(temp.as_file_mut());
        match format {
            ArchiveFormat::Zip => {
                let (entries, writer) = zip_codec::write_zip(writer, parent, files, level, progress)?;
                finish_writer(writer, &output)?;
                entries
            }
            ArchiveFormat::Tar => {
                let (entries, writer) = tar_codec::write_tar(writer, parent, files, progress)?;
                finish_writer(writer, &output)?;
                entries
            }
            ArchiveFormat::Gzip => {
                let (entries, writer) =
                    gzip_codec::write_gzip(writer, &output, parent, files, level, progress)?;
                finish_writer(writer, &output)?;
                entries
            }
        }
    };

    temp.persist(&output)
        .map_err(|e| FileOpError::from_io(e.error, &output))?;

    let bytes_read = entries.iter().map(|e| e.size).sum();
    tracing::info!(archive = %output.display(), entries = entries.len(), "compress finished");

    Ok(CompressStats {
        archive: output,
        entries,
        bytes_read,
        duration: start_time.elapsed(),
    })
}

/// Expand a selection and compress it.
///
/// Plain files come first, then every directory tree in walk order. The
/// expansion is capped at `config.max_tree_entries`.
///
/// # Errors
///
/// `TooManyEntries` when the selection expands past the cap, otherwise as
/// [`compress`].
pub fn compress_selection(
    format: ArchiveFormat,
    output: &Path,
    parent: &Path,
    selection: &[PathBuf],
    config: &EngineConfig,
    progress: &ProgressPulse<'_>,
) -> Result<CompressStats, FileOpError> {
    let (directories, plain): (Vec<PathBuf>, Vec<PathBuf>) =
        selection.iter().cloned().partition(|p| p.is_dir());

    let mut files = plain;
    let tree = collect_tree(&directories, config.max_tree_entries.saturating_sub(files.len()))?;
    files.extend(tree);

    compress(format, output, parent, &files, config, progress)
}

/// Unpack `archive` into `destination`.
///
/// # Errors
///
/// `NotFound` for a missing archive, `PermissionDenied` when the destination
/// cannot be created, `Corrupted` for malformed input, `Io` otherwise.
pub fn extract(
    format: ArchiveFormat,
    archive: &Path,
    destination: &Path,
    progress: &ProgressPulse<'_>,
) -> Result<ExtractStats, FileOpError> {
    let start_time = Instant::now();

    if !archive.exists() {
        return Err(FileOpError::NotFound(archive.to_path_buf()));
    }
    fs::create_dir_all(destination).at(destination)?;

    tracing::info!(
        format = %format,
        archive = %archive.display(),
        destination = %destination.display(),
        "extract started"
    );

    let mut stats = ExtractStats::default();
    match format {
        ArchiveFormat::Zip => zip_codec::read_zip(archive, destination, progress, &mut stats)?,
        ArchiveFormat::Tar => {
            let file = fs::File::open(archive).at(archive)?;
            tar_codec::read_tar(io::BufReader::new(file), archive, destination, progress, &mut stats)?
        }
        ArchiveFormat::Gzip => gzip_codec::read_gzip(archive, destination, progress, &mut stats)?,
    }

    stats.duration = start_time.elapsed();
    tracing::info!(
        archive = %archive.display(),
        files = stats.files_extracted,
        skipped = stats.entries_skipped,
        "extract finished"
    );
    Ok(stats)
}

/// Unpack an archive whose format is known from its extension.
pub fn extract_auto(
    archive: &Path,
    destination: &Path,
    progress: &ProgressPulse<'_>,
) -> Result<ExtractStats, FileOpError> {
    let format = ArchiveFormat::from_path(archive)
        .ok_or_else(|| FileOpError::UnsupportedFormat(archive.display().to_string()))?;
    extract(format, archive, destination, progress)
}

/// Temporary file for a new archive, with the mode a plain create would
/// give it (0666 less the umask) rather than tempfile's private 0600.
#[cfg(unix)]
fn archive_temp_file(dir: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn archive_temp_file(dir: &Path) -> io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

fn finish_writer<W: Write>(mut writer: W, output: &Path) -> Result<(), FileOpError> {
    writer.flush().at(output)
}

/// Metadata of one source path, in the shape every codec needs.
pub(crate) struct SourceInfo {
    pub metadata: Metadata,
    pub modified: SystemTime,
    pub permissions: u32,
}

impl SourceInfo {
    pub(crate) fn read(path: &Path) -> Result<Self, FileOpError> {
        let metadata = fs::metadata(path).at(path)?;
        let modified = metadata.modified().at(path)?;
        let permissions = permission_bits(&metadata);
        Ok(Self {
            metadata,
            modified,
            permissions,
        })
    }

    pub(crate) fn entry(&self, relative_path: String) -> ArchiveEntry {
        ArchiveEntry {
            relative_path,
            is_directory: self.metadata.is_dir(),
            modified: self.modified,
            size: if self.metadata.is_dir() { 0 } else { self.metadata.len() },
            permissions: self.permissions,
        }
    }
}

#[cfg(unix)]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub(crate) fn permission_bits(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Restore permission bits on an extracted path; failures are logged.
pub(crate) fn restore_permissions(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if mode & 0o7777 == 0 {
            return;
        }
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)) {
            tracing::warn!(path = %path.display(), error = %e, "failed to restore permissions");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

/// Reset an extracted file's modification time; failures are logged.
pub(crate) fn restore_mtime(path: &Path, modified: SystemTime) {
    let mtime = filetime::FileTime::from_system_time(modified);
    if let Err(e) = filetime::set_file_times(path, mtime, mtime) {
        tracing::warn!(path = %path.display(), error = %e, "failed to reset modification time");
    }
}

pub(crate) fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Map a read failure: malformed data is `Corrupted`, the rest goes through the taxonomy.
pub(crate) fn read_error(err: io::Error, archive: &Path) -> FileOpError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            FileOpError::Corrupted(format!("{}: {}", archive.display(), err))
        }
        _ => FileOpError::from_io(err, archive),
    }
}

/// Create the parent directory of an extracted file.
pub(crate) fn ensure_parent(target: &Path) -> Result<(), FileOpError> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).at(parent),
        _ => Ok(()),
    }
}
