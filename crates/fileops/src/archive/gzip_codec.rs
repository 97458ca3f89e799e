//! Gzip support: a single compressed file, or a tar stream inside gzip.

use super::tar_codec::{read_tar, write_tar};
use super::{ensure_parent, read_error, restore_mtime, SourceInfo};
use crate::error::{FileOpError, IoResultExt};
use crate::safety::{absolute_path, validate_entry_name};
use crate::types::{ArchiveEntry, ExtractStats};
use crate::ProgressPulse;
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

/// Operating system code stored in the gzip header:
/// 0 on Windows, 3 on POSIX-like systems, 11 otherwise.
pub fn host_os_code() -> u8 {
    if cfg!(windows) {
        0
    } else if cfg!(unix) {
        3
    } else {
        11
    }
}

/// Whether a gzip payload is a tar stream.
///
/// True when the archive is named `.tgz`, when the header carries no file
/// name, or when the embedded name ends in `.tar`.
pub fn is_tar_payload(archive: &Path, embedded_name: Option<&str>) -> bool {
    if has_extension(archive, "tgz") {
        return true;
    }
    match embedded_name {
        None => true,
        Some(name) if name.is_empty() => true,
        Some(name) => has_extension(Path::new(name), "tar"),
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

pub(super) fn write_gzip<W: Write>(
    writer: W,
    archive_path: &Path,
    parent: &Path,
    files: &[PathBuf],
    level: u32,
    progress: &ProgressPulse<'_>,
) -> Result<(Vec<ArchiveEntry>, W), FileOpError> {
    let comment = archive_path.to_string_lossy().replace('\\', "/");
    let builder = GzBuilder::new()
        .comment(comment)
        .operating_system(host_os_code());

    if let [single] = files {
        let info = SourceInfo::read(single)?;
        if !info.metadata.is_dir() {
            return write_single(writer, builder, single, info, level, progress);
        }
    }

    let parent_dir = absolute_path(parent).at(parent)?;
    let tar_name = format!(
        "{}.tar",
        parent_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string())
    );
    let encoder = builder.filename(tar_name).write(writer, Compression::new(level));
    let (entries, encoder) = write_tar(encoder, parent, files, progress)?;
    let writer = encoder.finish().at(archive_path)?;
    Ok((entries, writer))
}

fn write_single<W: Write>(
    writer: W,
    builder: GzBuilder,
    file: &Path,
    info: SourceInfo,
    level: u32,
    progress: &ProgressPulse<'_>,
) -> Result<(Vec<ArchiveEntry>, W), FileOpError> {
    progress(file);

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mtime = u32::try_from(super::unix_seconds(info.modified)).unwrap_or(0);

    let mut encoder = builder
        .filename(name.clone())
        .mtime(mtime)
        .write(writer, Compression::new(level));
    let mut input = File::open(file).at(file)?;
    io::copy(&mut input, &mut encoder).at(file)?;
    let writer = encoder.finish().at(file)?;

    tracing::debug!(name = %name, "gzip: compressed single file");
    Ok((vec![info.entry(name)], writer))
}

pub(super) fn read_gzip(
    archive_path: &Path,
    destination: &Path,
    progress: &ProgressPulse<'_>,
    stats: &mut ExtractStats,
) -> Result<(), FileOpError> {
    let file = File::open(archive_path).at(archive_path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));

    let header = decoder.header().ok_or_else(|| {
        FileOpError::Corrupted(format!("{}: not a gzip stream", archive_path.display()))
    })?;
    let embedded_name = header
        .filename()
        .map(|raw| String::from_utf8_lossy(raw).into_owned());
    let mtime = header.mtime();

    if is_tar_payload(archive_path, embedded_name.as_deref()) {
        tracing::debug!(archive = %archive_path.display(), "gzip: extracting tar payload");
        return read_tar(decoder, archive_path, destination, progress, stats);
    }

    // Checked by is_tar_payload: a raw payload always has a name.
    let name = embedded_name.unwrap_or_default();
    let relative = validate_entry_name(&name)?;
    let target = destination.join(&relative);
    progress(target.as_path());

    ensure_parent(&target)?;
    let mut output = File::create(&target).at(&target)?;
    let written = io::copy(&mut decoder, &mut output).map_err(|e| read_error(e, archive_path))?;
    output.flush().at(&target)?;
    drop(output);

    if mtime != 0 {
        restore_mtime(&target, UNIX_EPOCH + Duration::from_secs(u64::from(mtime)));
    }

    stats.files_extracted += 1;
    stats.bytes_written += written;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tar_payload() {
        assert!(is_tar_payload(Path::new("a.tgz"), Some("notes.txt")));
        assert!(is_tar_payload(Path::new("a.TGZ"), None));
        assert!(is_tar_payload(Path::new("a.gz"), None));
        assert!(is_tar_payload(Path::new("a.gz"), Some("")));
        assert!(is_tar_payload(Path::new("a.gz"), Some("photos.tar")));
        assert!(is_tar_payload(Path::new("blob"), Some("photos.TAR")));
        assert!(!is_tar_payload(Path::new("a.gz"), Some("notes.txt")));
        assert!(!is_tar_payload(Path::new("a.gzip"), Some("photos.tar.bak")));
    }

    #[test]
    fn test_host_os_code() {
        let code = host_os_code();
        if cfg!(windows) {
            assert_eq!(code, 0);
        } else if cfg!(unix) {
            assert_eq!(code, 3);
        } else {
            assert_eq!(code, 11);
        }
    }
}
