//! Zip container support.

use super::{ensure_parent, read_error, restore_mtime, restore_permissions, SourceInfo};
use crate::error::{FileOpError, IoResultExt};
use crate::safety::{archive_name, validate_entry_name};
use crate::types::{ArchiveEntry, ExtractStats};
use crate::ProgressPulse;
use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use std::fs::{self, File};
use std::io::{self, BufReader, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub(super) fn write_zip<W: Write + Seek>(
    writer: W,
    parent: &Path,
    files: &[PathBuf],
    level: u32,
    progress: &ProgressPulse<'_>,
) -> Result<(Vec<ArchiveEntry>, W), FileOpError> {
    let mut zip = ZipWriter::new(writer);
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        progress(file.as_path());

        let info = SourceInfo::read(file)?;
        let is_dir = info.metadata.is_dir();
        let name = archive_name(parent, file, is_dir)?;
        if name.is_empty() {
            continue;
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(i64::from(level)))
            .last_modified_time(to_zip_datetime(info.modified))
            .unix_permissions(info.permissions);

        if is_dir {
            zip.add_directory(name.as_str(), options)
                .map_err(|e| zip_error(e, file))?;
        } else {
            zip.start_file(name.as_str(), options)
                .map_err(|e| zip_error(e, file))?;
            let mut input = File::open(file).at(file)?;
            io::copy(&mut input, &mut zip).at(file)?;
        }

        tracing::debug!(name = %name, "zip: added");
        entries.push(info.entry(name));
    }

    let writer = zip.finish().map_err(|e| zip_error(e, parent))?;
    Ok((entries, writer))
}

pub(super) fn read_zip(
    archive_path: &Path,
    destination: &Path,
    progress: &ProgressPulse<'_>,
    stats: &mut ExtractStats,
) -> Result<(), FileOpError> {
    let file = File::open(archive_path).at(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error(e, archive_path))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_error(e, archive_path))?;
        let name = entry.name().to_string();

        let relative = match validate_entry_name(&name) {
            Ok(relative) => relative,
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "zip: refusing unsafe entry");
                stats.entries_skipped += 1;
                continue;
            }
        };
        let target = destination.join(&relative);
        progress(target.as_path());

        if entry.is_dir() {
            fs::create_dir_all(&target).at(&target)?;
            stats.directories_created += 1;
            continue;
        }

        ensure_parent(&target)?;
        let mut output = File::create(&target).at(&target)?;
        let written = io::copy(&mut entry, &mut output).map_err(|e| read_error(e, archive_path))?;
        output.flush().at(&target)?;
        drop(output);

        if let Some(modified) = entry.last_modified().and_then(from_zip_datetime) {
            restore_mtime(&target, modified);
        }
        if let Some(mode) = entry.unix_mode() {
            restore_permissions(&target, mode);
        }

        stats.files_extracted += 1;
        stats.bytes_written += written;
    }

    Ok(())
}

/// Zip stores wall-clock time, so the timestamp is localized first.
fn to_zip_datetime(time: SystemTime) -> zip::DateTime {
    let local: chrono::DateTime<Local> = time.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).unwrap_or(1980),
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

fn from_zip_datetime(value: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(value.year()),
        u32::from(value.month()),
        u32::from(value.day()),
    )?
    .and_hms_opt(
        u32::from(value.hour()),
        u32::from(value.minute()),
        u32::from(value.second()),
    )?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(local.into())
}

fn zip_error(err: ZipError, path: &Path) -> FileOpError {
    match err {
        ZipError::Io(e) => read_error(e, path),
        ZipError::UnsupportedArchive(msg) => FileOpError::UnsupportedFormat(msg.to_string()),
        other => FileOpError::Corrupted(format!("{}: {}", path.display(), other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zip_datetime_roundtrip_local() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let back = from_zip_datetime(to_zip_datetime(base)).unwrap();
        let delta = back
            .duration_since(base)
            .unwrap_or_else(|e| e.duration());
        assert!(delta <= Duration::from_secs(2));
    }

    #[test]
    fn test_pre_1980_clamps() {
        let ancient = SystemTime::UNIX_EPOCH;
        let dt = to_zip_datetime(ancient);
        assert_eq!(dt.year(), 1980);
    }
}
