//! Tar container support, shared with the gzip codec.

use super::{ensure_parent, read_error, restore_mtime, restore_permissions, unix_seconds, SourceInfo};
use crate::error::{FileOpError, IoResultExt};
use crate::safety::{archive_name, validate_entry_path};
use crate::types::{ArchiveEntry, ExtractStats};
use crate::ProgressPulse;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tar::{Archive, Builder, EntryType, Header};

pub(super) fn write_tar<W: Write>(
    writer: W,
    parent: &Path,
    files: &[PathBuf],
    progress: &ProgressPulse<'_>,
) -> Result<(Vec<ArchiveEntry>, W), FileOpError> {
    let mut builder = Builder::new(writer);
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        progress(file.as_path());

        let info = SourceInfo::read(file)?;
        let is_dir = info.metadata.is_dir();
        let name = archive_name(parent, file, is_dir)?;
        if name.is_empty() {
            continue;
        }

        let mut header = Header::new_gnu();
        header.set_mode(info.permissions);
        header.set_mtime(unix_seconds(info.modified));

        if is_dir {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder
                .append_data(&mut header, name.trim_end_matches('/'), io::empty())
                .at(file)?;
        } else {
            let size = info.metadata.len();
            header.set_entry_type(EntryType::Regular);
            header.set_size(size);
            let input = File::open(file).at(file)?;
            builder.append_data(&mut header, &name, input.take(size)).at(file)?;
        }

        tracing::debug!(name = %name, "tar: added");
        entries.push(info.entry(name));
    }

    let writer = builder.into_inner().at(parent)?;
    Ok((entries, writer))
}

/// Read a tar stream into `destination`. `label` names the stream in errors.
pub(super) fn read_tar<R: Read>(
    reader: R,
    label: &Path,
    destination: &Path,
    progress: &ProgressPulse<'_>,
    stats: &mut ExtractStats,
) -> Result<(), FileOpError> {
    let mut archive = Archive::new(reader);

    for entry in archive.entries().map_err(|e| read_error(e, label))? {
        let mut entry = entry.map_err(|e| read_error(e, label))?;
        let name = entry
            .path()
            .map_err(|e| read_error(e, label))?
            .into_owned();

        let relative = match validate_entry_path(&name) {
            Ok(relative) => relative,
            Err(e) => {
                tracing::warn!(entry = %name.display(), error = %e, "tar: refusing unsafe entry");
                stats.entries_skipped += 1;
                continue;
            }
        };
        let target = destination.join(&relative);
        progress(target.as_path());

        let header = entry.header();
        let entry_type = header.entry_type();
        let mtime = header.mtime().ok();
        let mode = header.mode().ok();

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target).at(&target)?;
                stats.directories_created += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                ensure_parent(&target)?;
                let mut output = File::create(&target).at(&target)?;
                let written = io::copy(&mut entry, &mut output).map_err(|e| read_error(e, label))?;
                output.flush().at(&target)?;
                drop(output);

                if let Some(mtime) = mtime {
                    restore_mtime(&target, UNIX_EPOCH + Duration::from_secs(mtime));
                }
                if let Some(mode) = mode {
                    restore_permissions(&target, mode);
                }

                stats.files_extracted += 1;
                stats.bytes_written += written;
            }
            other => {
                tracing::debug!(entry = %name.display(), kind = ?other, "tar: ignoring entry type");
            }
        }
    }

    Ok(())
}
