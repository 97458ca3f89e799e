//! Type definitions shared by the copy engine and the archive codecs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Default buffer size for file copies, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// How to handle a destination file that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Copy only when the source is newer than the existing destination
    #[default]
    LatestOnly,

    /// Replace every existing destination file
    OverwriteAll,
}

/// One user-confirmed copy request.
#[derive(Debug, Clone)]
pub struct CopyTask {
    /// Files and directories to copy, processed in order
    pub sources: Vec<PathBuf>,

    /// Directory the sources are copied into
    pub destination: PathBuf,

    /// Collision policy for existing files
    pub overwrite: OverwritePolicy,

    /// Read/write buffer size in bytes (0 selects the default)
    pub buffer_size: usize,
}

impl CopyTask {
    pub fn new(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            destination: destination.into(),
            overwrite: OverwritePolicy::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Buffer size actually used for the copy loop.
    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        }
    }
}

/// Statistics about a completed copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyStats {
    /// Files whose bytes were written to the destination
    pub files_copied: u64,

    /// Files left alone because the destination was already current
    pub files_up_to_date: u64,

    /// Files abandoned by a Skip decision, plus uncopyable places
    pub files_skipped: u64,

    /// Directories created or refreshed
    pub directories: u64,

    /// Total bytes written
    pub bytes_copied: u64,

    /// Wall-clock duration (in seconds when serialized)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Individual entry written to or read from an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path inside the archive, always `/`-separated
    pub relative_path: String,

    /// Whether this entry is a directory
    pub is_directory: bool,

    /// Modification time carried by the entry
    pub modified: SystemTime,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Permission bits (POSIX mode)
    pub permissions: u32,
}

/// Result of a completed compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressStats {
    /// Final archive path, after extension auto-naming
    pub archive: PathBuf,

    /// Entries written, in archive order
    pub entries: Vec<ArchiveEntry>,

    /// Total bytes read from source files
    pub bytes_read: u64,

    /// Wall-clock duration (in seconds when serialized)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Statistics about a completed extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of regular files written
    pub files_extracted: u64,

    /// Number of directory entries materialized
    pub directories_created: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Entries refused because their names were unsafe
    pub entries_skipped: u64,

    /// Wall-clock duration (in seconds when serialized)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
