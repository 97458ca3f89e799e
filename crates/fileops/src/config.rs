//! Engine configuration passed explicitly into every invocation.

use crate::error::{FileOpError, IoResultExt};
use crate::types::{OverwritePolicy, DEFAULT_BUFFER_SIZE};
use crate::walk::DEFAULT_TREE_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings shared by copy, compress, extract and find.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Copy buffer size in bytes (0 selects the default)
    pub buffer_size: usize,

    /// Default overwrite policy for copies
    pub overwrite: OverwritePolicy,

    /// Maximum entries a directory enumeration may produce
    pub max_tree_entries: usize,

    /// Base directory for auto-named extraction targets (system temp dir if unset)
    pub extract_root: Option<PathBuf>,

    /// Deflate/gzip compression level, 0-9
    pub compression_level: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            overwrite: OverwritePolicy::LatestOnly,
            max_tree_entries: DEFAULT_TREE_LIMIT,
            extract_root: None,
            compression_level: 6,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, FileOpError> {
        let text = std::fs::read_to_string(path).at(path)?;
        let config: EngineConfig = serde_json::from_str(&text)
            .map_err(|e| FileOpError::Corrupted(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config.normalized())
    }

    /// Clamp out-of-range values.
    pub fn normalized(mut self) -> Self {
        if self.buffer_size == 0 {
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        }
        self.compression_level = self.compression_level.min(9);
        self
    }

    /// Directory under which archives are extracted when no target is given.
    pub fn extract_root(&self) -> PathBuf {
        self.extract_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
