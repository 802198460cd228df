#![allow(clippy::module_name_repetitions)]
//! Canonical file names inside the pipeline data directory.
//!
//! Each stage is identified by a short id (`01_index`, `02_locate`,
//! `03_augment`) that prefixes its checkpoint, item list, and record files.

use std::path::{Path, PathBuf};

/// Resolves every state file relative to one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    data_dir: PathBuf,
}

impl StatePaths {
    /// Creates paths rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The data directory itself.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Checkpoint file for a stage (`<id>_state.json`).
    #[must_use]
    pub fn checkpoint(&self, stage_id: &str) -> PathBuf {
        self.data_dir.join(format!("{stage_id}_state.json"))
    }

    /// Fixed item list for a stage (`<id>_items.json`).
    #[must_use]
    pub fn items(&self, stage_id: &str) -> PathBuf {
        self.data_dir.join(format!("{stage_id}_items.json"))
    }

    /// Accumulated records for a stage (`<id>_records.json`).
    #[must_use]
    pub fn records(&self, stage_id: &str) -> PathBuf {
        self.data_dir.join(format!("{stage_id}_records.json"))
    }

    /// The remote geocode cache.
    #[must_use]
    pub fn geocode_cache(&self) -> PathBuf {
        self.data_dir.join("geo_cache.json")
    }

    /// Human-readable normalizer output.
    #[must_use]
    pub fn normalized(&self) -> PathBuf {
        self.data_dir.join("04_normalized.json")
    }

    /// The final binary artifact.
    #[must_use]
    pub fn artifact(&self) -> PathBuf {
        self.data_dir.join("05_media_atlas.msgpack")
    }

    /// Default location of the GeoNames city dump.
    #[must_use]
    pub fn default_gazetteer(&self) -> PathBuf {
        self.data_dir.join("cities15000.txt")
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_files_share_prefix() {
        let paths = StatePaths::new("/data");
        assert_eq!(
            paths.checkpoint("02_locate"),
            PathBuf::from("/data/02_locate_state.json")
        );
        assert_eq!(
            paths.items("02_locate"),
            PathBuf::from("/data/02_locate_items.json")
        );
        assert_eq!(
            paths.records("02_locate"),
            PathBuf::from("/data/02_locate_records.json")
        );
    }

    #[test]
    fn relative_file_has_empty_parent() {
        // `Path::new("state.json").parent()` is `Some("")`.
        ensure_dir(Path::new("")).unwrap();
    }
}
