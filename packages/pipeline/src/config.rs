//! Pipeline settings resolved from the environment.
//!
//! Command-line flags override these in the binary.

use std::path::PathBuf;

use media_atlas_state::paths::StatePaths;

use crate::engine::DEFAULT_BATCH_SIZE;

/// Directory holding every state file and output.
pub const DATA_DIR_ENV: &str = "MEDIA_ATLAS_DATA_DIR";

/// Root of the media library to index.
pub const LIBRARY_ENV: &str = "MEDIA_ATLAS_LIBRARY";

/// GeoNames city dump used by the locate stage.
pub const GAZETTEER_ENV: &str = "MEDIA_ATLAS_GAZETTEER";

/// Data directory used when [`DATA_DIR_ENV`] is unset.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Settings shared by every pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Where state files and outputs are written.
    pub data_dir: PathBuf,
    /// Required only by the index stage.
    pub library: Option<PathBuf>,
    /// Falls back to `cities15000.txt` in the data directory.
    pub gazetteer: Option<PathBuf>,
    /// Items between two checkpoint commits.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            library: None,
            gazetteer: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `MEDIA_ATLAS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        };

        let defaults = Self::default();
        Self {
            data_dir: var(DATA_DIR_ENV).unwrap_or(defaults.data_dir),
            library: var(LIBRARY_ENV),
            gazetteer: var(GAZETTEER_ENV),
            batch_size: defaults.batch_size,
        }
    }

    /// State file locations under the data directory.
    #[must_use]
    pub fn paths(&self) -> StatePaths {
        StatePaths::new(&self.data_dir)
    }

    /// The gazetteer to load.
    #[must_use]
    pub fn gazetteer_path(&self) -> PathBuf {
        self.gazetteer
            .clone()
            .unwrap_or_else(|| self.paths().default_gazetteer())
    }
}
