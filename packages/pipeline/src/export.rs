//! Writes the normalized dataset.
//!
//! Two forms are produced: pretty JSON for inspection and a `MessagePack`
//! artifact (named fields, via `rmp-serde`) for downstream consumers. Both
//! have the shape `{ locations: [...], items: [...] }`.

use std::path::{Path, PathBuf};

use media_atlas_models::NormalizedDataset;
use media_atlas_state::paths::ensure_dir;
use media_atlas_state::{JsonFileStore, StateStore};

use crate::PipelineError;

/// Writes the human-readable JSON form.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if the file cannot be written.
pub fn write_normalized(path: &Path, dataset: &NormalizedDataset) -> Result<(), PipelineError> {
    JsonFileStore::<NormalizedDataset>::new(path).save(dataset)?;
    Ok(())
}

/// Writes the binary artifact and returns its size in bytes.
///
/// # Errors
///
/// Returns [`PipelineError`] if encoding or writing fails.
pub fn write_artifact(path: &Path, dataset: &NormalizedDataset) -> Result<usize, PipelineError> {
    let bytes = rmp_serde::to_vec_named(dataset)?;

    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(|source| io_error(path, source))?;
    }

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &bytes).map_err(|source| io_error(&tmp, source))?;
    std::fs::rename(&tmp, path).map_err(|source| io_error(path, source))?;

    log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes.len())
}

/// Reads a binary artifact back.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be read or decoded.
pub fn read_artifact(path: &Path) -> Result<NormalizedDataset, PipelineError> {
    let bytes = std::fs::read(path).map_err(|source| io_error(path, source))?;
    Ok(rmp_serde::from_slice(&bytes)?)
}

fn io_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}
