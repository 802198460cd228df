#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The media atlas pipeline.
//!
//! A single generic [`engine::BatchEngine`] drives every stage: it fixes
//! and persists the stage's item list, processes items strictly in order,
//! and commits records before the checkpoint every `batch_size` items and
//! on the last one. Stages only describe how one item is turned into a
//! change to the accumulated [`MediaRecord`](media_atlas_models::MediaRecord)
//! list:
//!
//! 1. [`stages::index`] probes media files for capture metadata.
//! 2. [`stages::locate`] attaches the nearest gazetteer city.
//! 3. [`stages::augment`] adds the state/province via the cached geocoder.
//!
//! [`normalize`] then deduplicates places and [`export`] writes the final
//! artifact.

pub mod config;
pub mod engine;
pub mod export;
pub mod normalize;
pub mod progress;
pub mod runner;
pub mod stages;

use std::path::PathBuf;

use media_atlas_extract::ExtractError;
use media_atlas_gazetteer::GazetteerError;
use media_atlas_geocoder::GeocodeError;
use media_atlas_state::StoreError;
use thiserror::Error;

/// Errors that abort a pipeline step.
///
/// Per-item problems never surface here; they are [`SkipReason`]s.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Progress or output could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The media library could not be enumerated.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The gazetteer could not be loaded.
    #[error("Gazetteer error: {0}")]
    Gazetteer(#[from] GazetteerError),

    /// The geocoder client could not be set up.
    #[error("Geocoder error: {0}")]
    Geocode(#[from] GeocodeError),

    /// The binary artifact could not be encoded.
    #[error("Artifact encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The binary artifact could not be decoded.
    #[error("Artifact decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Filesystem failure outside the state stores.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A step was started before the step it reads from produced output.
    #[error("No records from stage '{stage}'; run it first")]
    MissingInput {
        /// Id of the stage whose records are missing.
        stage: &'static str,
    },

    /// The stage this step reads from was interrupted and must be
    /// finished first.
    #[error("Stage '{stage}' is incomplete ({processed}/{total}); finish it first")]
    IncompleteInput {
        /// Id of the unfinished stage.
        stage: &'static str,
        /// Items it has handled.
        processed: usize,
        /// Items in its run.
        total: usize,
    },

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },
}

/// Why a single item produced no output. The item still counts as
/// processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// The file extension is neither a known image nor video type.
    #[error("unsupported file extension")]
    UnsupportedExtension,

    /// The probe returned no metadata at all.
    #[error("no metadata")]
    NoMetadata,

    /// The file has no usable latitude/longitude pair.
    #[error("no coordinates")]
    NoCoordinates,

    /// No place could be determined.
    #[error("unresolved")]
    Unresolved,

    /// The probe failed.
    #[error("failed: {0}")]
    Failed(String),
}
