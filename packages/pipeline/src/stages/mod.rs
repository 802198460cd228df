//! The three enrichment stages.
//!
//! Stage 1 builds records from media files. Stages 2 and 3 start from a
//! copy of the previous stage's records (their [`SeedSource`]) and update
//! records in place by index, so each stage keeps its own checkpoint and
//! can be rerun without touching the stage before it.

pub mod augment;
pub mod index;
pub mod locate;

use media_atlas_models::CheckpointState;
use media_atlas_state::paths::StatePaths;
use media_atlas_state::{JsonFileStore, StateStore};

use crate::PipelineError;
use crate::engine::Records;

/// Id of stage 1; also the prefix of its state files.
pub const INDEX_STAGE_ID: &str = "01_index";
/// Id of stage 2.
pub const LOCATE_STAGE_ID: &str = "02_locate";
/// Id of stage 3.
pub const AUGMENT_STAGE_ID: &str = "03_augment";

/// Shown on the stage 1 progress bar and reset prompt.
pub const INDEX_LABEL: &str = "Index media";
/// Shown on the stage 2 progress bar and reset prompt.
pub const LOCATE_LABEL: &str = "Locate nearest city";
/// Shown on the stage 3 progress bar and reset prompt.
pub const AUGMENT_LABEL: &str = "Add state/province";

/// Every stage as `(id, label)`, in pipeline order.
pub const STAGES: [(&str, &str); 3] = [
    (INDEX_STAGE_ID, INDEX_LABEL),
    (LOCATE_STAGE_ID, LOCATE_LABEL),
    (AUGMENT_STAGE_ID, AUGMENT_LABEL),
];

/// The records of an earlier stage, read when a fresh run starts.
///
/// With a checkpoint attached, the records are only handed out once that
/// stage has finished.
pub struct SeedSource {
    stage: &'static str,
    store: Box<dyn StateStore<Records>>,
    checkpoint: Option<Box<dyn StateStore<CheckpointState>>>,
}

impl SeedSource {
    /// Reads from any store without checking the stage's progress; `stage`
    /// names it in errors.
    #[must_use]
    pub fn new(stage: &'static str, store: Box<dyn StateStore<Records>>) -> Self {
        Self {
            stage,
            store,
            checkpoint: None,
        }
    }

    /// Refuses the records while `checkpoint` shows an unfinished run.
    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: Box<dyn StateStore<CheckpointState>>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// The records file of `stage` in the data directory, guarded by its
    /// checkpoint.
    #[must_use]
    pub fn on_disk(paths: &StatePaths, stage: &'static str) -> Self {
        Self::new(stage, Box::new(JsonFileStore::new(paths.records(stage))))
            .with_checkpoint(Box::new(JsonFileStore::new(paths.checkpoint(stage))))
    }

    /// Loads the records.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IncompleteInput`] if the stage was
    /// interrupted, [`PipelineError::MissingInput`] if it has not written
    /// any records, or [`PipelineError::Store`] if they cannot be read.
    pub fn load(&self) -> Result<Records, PipelineError> {
        if let Some(checkpoint) = &self.checkpoint {
            let state = checkpoint.load()?.unwrap_or_default();
            if !state.is_complete() && !state.is_fresh() {
                return Err(PipelineError::IncompleteInput {
                    stage: self.stage,
                    processed: state.processed_count,
                    total: state.total_items,
                });
            }
        }

        self.store
            .load()?
            .ok_or(PipelineError::MissingInput { stage: self.stage })
    }
}
