//! The resumable batch driver shared by every stage.
//!
//! Persisted per stage: a [`CheckpointState`], the fixed item list, and the
//! accumulated records. On a fresh run the item list is fixed once and
//! written before any item is processed; a resumed run processes exactly
//! `items[processed_count..]` of that stored list. Records are always
//! written before the checkpoint, so the checkpoint never claims work whose
//! output is not durable.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use media_atlas_models::{CheckpointState, MediaRecord};
use media_atlas_state::paths::StatePaths;
use media_atlas_state::{JsonFileStore, MemoryStore, StateStore, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::progress::{ProgressCallback, null_progress};
use crate::{PipelineError, SkipReason};

/// Items processed between two commits.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// The output every stage accumulates.
pub type Records = Vec<MediaRecord>;

/// One pipeline stage, as seen by the [`BatchEngine`].
#[async_trait]
pub trait Stage: Send {
    /// A unit of work. Stored in the item list, so it must round-trip
    /// through JSON.
    type Item: Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static;

    /// Result of processing one item, folded into the records by
    /// [`Stage::apply`].
    type Outcome: Send;

    /// File prefix for this stage's state (`01_index`, ...).
    fn id(&self) -> &'static str;

    /// Human-readable name for prompts and progress bars.
    fn label(&self) -> &'static str;

    /// Builds the item list and initial records for a fresh run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the stage's input is unavailable.
    async fn prepare(&mut self) -> Result<(Vec<Self::Item>, Records), PipelineError>;

    /// Processes one item.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] when the item yields nothing. The run
    /// continues either way.
    async fn process(&mut self, item: &Self::Item) -> Result<Self::Outcome, SkipReason>;

    /// Folds an outcome into the records.
    fn apply(&mut self, records: &mut Records, item: &Self::Item, outcome: Self::Outcome);

    /// Persists stage-owned state. Called at every commit, before the
    /// records are written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the state cannot be written.
    async fn flush(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// The three documents a stage run persists.
pub struct StageStores<I> {
    /// Progress marker.
    pub checkpoint: Box<dyn StateStore<CheckpointState>>,
    /// Item list fixed at the start of a fresh run.
    pub items: Box<dyn StateStore<Vec<I>>>,
    /// Accumulated records.
    pub records: Box<dyn StateStore<Records>>,
}

impl<I> StageStores<I>
where
    I: Serialize + DeserializeOwned + 'static,
{
    /// JSON files under the data directory, named after `stage_id`.
    #[must_use]
    pub fn on_disk(paths: &StatePaths, stage_id: &str) -> Self {
        Self {
            checkpoint: Box::new(JsonFileStore::new(paths.checkpoint(stage_id))),
            items: Box::new(JsonFileStore::new(paths.items(stage_id))),
            records: Box::new(JsonFileStore::new(paths.records(stage_id))),
        }
    }
}

impl<I> StageStores<I>
where
    I: Clone + Send + 'static,
{
    /// Empty in-memory documents.
    #[must_use]
    pub fn in_memory(stage_id: &str) -> Self {
        Self {
            checkpoint: Box::new(MemoryStore::new(&format!("{stage_id}_state"))),
            items: Box::new(MemoryStore::new(&format!("{stage_id}_items"))),
            records: Box::new(MemoryStore::new(&format!("{stage_id}_records"))),
        }
    }
}

impl<I> StageStores<I> {
    /// Removes all three documents, checkpoint first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a document cannot be removed.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.checkpoint.clear()?;
        self.items.clear()?;
        self.records.clear()
    }
}

/// What one [`BatchEngine::run`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum RunOutcome {
    /// The stage was already complete and nothing was touched.
    AlreadyComplete(CheckpointState),
    /// Every remaining item was processed.
    Completed(RunSummary),
}

/// Counters for a run that processed items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Size of the item list.
    pub total: usize,
    /// Items handled by this run.
    pub processed: usize,
    /// Items among those that produced nothing.
    pub skipped: usize,
    /// Position the run started from (0 for a fresh run).
    pub resumed_from: usize,
}

/// Drives a [`Stage`] over its item list with periodic commits.
pub struct BatchEngine<I> {
    stores: StageStores<I>,
    batch_size: usize,
    progress: Arc<dyn ProgressCallback>,
}

impl<I> BatchEngine<I>
where
    I: Debug + Send + Sync + 'static,
{
    /// Creates an engine committing every `batch_size` items (at least 1).
    #[must_use]
    pub fn new(stores: StageStores<I>, batch_size: usize) -> Self {
        Self {
            stores,
            batch_size: batch_size.max(1),
            progress: null_progress(),
        }
    }

    /// Reports per-item progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The stores this engine writes.
    #[must_use]
    pub const fn stores(&self) -> &StageStores<I> {
        &self.stores
    }

    /// Current checkpoint. Missing or inconsistent state reads as fresh.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the checkpoint exists but cannot be read.
    pub fn checkpoint(&self) -> Result<CheckpointState, StoreError> {
        let state = self.stores.checkpoint.load()?.unwrap_or_default();
        if state.is_consistent() {
            Ok(state)
        } else {
            log::warn!(
                "Ignoring inconsistent checkpoint {}/{}",
                state.processed_count,
                state.total_items
            );
            Ok(CheckpointState::default())
        }
    }

    /// Discards all progress so the next run starts fresh.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a state document cannot be removed.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.stores.clear()
    }

    /// Runs the stage to completion, resuming from the stored checkpoint.
    ///
    /// A stage that is already complete is reported as
    /// [`RunOutcome::AlreadyComplete`] without touching any state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the stage cannot prepare its items or
    /// progress cannot be persisted. Per-item failures are skipped.
    pub async fn run<S>(&mut self, stage: &mut S) -> Result<RunOutcome, PipelineError>
    where
        S: Stage<Item = I>,
    {
        let id = stage.id();
        let mut state = self.checkpoint()?;

        if state.is_complete() {
            log::info!(
                "[{id}] Already complete ({}/{})",
                state.processed_count,
                state.total_items
            );
            return Ok(RunOutcome::AlreadyComplete(state));
        }

        let stored = if state.is_fresh() {
            None
        } else {
            self.load_progress(id, state)?
        };

        let (items, mut records) = if let Some(stored) = stored {
            log::info!(
                "[{id}] Resuming at {}/{}",
                state.processed_count,
                state.total_items
            );
            stored
        } else {
            let (items, records) = stage.prepare().await?;
            state = CheckpointState::started(items.len());
            self.stores.items.save(&items)?;
            self.stores.records.save(&records)?;
            self.stores.checkpoint.save(&state)?;
            log::info!("[{id}] Starting run over {} items", items.len());
            (items, records)
        };

        let resumed_from = state.processed_count;
        self.progress.set_message(stage.label().to_string());
        self.progress.set_total(state.total_items as u64);
        self.progress.set_position(resumed_from as u64);

        let mut skipped = 0;
        for item in items.iter().skip(resumed_from) {
            match stage.process(item).await {
                Ok(outcome) => stage.apply(&mut records, item, outcome),
                Err(reason) => {
                    skipped += 1;
                    log::warn!("[{id}] Skipping {item:?}: {reason}");
                }
            }

            state.processed_count += 1;
            self.progress.inc(1);

            if state.processed_count % self.batch_size == 0
                || state.processed_count == state.total_items
            {
                if let Err(e) = self.commit(stage, &records, state).await {
                    log::error!(
                        "[{id}] Failed to persist progress at {}/{}: {e}",
                        state.processed_count,
                        state.total_items
                    );
                    return Err(e);
                }
            }
        }

        let summary = RunSummary {
            total: state.total_items,
            processed: state.processed_count - resumed_from,
            skipped,
            resumed_from,
        };

        self.progress.finish(format!(
            "{}: {} processed, {} skipped",
            stage.label(),
            summary.processed,
            summary.skipped
        ));
        log::info!(
            "[{id}] Done: {} processed ({} skipped) of {}",
            summary.processed,
            summary.skipped,
            summary.total
        );

        Ok(RunOutcome::Completed(summary))
    }

    /// Loads the item list and records of an interrupted run. Anything
    /// missing or out of step with the checkpoint means starting over.
    fn load_progress(
        &self,
        id: &str,
        state: CheckpointState,
    ) -> Result<Option<(Vec<I>, Records)>, StoreError> {
        let Some(items) = self.stores.items.load()? else {
            log::warn!("[{id}] Checkpoint has no item list, starting over");
            return Ok(None);
        };

        if items.len() != state.total_items {
            log::warn!(
                "[{id}] Item list has {} entries but checkpoint expects {}, starting over",
                items.len(),
                state.total_items
            );
            return Ok(None);
        }

        let Some(records) = self.stores.records.load()? else {
            log::warn!("[{id}] Checkpoint has no records, starting over");
            return Ok(None);
        };

        Ok(Some((items, records)))
    }

    async fn commit<S>(
        &mut self,
        stage: &mut S,
        records: &Records,
        state: CheckpointState,
    ) -> Result<(), PipelineError>
    where
        S: Stage<Item = I>,
    {
        stage.flush().await?;
        self.stores.records.save(records)?;
        self.stores.checkpoint.save(&state)?;
        log::info!(
            "[{}] Committed {}/{}",
            stage.id(),
            state.processed_count,
            state.total_items
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Turns `n` into a record named `f<n>`; multiples of 7 plus 3 are
    /// skipped.
    struct NumberStage {
        items: Vec<u32>,
        calls: usize,
    }

    impl NumberStage {
        fn new(count: u32) -> Self {
            Self {
                items: (0..count).collect(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl Stage for NumberStage {
        type Item = u32;
        type Outcome = MediaRecord;

        fn id(&self) -> &'static str {
            "00_numbers"
        }

        fn label(&self) -> &'static str {
            "Numbers"
        }

        async fn prepare(&mut self) -> Result<(Vec<u32>, Records), PipelineError> {
            Ok((self.items.clone(), Vec::new()))
        }

        async fn process(&mut self, item: &u32) -> Result<MediaRecord, SkipReason> {
            self.calls += 1;
            if item % 7 == 3 {
                return Err(SkipReason::NoCoordinates);
            }
            Ok(MediaRecord {
                filename: format!("f{item}"),
                datetime_utc: None,
                latitude: f64::from(*item),
                longitude: 1.0,
                camera_make: None,
                camera_model: None,
                place: None,
            })
        }

        fn apply(&mut self, records: &mut Records, _item: &u32, outcome: MediaRecord) {
            if !records.iter().any(|r| r.filename == outcome.filename) {
                records.push(outcome);
            }
        }
    }

    /// Simulates a process restart: fresh stores holding whatever the old
    /// ones had durably written.
    fn restart(stores: &StageStores<u32>) -> StageStores<u32> {
        fn reopen<T: Clone + Send + 'static>(store: &dyn StateStore<T>) -> Box<dyn StateStore<T>> {
            match store.load().unwrap() {
                Some(value) => Box::new(MemoryStore::with_value("restarted", value)),
                None => Box::new(MemoryStore::new("restarted")),
            }
        }
        StageStores {
            checkpoint: reopen(stores.checkpoint.as_ref()),
            items: reopen(stores.items.as_ref()),
            records: reopen(stores.records.as_ref()),
        }
    }

    fn completed(outcome: RunOutcome) -> RunSummary {
        match outcome {
            RunOutcome::Completed(summary) => summary,
            RunOutcome::AlreadyComplete(state) => panic!("unexpectedly complete: {state:?}"),
        }
    }

    #[tokio::test]
    async fn fresh_run_processes_every_item_and_completes() {
        let mut engine = BatchEngine::new(StageStores::<u32>::in_memory("t"), 50);
        let mut stage = NumberStage::new(120);

        let summary = completed(engine.run(&mut stage).await.unwrap());

        assert_eq!(summary.total, 120);
        assert_eq!(summary.processed, 120);
        assert_eq!(summary.skipped, 17);
        assert_eq!(summary.resumed_from, 0);
        assert_eq!(stage.calls, 120);

        let state = engine.checkpoint().unwrap();
        assert_eq!(state, CheckpointState { processed_count: 120, total_items: 120 });
        assert!(state.is_complete());

        let records = engine.stores().records.load().unwrap().unwrap();
        assert_eq!(records.len(), 103);
    }

    #[tokio::test]
    async fn complete_stage_is_reported_and_left_alone() {
        let mut engine = BatchEngine::new(StageStores::<u32>::in_memory("t"), 10);
        let mut stage = NumberStage::new(25);
        let _ = completed(engine.run(&mut stage).await.unwrap());
        let calls = stage.calls;

        let outcome = engine.run(&mut stage).await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::AlreadyComplete(CheckpointState { processed_count: 25, total_items: 25 })
        );
        assert_eq!(stage.calls, calls);
    }

    #[tokio::test]
    async fn reset_allows_a_full_rerun() {
        let mut engine = BatchEngine::new(StageStores::<u32>::in_memory("t"), 10);
        let mut stage = NumberStage::new(12);
        let _ = completed(engine.run(&mut stage).await.unwrap());

        engine.reset().unwrap();
        assert!(engine.checkpoint().unwrap().is_fresh());
        assert!(engine.stores().items.load().unwrap().is_none());

        let summary = completed(engine.run(&mut stage).await.unwrap());
        assert_eq!(summary.processed, 12);
        assert_eq!(stage.calls, 24);
    }

    #[tokio::test]
    async fn resumed_run_matches_uninterrupted_run() {
        let mut reference = BatchEngine::new(StageStores::<u32>::in_memory("ref"), 50);
        let _ = completed(reference.run(&mut NumberStage::new(120)).await.unwrap());
        let expected = reference.stores().records.load().unwrap();

        // Saves: start, commit at 50, then the commit at 100 fails.
        let mut stores = StageStores::<u32>::in_memory("t");
        stores.checkpoint = Box::new(MemoryStore::failing_after("t_state", 2));
        let mut engine = BatchEngine::new(stores, 50);
        let mut stage = NumberStage::new(120);

        let err = engine.run(&mut stage).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Injected { .. })));
        assert_eq!(
            engine.checkpoint().unwrap(),
            CheckpointState { processed_count: 50, total_items: 120 }
        );

        let mut engine = BatchEngine::new(restart(engine.stores()), 50);
        let mut stage = NumberStage::new(120);
        let summary = completed(engine.run(&mut stage).await.unwrap());

        assert_eq!(summary.resumed_from, 50);
        assert_eq!(summary.processed, 70);
        assert_eq!(stage.calls, 70);
        assert_eq!(engine.stores().records.load().unwrap(), expected);
        assert!(engine.checkpoint().unwrap().is_complete());
    }

    #[tokio::test]
    async fn resume_uses_stored_items_not_a_new_enumeration() {
        let mut stores = StageStores::<u32>::in_memory("t");
        stores.checkpoint = Box::new(MemoryStore::failing_after("t_state", 1));
        let mut engine = BatchEngine::new(stores, 5);
        let _ = engine.run(&mut NumberStage::new(8)).await.unwrap_err();

        let mut engine = BatchEngine::new(restart(engine.stores()), 5);
        // A different item set would be enumerated now; it must be ignored.
        let mut stage = NumberStage::new(30);
        let summary = completed(engine.run(&mut stage).await.unwrap());

        assert_eq!(summary.total, 8);
        assert_eq!(summary.resumed_from, 0);
        assert_eq!(stage.calls, 8);
    }

    #[tokio::test]
    async fn inconsistent_checkpoint_starts_fresh() {
        let mut stores = StageStores::<u32>::in_memory("t");
        stores.checkpoint = Box::new(MemoryStore::with_value(
            "t_state",
            CheckpointState { processed_count: 9, total_items: 3 },
        ));
        let mut engine = BatchEngine::new(stores, 2);
        assert!(engine.checkpoint().unwrap().is_fresh());

        let summary = completed(engine.run(&mut NumberStage::new(4)).await.unwrap());
        assert_eq!(summary.processed, 4);
        let state = engine.checkpoint().unwrap();
        assert!(state.processed_count <= state.total_items);
    }

    #[tokio::test]
    async fn mismatched_item_list_starts_fresh() {
        let mut stores = StageStores::<u32>::in_memory("t");
        stores.checkpoint = Box::new(MemoryStore::with_value(
            "t_state",
            CheckpointState { processed_count: 2, total_items: 10 },
        ));
        stores.items = Box::new(MemoryStore::with_value("t_items", vec![1_u32, 2, 3]));
        stores.records = Box::new(MemoryStore::with_value("t_records", Records::new()));
        let mut engine = BatchEngine::new(stores, 50);

        let mut stage = NumberStage::new(5);
        let summary = completed(engine.run(&mut stage).await.unwrap());

        assert_eq!(summary.total, 5);
        assert_eq!(summary.resumed_from, 0);
        assert_eq!(stage.calls, 5);
    }

    #[tokio::test]
    async fn empty_item_list_leaves_checkpoint_fresh() {
        let mut engine = BatchEngine::new(StageStores::<u32>::in_memory("t"), 50);
        let summary = completed(engine.run(&mut NumberStage::new(0)).await.unwrap());

        assert_eq!(summary, RunSummary::default());
        assert!(engine.checkpoint().unwrap().is_fresh());
        assert_eq!(engine.stores().records.load().unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn second_run_leaves_files_byte_identical() {
        let dir = std::env::temp_dir().join("media_atlas_engine_idempotent");
        let _ = std::fs::remove_dir_all(&dir);
        let paths = StatePaths::new(&dir);

        let mut engine = BatchEngine::new(StageStores::<u32>::on_disk(&paths, "00_numbers"), 7);
        let _ = completed(engine.run(&mut NumberStage::new(30)).await.unwrap());

        let read_all = || {
            [
                paths.checkpoint("00_numbers"),
                paths.items("00_numbers"),
                paths.records("00_numbers"),
            ]
            .map(|p| std::fs::read(p).unwrap())
        };
        let before = read_all();

        let mut engine = BatchEngine::new(StageStores::<u32>::on_disk(&paths, "00_numbers"), 7);
        let mut stage = NumberStage::new(30);
        let outcome = engine.run(&mut stage).await.unwrap();

        assert!(matches!(outcome, RunOutcome::AlreadyComplete(_)));
        assert_eq!(stage.calls, 0);
        assert_eq!(read_all(), before);

        let checkpoint = String::from_utf8(before[0].clone()).unwrap();
        assert!(checkpoint.contains("\"processedCount\": 30"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
