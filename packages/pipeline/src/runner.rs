//! Pipeline steps wired to their on-disk state.
//!
//! Each `run_*` function builds one stage with its collaborators, drives
//! it through a [`BatchEngine`], and resolves the "already complete"
//! case through a [`ResetDecider`].

use std::sync::Arc;

use media_atlas_extract::ToolExtractor;
use media_atlas_gazetteer::Gazetteer;
use media_atlas_geocoder::nominatim::NominatimClient;
use media_atlas_geocoder::resolve::StateResolver;
use media_atlas_geocoder::service_registry;
use media_atlas_models::{CheckpointState, NormalizedDataset};
use media_atlas_state::geocode_cache::{CacheEntries, GeocodeCache};
use media_atlas_state::paths::StatePaths;
use media_atlas_state::{JsonFileStore, StateStore};

use crate::PipelineError;
use crate::config::{LIBRARY_ENV, PipelineConfig};
use crate::engine::{BatchEngine, Records, RunOutcome, RunSummary, Stage, StageStores};
use crate::export::{write_artifact, write_normalized};
use crate::normalize::normalize;
use crate::progress::ProgressCallback;
use crate::stages::augment::AugmentStage;
use crate::stages::index::IndexStage;
use crate::stages::locate::LocateStage;
use crate::stages::{AUGMENT_STAGE_ID, INDEX_STAGE_ID, LOCATE_STAGE_ID, STAGES, SeedSource};

/// Geocoding service used by the augment stage.
pub const GEOCODING_SERVICE_ID: &str = "nominatim";

/// Decides whether a stage that is already complete should be discarded
/// and rerun.
pub trait ResetDecider: Send + Sync {
    /// Returns `true` to reset the stage.
    fn confirm_reset(&self, stage_label: &str, state: &CheckpointState) -> bool;
}

/// Always gives the same answer (`--yes` / `--no-reset`).
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl ResetDecider for FixedAnswer {
    fn confirm_reset(&self, _stage_label: &str, _state: &CheckpointState) -> bool {
        self.0
    }
}

/// What happened to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageReport {
    /// Items were processed.
    Ran(RunSummary),
    /// The stage was complete and left as it was.
    Kept(CheckpointState),
}

/// Runs `stage`, asking `decider` what to do if it is already complete.
///
/// # Errors
///
/// Returns [`PipelineError`] if the stage fails or state cannot be reset.
pub async fn drive<S: Stage>(
    stage: &mut S,
    engine: &mut BatchEngine<S::Item>,
    decider: &dyn ResetDecider,
) -> Result<StageReport, PipelineError> {
    let state = match engine.run(stage).await? {
        RunOutcome::Completed(summary) => return Ok(StageReport::Ran(summary)),
        RunOutcome::AlreadyComplete(state) => state,
    };

    if !decider.confirm_reset(stage.label(), &state) {
        log::info!("[{}] Keeping completed results", stage.id());
        return Ok(StageReport::Kept(state));
    }

    log::info!("[{}] Resetting and starting over", stage.id());
    engine.reset()?;
    match engine.run(stage).await? {
        RunOutcome::Completed(summary) => Ok(StageReport::Ran(summary)),
        RunOutcome::AlreadyComplete(state) => Ok(StageReport::Kept(state)),
    }
}

/// Stage 1 over the configured media library.
///
/// # Errors
///
/// Returns [`PipelineError`] if no library is configured or the stage
/// fails.
pub async fn run_index(
    config: &PipelineConfig,
    progress: Arc<dyn ProgressCallback>,
    decider: &dyn ResetDecider,
) -> Result<StageReport, PipelineError> {
    let library = config
        .library
        .as_deref()
        .ok_or_else(|| PipelineError::Config {
            message: format!("no media library given (use --library or set {LIBRARY_ENV})"),
        })?;

    let mut stage = IndexStage::new(library, Box::new(ToolExtractor::default()))?;
    log::info!("Indexing {}", stage.library_root().display());

    let mut engine = engine_for(config, INDEX_STAGE_ID, progress);
    drive(&mut stage, &mut engine, decider).await
}

/// Stage 2 against the configured gazetteer.
///
/// # Errors
///
/// Returns [`PipelineError::IncompleteInput`] if stage 1 was interrupted,
/// or another [`PipelineError`] if the gazetteer cannot be loaded or the
/// stage fails.
pub async fn run_locate(
    config: &PipelineConfig,
    progress: Arc<dyn ProgressCallback>,
    decider: &dyn ResetDecider,
) -> Result<StageReport, PipelineError> {
    let gazetteer = Gazetteer::load(&config.gazetteer_path())?;
    if gazetteer.is_empty() {
        log::warn!("Gazetteer is empty; every record will stay unresolved");
    }

    let seed = SeedSource::on_disk(&config.paths(), INDEX_STAGE_ID);
    let mut stage = LocateStage::new(gazetteer, seed);
    let mut engine = engine_for(config, LOCATE_STAGE_ID, progress);
    drive(&mut stage, &mut engine, decider).await
}

/// Stage 3 through the geocode cache and Nominatim.
///
/// # Errors
///
/// Returns [`PipelineError::IncompleteInput`] if stage 2 was interrupted,
/// or another [`PipelineError`] if the geocoder or cache cannot be set up
/// or the stage fails.
pub async fn run_augment(
    config: &PipelineConfig,
    progress: Arc<dyn ProgressCallback>,
    decider: &dyn ResetDecider,
) -> Result<StageReport, PipelineError> {
    let paths = config.paths();

    let service =
        service_registry::service(GEOCODING_SERVICE_ID)?.ok_or_else(|| PipelineError::Config {
            message: format!("geocoding service '{GEOCODING_SERVICE_ID}' is not enabled"),
        })?;
    let client = NominatimClient::from_service(&service)?;
    log::info!("Geocoding via {}", client.base_url());

    let cache = GeocodeCache::open(Box::new(JsonFileStore::<CacheEntries>::new(
        paths.geocode_cache(),
    )))?;
    log::info!("Geocode cache holds {} entries", cache.len());

    let resolver = StateResolver::new(Box::new(client), cache);
    let seed = SeedSource::on_disk(&paths, LOCATE_STAGE_ID);
    let mut stage = AugmentStage::new(resolver, seed);
    let mut engine = engine_for(config, AUGMENT_STAGE_ID, progress);

    let report = drive(&mut stage, &mut engine, decider).await?;

    let stats = stage.stats();
    log::info!(
        "Geocoding: {} cache hits, {} resolved, {} unmatched, {} failed",
        stats.cache_hits,
        stats.resolved,
        stats.unmatched,
        stats.failed
    );

    Ok(report)
}

/// Normalizes the augmented records and writes both outputs.
///
/// # Errors
///
/// Returns [`PipelineError`] if the augment stage has no records or an
/// output cannot be written.
pub fn run_normalize(config: &PipelineConfig) -> Result<NormalizedDataset, PipelineError> {
    let paths = config.paths();

    let state = load_checkpoint(&paths, AUGMENT_STAGE_ID)?;
    if !state.is_complete() && !state.is_fresh() {
        log::warn!(
            "Stage {AUGMENT_STAGE_ID} is incomplete ({}/{}); normalizing partial results",
            state.processed_count,
            state.total_items
        );
    }

    let records = SeedSource::new(
        AUGMENT_STAGE_ID,
        Box::new(JsonFileStore::new(paths.records(AUGMENT_STAGE_ID))),
    )
    .load()?;
    let dataset = normalize(&records);

    write_normalized(&paths.normalized(), &dataset)?;
    write_artifact(&paths.artifact(), &dataset)?;

    Ok(dataset)
}

/// Progress of one stage as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    /// Stage id, the prefix of its state files.
    pub id: &'static str,
    /// Human-readable name.
    pub label: &'static str,
    /// Stored checkpoint, or a fresh one if none exists.
    pub checkpoint: CheckpointState,
    /// Number of stored records, if the stage has written any.
    pub records: Option<usize>,
}

/// Reads every stage's checkpoint and record count.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if a state file exists but cannot be
/// read.
pub fn status(config: &PipelineConfig) -> Result<Vec<StageStatus>, PipelineError> {
    let paths = config.paths();
    STAGES
        .iter()
        .map(|&(id, label)| -> Result<StageStatus, PipelineError> {
            let records = JsonFileStore::<Records>::new(paths.records(id))
                .load()?
                .map(|records| records.len());
            Ok(StageStatus {
                id,
                label,
                checkpoint: load_checkpoint(&paths, id)?,
                records,
            })
        })
        .collect()
}

fn load_checkpoint(paths: &StatePaths, id: &str) -> Result<CheckpointState, PipelineError> {
    Ok(JsonFileStore::<CheckpointState>::new(paths.checkpoint(id))
        .load()?
        .unwrap_or_default())
}

fn engine_for<I>(
    config: &PipelineConfig,
    stage_id: &str,
    progress: Arc<dyn ProgressCallback>,
) -> BatchEngine<I>
where
    I: serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
{
    BatchEngine::new(
        StageStores::on_disk(&config.paths(), stage_id),
        config.batch_size,
    )
    .with_progress(progress)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use media_atlas_models::{MediaRecord, PlaceResolution};
    use media_atlas_state::MemoryStore;

    use super::*;
    use crate::export::read_artifact;
    use crate::progress::null_progress;
    use crate::stages::locate::LocateTarget;

    fn record(filename: &str, place: PlaceResolution) -> MediaRecord {
        MediaRecord {
            filename: filename.to_string(),
            datetime_utc: None,
            latitude: 48.8566,
            longitude: 2.3522,
            camera_make: None,
            camera_model: None,
            place: Some(place),
        }
    }

    fn data_dir(name: &str) -> PipelineConfig {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        PipelineConfig {
            data_dir: dir,
            ..PipelineConfig::default()
        }
    }

    /// Counts how often it was asked.
    struct Recorder {
        answer: bool,
        asked: AtomicUsize,
    }

    impl ResetDecider for Recorder {
        fn confirm_reset(&self, _stage_label: &str, _state: &CheckpointState) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn locate_stage() -> LocateStage {
        let seed = vec![MediaRecord {
            place: None,
            ..record("a.jpg", PlaceResolution::default())
        }];
        LocateStage::new(
            Gazetteer::default(),
            SeedSource::new(INDEX_STAGE_ID, Box::new(MemoryStore::with_value("seed", seed))),
        )
    }

    #[tokio::test]
    async fn complete_stage_is_kept_when_declined() {
        let mut engine = BatchEngine::new(StageStores::<LocateTarget>::in_memory("loc"), 50);
        let mut stage = locate_stage();
        let decider = Recorder {
            answer: false,
            asked: AtomicUsize::new(0),
        };

        let first = drive(&mut stage, &mut engine, &decider).await.unwrap();
        assert!(matches!(first, StageReport::Ran(_)));
        assert_eq!(decider.asked.load(Ordering::SeqCst), 0);

        let second = drive(&mut stage, &mut engine, &decider).await.unwrap();
        assert_eq!(
            second,
            StageReport::Kept(CheckpointState { processed_count: 1, total_items: 1 })
        );
        assert_eq!(decider.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn complete_stage_reruns_when_confirmed() {
        let mut engine = BatchEngine::new(StageStores::<LocateTarget>::in_memory("loc"), 50);
        let mut stage = locate_stage();
        let _ = drive(&mut stage, &mut engine, &FixedAnswer(true)).await.unwrap();

        let again = drive(&mut stage, &mut engine, &FixedAnswer(true)).await.unwrap();
        let StageReport::Ran(summary) = again else {
            panic!("stage should rerun");
        };
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.resumed_from, 0);
    }

    #[test]
    fn normalize_writes_json_and_artifact() {
        let config = data_dir("media_atlas_runner_normalize");
        let paths = config.paths();
        let paris = PlaceResolution::new("Paris", "Île-de-France", "France");
        let records = vec![
            record("a.jpg", paris.clone()),
            record("b.jpg", paris),
            record("c.jpg", PlaceResolution::new("Lyon", "", "France")),
        ];
        JsonFileStore::<Records>::new(paths.records(AUGMENT_STAGE_ID))
            .save(&records)
            .unwrap();

        let dataset = run_normalize(&config).unwrap();

        assert_eq!(dataset.locations.len(), 2);
        assert_eq!(read_artifact(&paths.artifact()).unwrap(), dataset);
        let json = std::fs::read_to_string(paths.normalized()).unwrap();
        assert!(json.contains("\"location_id\": 1"));

        let _ = std::fs::remove_dir_all(config.data_dir);
    }

    #[test]
    fn normalize_without_records_fails() {
        let config = data_dir("media_atlas_runner_no_records");
        assert!(matches!(
            run_normalize(&config),
            Err(PipelineError::MissingInput { stage: AUGMENT_STAGE_ID })
        ));
    }

    #[test]
    fn status_reports_every_stage() {
        let config = data_dir("media_atlas_runner_status");
        let paths = config.paths();
        JsonFileStore::<CheckpointState>::new(paths.checkpoint(INDEX_STAGE_ID))
            .save(&CheckpointState { processed_count: 4, total_items: 9 })
            .unwrap();
        JsonFileStore::<Records>::new(paths.records(INDEX_STAGE_ID))
            .save(&vec![record("a.jpg", PlaceResolution::default())])
            .unwrap();

        let status = status(&config).unwrap();

        let ids: Vec<&str> = status.iter().map(|s| s.id).collect();
        assert_eq!(ids, [INDEX_STAGE_ID, LOCATE_STAGE_ID, AUGMENT_STAGE_ID]);
        assert_eq!(status[0].checkpoint.remaining(), 5);
        assert_eq!(status[0].records, Some(1));
        assert!(status[1].checkpoint.is_fresh());
        assert_eq!(status[1].records, None);

        let _ = std::fs::remove_dir_all(config.data_dir);
    }

    fn with_gazetteer(config: PipelineConfig) -> PipelineConfig {
        std::fs::create_dir_all(&config.data_dir).unwrap();
        let gazetteer = config.data_dir.join("cities.txt");
        std::fs::write(
            &gazetteer,
            "2988507\tParis\tParis\t\t48.85341\t2.3488\tP\tPPLC\tFR\n",
        )
        .unwrap();
        PipelineConfig {
            gazetteer: Some(gazetteer),
            ..config
        }
    }

    #[tokio::test]
    async fn locate_waits_for_an_unfinished_index() {
        let config = with_gazetteer(data_dir("media_atlas_runner_partial_index"));
        let paths = config.paths();
        JsonFileStore::<CheckpointState>::new(paths.checkpoint(INDEX_STAGE_ID))
            .save(&CheckpointState { processed_count: 1, total_items: 3 })
            .unwrap();
        JsonFileStore::<Records>::new(paths.records(INDEX_STAGE_ID))
            .save(&vec![record("a.jpg", PlaceResolution::default())])
            .unwrap();

        let err = run_locate(&config, null_progress(), &FixedAnswer(false))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::IncompleteInput { stage: INDEX_STAGE_ID, processed: 1, total: 3 }
        ));
        assert!(load_checkpoint(&paths, LOCATE_STAGE_ID).unwrap().is_fresh());

        let _ = std::fs::remove_dir_all(config.data_dir);
    }

    #[tokio::test]
    async fn locate_runs_after_a_finished_index() {
        let config = with_gazetteer(data_dir("media_atlas_runner_finished_index"));
        let paths = config.paths();
        JsonFileStore::<CheckpointState>::new(paths.checkpoint(INDEX_STAGE_ID))
            .save(&CheckpointState { processed_count: 1, total_items: 1 })
            .unwrap();
        JsonFileStore::<Records>::new(paths.records(INDEX_STAGE_ID))
            .save(&vec![MediaRecord {
                place: None,
                ..record("a.jpg", PlaceResolution::default())
            }])
            .unwrap();

        let report = run_locate(&config, null_progress(), &FixedAnswer(false))
            .await
            .unwrap();

        let StageReport::Ran(summary) = report else {
            panic!("locate should run");
        };
        assert_eq!(summary.total, 1);
        let located = JsonFileStore::<Records>::new(paths.records(LOCATE_STAGE_ID))
            .load()
            .unwrap()
            .unwrap();
        let place = located[0].place.as_ref().unwrap();
        assert_eq!(place.city.as_deref(), Some("Paris"));

        let _ = std::fs::remove_dir_all(config.data_dir);
    }

    #[tokio::test]
    async fn index_requires_a_library() {
        let config = data_dir("media_atlas_runner_no_library");
        let err = run_index(&config, null_progress(), &FixedAnswer(false))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
