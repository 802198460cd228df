//! Runs pipeline steps in order with one progress bar per stage.

use std::time::Instant;

use media_atlas_cli_utils::{IndicatifProgress, MultiProgress};
use media_atlas_pipeline::PipelineError;
use media_atlas_pipeline::config::PipelineConfig;
use media_atlas_pipeline::runner::{self, ResetDecider, StageReport};
use media_atlas_pipeline::stages::{AUGMENT_LABEL, INDEX_LABEL, LOCATE_LABEL};

/// Steps of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Stage 1: capture metadata from the media library.
    Index,
    /// Stage 2: nearest gazetteer city.
    Locate,
    /// Stage 3: state/province through the geocoder.
    Augment,
    /// Deduplication and export of the augmented records.
    Normalize,
}

impl PipelineStep {
    /// Every step, in the order `run` executes them.
    pub const ALL: &[Self] = &[Self::Index, Self::Locate, Self::Augment, Self::Normalize];

    /// Name shown in menus, bars and summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Index => INDEX_LABEL,
            Self::Locate => LOCATE_LABEL,
            Self::Augment => AUGMENT_LABEL,
            Self::Normalize => "Normalize and export",
        }
    }
}

/// Runs `steps` one after another, stopping at the first failure.
///
/// # Errors
///
/// Returns the [`PipelineError`] of the step that failed.
pub async fn run_steps(
    steps: &[PipelineStep],
    config: &PipelineConfig,
    multi: &MultiProgress,
    decider: &dyn ResetDecider,
) -> Result<(), PipelineError> {
    let pipeline_start = Instant::now();

    for step in steps {
        let step_start = Instant::now();
        run_step(*step, config, multi, decider).await?;
        log::info!(
            "{} finished in {:.1}s",
            step.label(),
            step_start.elapsed().as_secs_f64()
        );
    }

    if steps.len() > 1 {
        log::info!(
            "Pipeline finished in {:.1}s",
            pipeline_start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

async fn run_step(
    step: PipelineStep,
    config: &PipelineConfig,
    multi: &MultiProgress,
    decider: &dyn ResetDecider,
) -> Result<(), PipelineError> {
    let report = match step {
        PipelineStep::Index => {
            let progress = IndicatifProgress::stage_bar(multi, step.label());
            runner::run_index(config, progress, decider).await?
        }
        PipelineStep::Locate => {
            let progress = IndicatifProgress::stage_bar(multi, step.label());
            runner::run_locate(config, progress, decider).await?
        }
        PipelineStep::Augment => {
            let progress = IndicatifProgress::stage_bar(multi, step.label());
            runner::run_augment(config, progress, decider).await?
        }
        PipelineStep::Normalize => {
            let dataset = runner::run_normalize(config)?;
            println!(
                "{}: {} items in {} locations",
                step.label(),
                dataset.items.len(),
                dataset.locations.len()
            );
            return Ok(());
        }
    };

    match report {
        StageReport::Ran(summary) => {
            let resumed = if summary.resumed_from > 0 {
                format!(", resumed at {}", summary.resumed_from)
            } else {
                String::new()
            };
            println!(
                "{}: {} updated, {} skipped ({} total{resumed})",
                step.label(),
                summary.processed.saturating_sub(summary.skipped),
                summary.skipped,
                summary.total,
            );
        }
        StageReport::Kept(state) => println!(
            "{}: kept completed results ({}/{})",
            step.label(),
            state.processed_count,
            state.total_items
        ),
    }
    Ok(())
}

/// Prints every stage's checkpoint.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if a state file cannot be read.
pub fn print_status(config: &PipelineConfig) -> Result<(), PipelineError> {
    println!("Data directory: {}", config.data_dir.display());
    println!(
        "{:<12} {:<22} {:>12} {:>9} COMPLETE",
        "STAGE", "NAME", "PROCESSED", "RECORDS"
    );
    println!("{}", "-".repeat(68));

    for stage in runner::status(config)? {
        let records = stage
            .records
            .map_or_else(|| "-".to_string(), |count| count.to_string());
        let processed = format!(
            "{}/{}",
            stage.checkpoint.processed_count, stage.checkpoint.total_items
        );
        println!(
            "{:<12} {:<22} {:>12} {:>9} {}",
            stage.id,
            stage.label,
            processed,
            records,
            if stage.checkpoint.is_complete() { "yes" } else { "no" }
        );
    }

    let paths = config.paths();
    for output in [paths.normalized(), paths.artifact()] {
        if output.exists() {
            println!("Output: {}", output.display());
        }
    }
    Ok(())
}
