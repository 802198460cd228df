#![allow(clippy::module_name_repetitions)]

//! Menu-driven front end used when no command is given.

use std::path::PathBuf;

use dialoguer::{Input, MultiSelect, Select};
use media_atlas_cli_utils::MultiProgress;
use media_atlas_pipeline::config::PipelineConfig;
use media_atlas_pipeline::runner::ResetDecider;

use crate::pipeline::{PipelineStep, print_status, run_steps};

enum Action {
    RunPipeline,
    ShowStatus,
}

impl Action {
    const ALL: &[Self] = &[Self::RunPipeline, Self::ShowStatus];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunPipeline => "Run pipeline steps",
            Self::ShowStatus => "Show stage status",
        }
    }
}

/// Prompts for an action and runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or a selected step fails.
#[allow(clippy::future_not_send)]
pub async fn run(
    mut config: PipelineConfig,
    multi: &MultiProgress,
    decider: &dyn ResetDecider,
) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::ShowStatus => print_status(&config)?,
        Action::RunPipeline => {
            let step_labels: Vec<&str> =
                PipelineStep::ALL.iter().map(PipelineStep::label).collect();
            let defaults = vec![true; PipelineStep::ALL.len()];

            let selected = MultiSelect::new()
                .with_prompt("Pipeline steps (space=toggle, a=all, enter=confirm)")
                .items(&step_labels)
                .defaults(&defaults)
                .interact()?;

            if selected.is_empty() {
                println!("No steps selected.");
                return Ok(());
            }

            let steps: Vec<PipelineStep> =
                selected.iter().map(|&i| PipelineStep::ALL[i]).collect();

            if steps.contains(&PipelineStep::Index) && config.library.is_none() {
                let library: String = Input::new()
                    .with_prompt("Media library directory")
                    .interact_text()?;
                config.library = Some(PathBuf::from(library.trim()));
            }

            if steps.contains(&PipelineStep::Locate) {
                let gazetteer: String = Input::new()
                    .with_prompt("GeoNames cities file")
                    .default(config.gazetteer_path().display().to_string())
                    .interact_text()?;
                config.gazetteer = Some(PathBuf::from(gazetteer.trim()));
            }

            run_steps(&steps, &config, multi, decider).await?;
        }
    }

    Ok(())
}
