#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `media_atlas`: geotag a media library and export a compact place atlas.
//!
//! Each stage resumes from its last checkpoint. Without a command an
//! interactive menu is shown.

mod interactive;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use media_atlas_cli_utils::PromptReset;
use media_atlas_pipeline::config::PipelineConfig;
use media_atlas_pipeline::runner::{FixedAnswer, ResetDecider};

use crate::pipeline::{PipelineStep, print_status, run_steps};

#[derive(Parser)]
#[command(
    name = "media_atlas",
    about = "Resumable geotagging pipeline for photo and video libraries"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Directory for state files and outputs (overrides `MEDIA_ATLAS_DATA_DIR`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Items processed between two checkpoint commits
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// Start completed stages over without asking
    #[arg(long, global = true, conflicts_with = "no_reset")]
    yes: bool,
    /// Keep completed stages without asking
    #[arg(long, global = true)]
    no_reset: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract location, time, and camera metadata from every media file
    Index {
        /// Media library root (overrides `MEDIA_ATLAS_LIBRARY`)
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Assign the nearest gazetteer city to each record
    Locate {
        /// GeoNames cities dump (overrides `MEDIA_ATLAS_GAZETTEER`)
        #[arg(long)]
        gazetteer: Option<PathBuf>,
    },
    /// Look up the state/province of each located city
    Augment,
    /// Deduplicate places and write the JSON and binary outputs
    Normalize,
    /// Run every stage followed by normalize
    Run {
        /// Media library root (overrides `MEDIA_ATLAS_LIBRARY`)
        #[arg(long)]
        library: Option<PathBuf>,
        /// GeoNames cities dump (overrides `MEDIA_ATLAS_GAZETTEER`)
        #[arg(long)]
        gazetteer: Option<PathBuf>,
    },
    /// Print each stage's checkpoint
    Status,
}

fn reset_decider(yes: bool, no_reset: bool) -> Box<dyn ResetDecider> {
    if yes {
        Box::new(FixedAnswer(true))
    } else if no_reset {
        Box::new(FixedAnswer(false))
    } else {
        Box::new(PromptReset)
    }
}

fn apply_overrides(
    config: &mut PipelineConfig,
    library: Option<PathBuf>,
    gazetteer: Option<PathBuf>,
) {
    if library.is_some() {
        config.library = library;
    }
    if gazetteer.is_some() {
        config.gazetteer = gazetteer;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = media_atlas_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    let decider = reset_decider(cli.yes, cli.no_reset);

    let Some(command) = cli.command else {
        return interactive::run(config, &multi, decider.as_ref()).await;
    };

    match command {
        Commands::Index { library } => {
            apply_overrides(&mut config, library, None);
            run_steps(&[PipelineStep::Index], &config, &multi, decider.as_ref()).await?;
        }
        Commands::Locate { gazetteer } => {
            apply_overrides(&mut config, None, gazetteer);
            run_steps(&[PipelineStep::Locate], &config, &multi, decider.as_ref()).await?;
        }
        Commands::Augment => {
            run_steps(&[PipelineStep::Augment], &config, &multi, decider.as_ref()).await?;
        }
        Commands::Normalize => {
            run_steps(&[PipelineStep::Normalize], &config, &multi, decider.as_ref()).await?;
        }
        Commands::Run { library, gazetteer } => {
            apply_overrides(&mut config, library, gazetteer);
            run_steps(PipelineStep::ALL, &config, &multi, decider.as_ref()).await?;
        }
        Commands::Status => print_status(&config)?,
    }

    Ok(())
}
