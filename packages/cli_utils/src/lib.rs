#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the media atlas binary.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so log
//! lines do not tear progress bars. [`IndicatifProgress`] drives one bar
//! per pipeline stage and [`PromptReset`] asks before discarding a
//! completed stage.

use std::sync::Arc;
use std::time::Duration;

use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use media_atlas_models::CheckpointState;
use media_atlas_pipeline::progress::ProgressCallback;
use media_atlas_pipeline::runner::ResetDecider;

pub use indicatif::MultiProgress;

/// A stage bar backed by `indicatif`.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied once the item count is known.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Spinner labelled with the stage name until the engine reports how
    /// many items it will process.
    #[must_use]
    pub fn stage_bar(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, bar_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_style(self.bar_style.clone());
    }

    fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Asks on the terminal whether a completed stage should start over.
///
/// A prompt that cannot be shown (no TTY, interrupted) keeps the results.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptReset;

impl ResetDecider for PromptReset {
    fn confirm_reset(&self, stage_label: &str, state: &CheckpointState) -> bool {
        log::info!(
            "{stage_label}: {}/{} items processed",
            state.processed_count,
            state.total_items
        );
        let prompt = format!("{stage_label}: Stage appears complete. Overwrite and start over?");

        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Could not read answer, keeping existing results: {e}");
                false
            }
        }
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind the
/// progress bridge.
///
/// Every progress bar must be added to the returned [`MultiProgress`].
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set in tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
