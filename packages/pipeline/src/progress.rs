//! Per-item progress reporting for stage runs.
//!
//! The engine reports through [`ProgressCallback`] and never renders
//! anything itself. The CLI supplies `indicatif` bars; tests use
//! [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from the batch engine.
pub trait ProgressCallback: Send + Sync {
    /// Size of the stage's fixed item list.
    fn set_total(&self, total: u64);

    /// Absolute position, used once when a run resumes mid-stage.
    fn set_position(&self, pos: u64);

    /// Advance by `delta` processed items.
    fn inc(&self, delta: u64);

    /// Update the text shown next to the bar.
    fn set_message(&self, msg: String);

    /// The stage run ended; `msg` summarizes it.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
