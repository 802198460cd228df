#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the media atlas pipeline.
//!
//! A [`MediaRecord`] is produced by the indexing stage for every media file
//! that carries coordinates, gets a [`PlaceResolution`] attached by the
//! place-resolution stages, and is finally flattened into a
//! [`NormalizedItem`] that references a deduplicated location table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One geotagged media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Path relative to the media library root.
    pub filename: String,
    /// Capture time, when the file carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_utc: Option<DateTime<Utc>>,
    /// Latitude in signed decimal degrees (WGS84).
    pub latitude: f64,
    /// Longitude in signed decimal degrees (WGS84).
    pub longitude: f64,
    /// Camera manufacturer (EXIF `Make`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    /// Camera model (EXIF `Model`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    /// Resolved place. Absent until the locate stage has handled the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<PlaceResolution>,
}

impl MediaRecord {
    /// Whether the record still needs a nearest-city lookup.
    #[must_use]
    pub const fn needs_place(&self) -> bool {
        self.place.is_none()
    }

    /// Whether the record has a city but no state/province yet.
    #[must_use]
    pub fn needs_state(&self) -> bool {
        self.place.as_ref().is_some_and(PlaceResolution::needs_state)
    }
}

/// City / state / country of a record.
///
/// Empty strings are never stored: [`PlaceResolution::new`] maps them to
/// `None`, so two places compare equal exactly when they carry the same
/// known components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceResolution {
    /// City, town, or village name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State, province, or region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Country name or ISO code, as supplied by whichever tier resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl PlaceResolution {
    /// Builds a place, treating blank components as unknown.
    #[must_use]
    pub fn new(city: &str, state: &str, country: &str) -> Self {
        Self {
            city: non_empty(city),
            state: non_empty(state),
            country: non_empty(country),
        }
    }

    /// A city is known but the state is not.
    #[must_use]
    pub const fn needs_state(&self) -> bool {
        self.city.is_some() && self.state.is_none()
    }

    /// Returns `true` if no component is known.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.city.is_none() && self.state.is_none() && self.country.is_none()
    }
}

/// Returns `Some(trimmed)` for a non-blank string, `None` otherwise.
#[must_use]
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Progress marker for one stage.
///
/// A stage is complete iff `processed_count == total_items` with
/// `total_items > 0`. `total_items == 0` means the item list has not been
/// fixed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    /// Items handled so far (successfully or skipped).
    pub processed_count: usize,
    /// Size of the fixed item list for this run.
    pub total_items: usize,
}

impl CheckpointState {
    /// Starts a run over `total_items` items.
    #[must_use]
    pub const fn started(total_items: usize) -> Self {
        Self {
            processed_count: 0,
            total_items,
        }
    }

    /// No item list has been fixed yet.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        self.total_items == 0
    }

    /// Every item of a non-empty run has been handled.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.total_items > 0 && self.processed_count >= self.total_items
    }

    /// `processed_count` does not exceed `total_items`.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.processed_count <= self.total_items
    }

    /// Number of items still to process.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.total_items.saturating_sub(self.processed_count)
    }
}

/// A media record whose place has been replaced by a location table index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Path relative to the media library root.
    pub filename: String,
    /// Capture time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_utc: Option<DateTime<Utc>>,
    /// Latitude in signed decimal degrees.
    pub latitude: f64,
    /// Longitude in signed decimal degrees.
    pub longitude: f64,
    /// Camera manufacturer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    /// Camera model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    /// Index into [`NormalizedDataset::locations`].
    pub location_id: u32,
}

/// The final, compacted dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDataset {
    /// Unique places in first-seen order.
    pub locations: Vec<PlaceResolution>,
    /// Records referencing `locations` by index.
    pub items: Vec<NormalizedItem>,
}
