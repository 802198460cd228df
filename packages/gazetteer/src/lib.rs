#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory city gazetteer for nearest-place lookups.
//!
//! Loads a GeoNames city dump (e.g. `cities15000.txt`) once at startup and
//! answers "which listed city is closest to this coordinate" by scanning
//! every entry with the haversine formula. There is no spatial index and
//! no distance cutoff: any non-empty gazetteer always produces a match.

use std::io::Read;
use std::path::Path;

use media_atlas_models::PlaceResolution;

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// GeoNames dump columns (0-based).
const COL_NAME: usize = 1;
const COL_LATITUDE: usize = 4;
const COL_LONGITUDE: usize = 5;
const COL_COUNTRY: usize = 8;

/// Errors from loading a gazetteer file.
#[derive(Debug, thiserror::Error)]
pub enum GazetteerError {
    /// The file could not be opened.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid tab-separated data.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One named place.
#[derive(Debug, Clone, PartialEq)]
pub struct GazetteerEntry {
    /// Place name.
    pub name: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

/// A read-only list of places, kept in file order.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
}

impl Gazetteer {
    /// Wraps an existing list. Order is preserved and decides ties.
    #[must_use]
    pub const fn from_entries(entries: Vec<GazetteerEntry>) -> Self {
        Self { entries }
    }

    /// Loads a GeoNames dump from disk.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if the file cannot be opened or read.
    pub fn load(path: &Path) -> Result<Self, GazetteerError> {
        let file = std::fs::File::open(path)?;
        let gazetteer = Self::from_reader(file)?;
        log::info!(
            "Loaded {} places into gazetteer from {}",
            gazetteer.len(),
            path.display()
        );
        Ok(gazetteer)
    }

    /// Parses GeoNames tab-separated rows. Rows with a missing name or
    /// unparseable coordinates are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError`] if the underlying reader fails.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, GazetteerError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let mut entries = Vec::new();
        let mut skipped = 0u64;

        for row in csv_reader.records() {
            let row = row?;
            match parse_row(&row) {
                Some(entry) => entries.push(entry),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} malformed gazetteer rows");
        }

        Ok(Self { entries })
    }

    /// Number of places.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no places.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the closest entry and its distance in kilometres.
    ///
    /// Equidistant entries resolve to the one listed first.
    #[must_use]
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<(&GazetteerEntry, f64)> {
        let mut best: Option<(&GazetteerEntry, f64)> = None;

        for entry in &self.entries {
            let distance = haversine_km(latitude, longitude, entry.latitude, entry.longitude);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                Some(_) if distance.is_nan() => {}
                _ => best = Some((entry, distance)),
            }
        }

        best
    }

    /// Resolves a coordinate to the nearest city and its country.
    ///
    /// The state is left unknown; gazetteer entries do not carry one.
    /// Returns `None` only when the gazetteer is empty.
    #[must_use]
    pub fn locate(&self, latitude: f64, longitude: f64) -> Option<PlaceResolution> {
        self.nearest(latitude, longitude)
            .map(|(entry, _)| PlaceResolution::new(&entry.name, "", &entry.country))
    }
}

fn parse_row(row: &csv::StringRecord) -> Option<GazetteerEntry> {
    let name = row.get(COL_NAME)?.trim();
    if name.is_empty() {
        return None;
    }

    let latitude = row.get(COL_LATITUDE)?.trim().parse::<f64>().ok()?;
    let longitude = row.get(COL_LONGITUDE)?.trim().parse::<f64>().ok()?;
    let country = row.get(COL_COUNTRY).unwrap_or_default().trim();

    Some(GazetteerEntry {
        name: name.to_string(),
        country: country.to_string(),
        latitude,
        longitude,
    })
}

/// Great-circle distance between two points, in kilometres.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
