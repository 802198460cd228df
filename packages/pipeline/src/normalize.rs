//! Place deduplication.
//!
//! Every distinct `(city, state, country)` tuple gets the next sequential
//! id the first time it is seen. A record without a place maps to the
//! all-unknown tuple, so all such records share one location.

use std::collections::HashMap;

use media_atlas_models::{MediaRecord, NormalizedDataset, NormalizedItem, PlaceResolution};

/// Builds the location table and rewrites every record to reference it.
///
/// Output order follows input order, so equal input yields equal output.
#[must_use]
pub fn normalize(records: &[MediaRecord]) -> NormalizedDataset {
    let mut ids: HashMap<PlaceResolution, u32> = HashMap::new();
    let mut locations = Vec::new();
    let mut items = Vec::with_capacity(records.len());

    for record in records {
        let place = record.place.clone().unwrap_or_default();

        #[allow(clippy::cast_possible_truncation)]
        let next = locations.len() as u32;
        let location_id = *ids.entry(place).or_insert_with_key(|place| {
            locations.push(place.clone());
            next
        });

        items.push(NormalizedItem {
            filename: record.filename.clone(),
            datetime_utc: record.datetime_utc,
            latitude: record.latitude,
            longitude: record.longitude,
            camera_make: record.camera_make.clone(),
            camera_model: record.camera_model.clone(),
            location_id,
        });
    }

    log::info!(
        "Normalized {} records into {} locations",
        items.len(),
        locations.len()
    );

    NormalizedDataset { locations, items }
}
