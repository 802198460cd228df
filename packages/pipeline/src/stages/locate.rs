//! Stage 2: nearest gazetteer city for every record without a place.

use async_trait::async_trait;
use media_atlas_gazetteer::Gazetteer;
use media_atlas_models::PlaceResolution;
use serde::{Deserialize, Serialize};

use crate::engine::{Records, Stage};
use crate::stages::{LOCATE_LABEL, LOCATE_STAGE_ID, SeedSource};
use crate::{PipelineError, SkipReason};

/// A record still needing a place, addressed by its position in the
/// records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateTarget {
    /// Position in the seeded records.
    pub index: usize,
    /// Decimal degrees, as indexed.
    pub latitude: f64,
    /// Decimal degrees, as indexed.
    pub longitude: f64,
}

/// Attaches the nearest gazetteer city and its country code.
pub struct LocateStage {
    gazetteer: Gazetteer,
    seed: SeedSource,
}

impl LocateStage {
    /// Looks places up in `gazetteer`, starting from the records in `seed`.
    #[must_use]
    pub const fn new(gazetteer: Gazetteer, seed: SeedSource) -> Self {
        Self { gazetteer, seed }
    }
}

#[async_trait]
impl Stage for LocateStage {
    type Item = LocateTarget;
    type Outcome = PlaceResolution;

    fn id(&self) -> &'static str {
        LOCATE_STAGE_ID
    }

    fn label(&self) -> &'static str {
        LOCATE_LABEL
    }

    async fn prepare(&mut self) -> Result<(Vec<LocateTarget>, Records), PipelineError> {
        let records = self.seed.load()?;
        let targets = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.needs_place())
            .map(|(index, record)| LocateTarget {
                index,
                latitude: record.latitude,
                longitude: record.longitude,
            })
            .collect();
        Ok((targets, records))
    }

    async fn process(&mut self, target: &LocateTarget) -> Result<PlaceResolution, SkipReason> {
        self.gazetteer
            .locate(target.latitude, target.longitude)
            .ok_or(SkipReason::Unresolved)
    }

    fn apply(&mut self, records: &mut Records, target: &LocateTarget, place: PlaceResolution) {
        if let Some(record) = records.get_mut(target.index) {
            record.place = Some(place);
        }
    }
}
