//! Stage 3: state/province for records that have a city but no state.
//!
//! Only `state`, and `country` when the geocoder supplies one, are written
//! back. The city found by the geocoder is never copied over the
//! gazetteer's.

use async_trait::async_trait;
use media_atlas_geocoder::resolve::{ResolveStats, StateResolver};
use media_atlas_state::geocode_cache::CachedRegion;
use serde::{Deserialize, Serialize};

use crate::engine::{Records, Stage};
use crate::stages::{AUGMENT_LABEL, AUGMENT_STAGE_ID, SeedSource};
use crate::{PipelineError, SkipReason};

/// A record to augment, addressed by its position in the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentTarget {
    /// Position in the seeded records.
    pub index: usize,
    /// City attached by stage 2.
    pub city: String,
    /// Country attached by stage 2, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Adds the state/province through the geocode cache, asking the remote
/// geocoder only on a miss.
pub struct AugmentStage {
    resolver: StateResolver,
    seed: SeedSource,
}

impl AugmentStage {
    /// Resolves through `resolver`, starting from the records in `seed`.
    #[must_use]
    pub const fn new(resolver: StateResolver, seed: SeedSource) -> Self {
        Self { resolver, seed }
    }

    /// Lookup counters for this run.
    #[must_use]
    pub const fn stats(&self) -> ResolveStats {
        self.resolver.stats()
    }
}

#[async_trait]
impl Stage for AugmentStage {
    type Item = AugmentTarget;
    type Outcome = CachedRegion;

    fn id(&self) -> &'static str {
        AUGMENT_STAGE_ID
    }

    fn label(&self) -> &'static str {
        AUGMENT_LABEL
    }

    async fn prepare(&mut self) -> Result<(Vec<AugmentTarget>, Records), PipelineError> {
        let records = self.seed.load()?;
        let targets = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.needs_state())
            .filter_map(|(index, record)| {
                let place = record.place.as_ref()?;
                Some(AugmentTarget {
                    index,
                    city: place.city.clone()?,
                    country: place.country.clone(),
                })
            })
            .collect();
        Ok((targets, records))
    }

    async fn process(&mut self, target: &AugmentTarget) -> Result<CachedRegion, SkipReason> {
        let region = self
            .resolver
            .resolve_state(&target.city, target.country.as_deref())
            .await;

        // Nothing to write back.
        if region.state.is_none() && region.country == target.country {
            return Err(SkipReason::Unresolved);
        }
        Ok(region)
    }

    fn apply(&mut self, records: &mut Records, target: &AugmentTarget, region: CachedRegion) {
        let Some(place) = records
            .get_mut(target.index)
            .and_then(|record| record.place.as_mut())
        else {
            return;
        };

        if let Some(state) = region.state {
            place.state = Some(state);
        }
        if let Some(country) = region.country {
            place.country = Some(country);
        }
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.resolver.flush()?;
        Ok(())
    }
}
