//! Cache-backed `(city, country) -> (state, country)` resolution.
//!
//! The cache is consulted first and its answers are final. On a miss the
//! remote [`PlaceSearch`] is queried once; whatever happens (match, no
//! match, transport error) the outcome is cached, so a place is never
//! looked up twice.

use media_atlas_state::StoreError;
use media_atlas_state::geocode_cache::{CachedRegion, GeocodeCache};

use crate::{PlaceSearch, build_query};

/// Counters for one resolver session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Answers served from the cache.
    pub cache_hits: u64,
    /// Remote lookups that produced a match.
    pub resolved: u64,
    /// Remote lookups that matched nothing.
    pub unmatched: u64,
    /// Remote lookups that failed.
    pub failed: u64,
}

/// Resolves states through a cache in front of a remote geocoder.
pub struct StateResolver {
    search: Box<dyn PlaceSearch>,
    cache: GeocodeCache,
    stats: ResolveStats,
}

impl StateResolver {
    /// Combines a geocoder with an opened cache.
    #[must_use]
    pub fn new(search: Box<dyn PlaceSearch>, cache: GeocodeCache) -> Self {
        Self {
            search,
            cache,
            stats: ResolveStats::default(),
        }
    }

    /// Returns the cached or freshly looked-up region for a place.
    ///
    /// A failed lookup yields (and caches) a region with no state and the
    /// queried country.
    pub async fn resolve_state(&mut self, city: &str, country: Option<&str>) -> CachedRegion {
        if let Some(hit) = self.cache.get(city, country) {
            self.stats.cache_hits += 1;
            return hit.clone();
        }

        let query = build_query(city, country);
        let region = match self.search.search(&query).await {
            Ok(Some(found)) => {
                self.stats.resolved += 1;
                log::debug!(
                    "Resolved '{query}' as {} / {:?} / {:?}",
                    found.city.as_deref().unwrap_or(city),
                    found.state,
                    found.country,
                );
                CachedRegion {
                    state: found.state,
                    country: found.country.or_else(|| country.map(str::to_string)),
                }
            }
            Ok(None) => {
                self.stats.unmatched += 1;
                log::debug!("No geocoder match for '{query}'");
                CachedRegion::unresolved(country)
            }
            Err(e) => {
                self.stats.failed += 1;
                log::warn!("Geocoder error for '{query}', caching as unresolved: {e}");
                CachedRegion::unresolved(country)
            }
        };

        self.cache.insert(city, country, region.clone());
        region
    }

    /// Persists new cache entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cache cannot be written.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.cache.flush()
    }

    /// Counters since construction.
    #[must_use]
    pub const fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &GeocodeCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use media_atlas_state::MemoryStore;

    use crate::{AddressMatch, GeocodeError};

    /// Answers from a fixed table and records every query it receives.
    struct FakeSearch {
        answers: BTreeMap<String, AddressMatch>,
        fail: bool,
        queries: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PlaceSearch for FakeSearch {
        async fn search(&self, query: &str) -> Result<Option<AddressMatch>, GeocodeError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(GeocodeError::RateLimited);
            }
            Ok(self.answers.get(query).cloned())
        }
    }

    fn resolver(fail: bool) -> (StateResolver, Arc<Mutex<Vec<String>>>) {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let mut answers = BTreeMap::new();
        answers.insert(
            "Paris, France".to_string(),
            AddressMatch {
                city: Some("Paris".to_string()),
                state: Some("Île-de-France".to_string()),
                country: Some("France".to_string()),
            },
        );
        let search = FakeSearch {
            answers,
            fail,
            queries: Arc::clone(&queries),
        };
        let cache = GeocodeCache::open(Box::new(MemoryStore::new("cache"))).unwrap();
        (StateResolver::new(Box::new(search), cache), queries)
    }

    #[tokio::test]
    async fn differently_cased_queries_share_one_lookup() {
        let (mut resolver, queries) = resolver(false);

        let first = resolver.resolve_state("Paris", Some("France")).await;
        let second = resolver.resolve_state("paris", Some("FRANCE")).await;

        assert_eq!(first, second);
        assert_eq!(first.state.as_deref(), Some("Île-de-France"));
        assert_eq!(queries.lock().unwrap().len(), 1);
        assert_eq!(resolver.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn unmatched_place_is_cached_as_terminal() {
        let (mut resolver, queries) = resolver(false);

        let first = resolver.resolve_state("Atlantis", Some("GR")).await;
        let again = resolver.resolve_state("Atlantis", Some("GR")).await;

        assert_eq!(first, CachedRegion::unresolved(Some("GR")));
        assert_eq!(again, first);
        assert_eq!(queries.lock().unwrap().as_slice(), ["Atlantis, GR"]);
        assert_eq!(resolver.stats().unmatched, 1);
    }

    #[tokio::test]
    async fn transport_failure_is_never_retried() {
        let (mut resolver, queries) = resolver(true);

        let region = resolver.resolve_state("Paris", Some("France")).await;
        resolver.resolve_state("Paris", Some("France")).await;

        assert!(region.state.is_none());
        assert_eq!(region.country.as_deref(), Some("France"));
        assert_eq!(queries.lock().unwrap().len(), 1);
        assert_eq!(resolver.stats().failed, 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn missing_country_keeps_geocoder_country() {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let mut answers = BTreeMap::new();
        answers.insert(
            "Lyon".to_string(),
            AddressMatch {
                city: Some("Lyon".to_string()),
                state: Some("Auvergne-Rhône-Alpes".to_string()),
                country: Some("France".to_string()),
            },
        );
        let search = FakeSearch {
            answers,
            fail: false,
            queries: Arc::clone(&queries),
        };
        let cache = GeocodeCache::open(Box::new(MemoryStore::new("cache"))).unwrap();
        let mut resolver = StateResolver::new(Box::new(search), cache);

        let region = resolver.resolve_state("Lyon", None).await;
        assert_eq!(region.country.as_deref(), Some("France"));
        assert_eq!(queries.lock().unwrap().as_slice(), ["Lyon"]);
    }
}
