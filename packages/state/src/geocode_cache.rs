//! Permanent cache of city → state/province lookups.
//!
//! Keys are `lowercase(city) + "|" + lowercase(country)`. Failed lookups
//! are stored too, as a region without a state, so an unresolvable place
//! is never queried twice. Entries are never invalidated; delete the cache
//! file to start over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{StateStore, StoreError};

/// The cached answer for one `(city, country)` query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRegion {
    /// State or province, absent for a failed lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Country as returned by the geocoder, or the queried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl CachedRegion {
    /// The terminal entry recorded when a lookup produced nothing.
    #[must_use]
    pub fn unresolved(country: Option<&str>) -> Self {
        Self {
            state: None,
            country: country.map(str::to_string),
        }
    }
}

/// Serialized form of the cache file.
pub type CacheEntries = BTreeMap<String, CachedRegion>;

/// Builds the normalized cache key for a query.
#[must_use]
pub fn cache_key(city: &str, country: Option<&str>) -> String {
    format!("{city}|{}", country.unwrap_or_default()).to_lowercase()
}

/// In-memory view of the cache plus the store it is flushed to.
pub struct GeocodeCache {
    store: Box<dyn StateStore<CacheEntries>>,
    entries: CacheEntries,
    dirty: bool,
}

impl GeocodeCache {
    /// Loads existing entries from `store`. A missing or unreadable file
    /// yields an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store exists but cannot be read.
    pub fn open(store: Box<dyn StateStore<CacheEntries>>) -> Result<Self, StoreError> {
        let entries = store.load()?.unwrap_or_default();
        log::debug!("Geocode cache opened with {} entries", entries.len());
        Ok(Self {
            store,
            entries,
            dirty: false,
        })
    }

    /// Looks up a previous answer.
    #[must_use]
    pub fn get(&self, city: &str, country: Option<&str>) -> Option<&CachedRegion> {
        self.entries.get(&cache_key(city, country))
    }

    /// Records an answer. Existing entries are kept as they are.
    pub fn insert(&mut self, city: &str, country: Option<&str>, region: CachedRegion) {
        let key = cache_key(city, country);
        if !self.entries.contains_key(&key) {
            self.entries.insert(key, region);
            self.dirty = true;
        }
    }

    /// Number of cached queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the cache if anything changed since the last flush.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.store.save(&self.entries)?;
            self.dirty = false;
            log::debug!("Flushed geocode cache ({} entries)", self.entries.len());
        }
        Ok(())
    }
}
