#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Remote place lookups for media atlas.
//!
//! The nearest-city stage only knows a city name and a country code. This
//! crate adds the state/province by asking a free-text geocoder
//! (Nominatim / `OpenStreetMap`, configured in `services/`) and remembers
//! every answer, including failures, in the
//! [`GeocodeCache`](media_atlas_state::geocode_cache::GeocodeCache).
//!
//! The [`PlaceSearch`] trait is the seam to the remote service so the
//! resolver can run against a fake in tests.

pub mod nominatim;
pub mod resolve;
pub mod retry;
pub mod service_registry;

use async_trait::async_trait;
use thiserror::Error;

/// Structured address of the best match for a free-text query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMatch {
    /// First of `city`, `town`, `village` present in the address.
    pub city: Option<String>,
    /// State or province.
    pub state: Option<String>,
    /// Country name.
    pub country: Option<String>,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP status {status}")]
    Status {
        /// Status code returned.
        status: u16,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// A geocoder that answers free-text place queries with at most one match.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Returns the best match for `query`, or `None` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] on transport or parsing failures.
    async fn search(&self, query: &str) -> Result<Option<AddressMatch>, GeocodeError>;
}

/// Builds the free-text query `"<city>, <country>"`, dropping an unknown
/// country.
#[must_use]
pub fn build_query(city: &str, country: Option<&str>) -> String {
    match country.map(str::trim).filter(|c| !c.is_empty()) {
        Some(country) => format!("{city}, {country}"),
        None => city.to_string(),
    }
}
