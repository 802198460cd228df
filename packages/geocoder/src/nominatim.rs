//! Nominatim / OpenStreetMap geocoder client.
//!
//! Nominatim has strict rate limits: **1 request per second** maximum on
//! the public instance. The client sleeps `rate_limit_ms` before every
//! request.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::Duration;

use async_trait::async_trait;

use crate::retry::{RetryPolicy, send_json};
use crate::service_registry::{GeocodingService, ProviderConfig};
use crate::{AddressMatch, GeocodeError, PlaceSearch};

/// Address keys that name the settlement, in order of preference.
const CITY_KEYS: &[&str] = &["city", "town", "village"];

/// Address keys that name the first-level administrative region.
const STATE_KEYS: &[&str] = &["state", "province"];

/// A rate-limited Nominatim search client.
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    rate_limit: Duration,
    retry: RetryPolicy,
}

impl NominatimClient {
    /// Builds a client from its service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_service(service: &GeocodingService) -> Result<Self, GeocodeError> {
        let ProviderConfig::Nominatim {
            base_url,
            rate_limit_ms,
            user_agent,
            timeout_secs,
        } = &service.provider;

        let client = reqwest::Client::builder()
            .user_agent(user_agent.as_str())
            .timeout(Duration::from_secs(*timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.clone(),
            rate_limit: Duration::from_millis(*rate_limit_ms),
            retry: RetryPolicy::default(),
        })
    }

    /// The search endpoint in use.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PlaceSearch for NominatimClient {
    async fn search(&self, query: &str) -> Result<Option<AddressMatch>, GeocodeError> {
        tokio::time::sleep(self.rate_limit).await;

        let body = send_json(self.retry, || {
            self.client.get(&self.base_url).query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
        })
        .await?;

        parse_response(&body)
    }
}

/// Parses a Nominatim `jsonv2` search response.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if the body is not an array.
pub fn parse_response(body: &serde_json::Value) -> Result<Option<AddressMatch>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let address = &first["address"];

    Ok(Some(AddressMatch {
        city: first_present(address, CITY_KEYS),
        state: first_present(address, STATE_KEYS),
        country: first_present(address, &["country"]),
    }))
}

fn first_present(address: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| address[*key].as_str())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}
