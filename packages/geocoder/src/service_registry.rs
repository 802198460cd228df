//! Geocoding services known to the pipeline.
//!
//! Service definitions live as TOML under `services/` and are compiled
//! into the binary with `include_str!`. Only the endpoint may be changed
//! at runtime, through [`NOMINATIM_URL_ENV`].

use serde::Deserialize;

use crate::GeocodeError;

/// Replaces the Nominatim endpoint, e.g. with a self-hosted instance.
pub const NOMINATIM_URL_ENV: &str = "MEDIA_ATLAS_NOMINATIM_URL";

const EMBEDDED: &[(&str, &str)] = &[("nominatim", include_str!("../services/nominatim.toml"))];

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    pub id: String,
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub provider: ProviderConfig,
}

/// Connection settings, selected by the `type` key of `[provider]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Nominatim {
        /// Search endpoint.
        base_url: String,
        /// Minimum pause before each request.
        rate_limit_ms: u64,
        /// Sent as `User-Agent`; the public instance blocks requests
        /// without one.
        user_agent: String,
        #[serde(default = "request_timeout_secs")]
        timeout_secs: u64,
    },
}

const fn enabled_by_default() -> bool {
    true
}

const fn request_timeout_secs() -> u64 {
    30
}

impl GeocodingService {
    #[must_use]
    pub fn base_url(&self) -> &str {
        let ProviderConfig::Nominatim { base_url, .. } = &self.provider;
        base_url
    }

    /// Points the service at `url` when one is given and not blank.
    #[must_use]
    pub fn with_base_url(mut self, url: Option<String>) -> Self {
        let Some(url) = url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
        else {
            return self;
        };

        let ProviderConfig::Nominatim { base_url, .. } = &mut self.provider;
        log::info!("[{}] endpoint overridden: {url}", self.id);
        *base_url = url;
        self
    }
}

fn parse_service(file: &str, source: &str) -> Result<GeocodingService, GeocodeError> {
    toml::from_str(source).map_err(|e| GeocodeError::Parse {
        message: format!("service definition {file}: {e}"),
    })
}

/// Every embedded service, disabled ones included.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if a definition is invalid.
pub fn all_services() -> Result<Vec<GeocodingService>, GeocodeError> {
    EMBEDDED
        .iter()
        .map(|(file, source)| parse_service(file, source))
        .collect()
}

/// The enabled service `id`, with the endpoint override applied.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if a definition is invalid.
pub fn service(id: &str) -> Result<Option<GeocodingService>, GeocodeError> {
    let override_url = std::env::var(NOMINATIM_URL_ENV).ok();
    Ok(all_services()?
        .into_iter()
        .find(|svc| svc.enabled && svc.id == id)
        .map(|svc| svc.with_base_url(override_url)))
}
