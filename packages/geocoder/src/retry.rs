//! Retrying JSON requests.
//!
//! Timeouts, connection errors, HTTP 429 and 5xx are retried with
//! doubling delays. Other 4xx answers fail immediately.

use std::time::Duration;

use reqwest::StatusCode;

use crate::GeocodeError;

/// Characters of an undecodable body kept for the log.
const BODY_PREVIEW_LEN: usize = 300;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 retries after 2s, 4s and 8s.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug)]
struct Failure {
    error: GeocodeError,
    retryable: bool,
}

impl Failure {
    const fn retry(error: GeocodeError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    const fn reject(error: GeocodeError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// `None` for a usable response.
fn judge_status(status: StatusCode) -> Option<Failure> {
    let error = GeocodeError::Status {
        status: status.as_u16(),
    };
    if status == StatusCode::TOO_MANY_REQUESTS {
        Some(Failure::retry(GeocodeError::RateLimited))
    } else if status.is_server_error() {
        Some(Failure::retry(error))
    } else if status.is_client_error() {
        Some(Failure::reject(error))
    } else {
        None
    }
}

fn judge_transport(e: reqwest::Error) -> Failure {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        Failure::retry(GeocodeError::Http(e))
    } else {
        Failure::reject(GeocodeError::Http(e))
    }
}

/// Sends the request built by `build_request` under `policy` and decodes
/// the body as JSON.
///
/// `build_request` runs once per attempt since sending consumes the
/// builder.
///
/// # Errors
///
/// Returns the last [`GeocodeError`] once retries are exhausted, the first
/// non-retryable one, or [`GeocodeError::Parse`] for a non-JSON body.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, GeocodeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    let response = loop {
        let failure = match build_request().send().await {
            Ok(response) => match judge_status(response.status()) {
                None => break response,
                Some(failure) => failure,
            },
            Err(e) => judge_transport(e),
        };

        if !failure.retryable || attempt >= policy.max_retries {
            return Err(failure.error);
        }

        attempt += 1;
        let delay = policy.delay(attempt);
        log::warn!(
            "Geocoder request failed ({}); retry {attempt}/{} in {delay:?}",
            failure.error,
            policy.max_retries
        );
        tokio::time::sleep(delay).await;
    };

    let url = response.url().clone();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::warn!("Undecodable response from {url}: {e}\n  body: {preview}");
        GeocodeError::Parse {
            message: format!("invalid JSON from {url}: {e}"),
        }
    })
}
