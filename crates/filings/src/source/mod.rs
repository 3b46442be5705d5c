//! Filing sources.
//!
//! A [`FilingSource`] fetches one raw information-table document for an
//! (investor, period) pair. Implementations:
//!
//! - [`EdgarFilingSource`]: SEC EDGAR submissions and archive JSON
//! - [`ApiFilingSource`]: bearer-token JSON filing API
//! - [`RetryingSource`]: backoff decorator around any source

mod api;
mod credentials;
mod edgar;
mod retrying;

pub use api::{ApiFilingSource, ClientCredentialsTokenProvider};
pub use credentials::{AccessToken, CredentialCache, TokenProvider};
pub use edgar::{EdgarConfig, EdgarFilingSource, EDGAR_PROVIDER_ID};
pub use retrying::{RetryPolicy, RetryingSource};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Response, StatusCode};

use crate::errors::FetchError;
use crate::models::{FilingDocument, FilingRequest};

/// Fetches raw filing documents from an external provider.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Stable identifier used in logs and rate limiting.
    fn id(&self) -> &'static str;

    /// Fetches the information table for `request`.
    ///
    /// Returns [`FetchError::NotFound`] when the filing for the period has
    /// not been published.
    async fn fetch(&self, request: &FilingRequest) -> Result<FilingDocument, FetchError>;
}

/// Maps a transport failure to a [`FetchError`].
pub(crate) fn map_send_error(provider: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        FetchError::network(provider, format!("Request failed: {}", error))
    }
}

/// Passes successful responses through and classifies the rest.
pub(crate) fn check_status(provider: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited {
            provider: provider.to_string(),
            retry_after: parse_retry_after(&response),
        }),
        // EDGAR answers 403 when the fair-access threshold is exceeded.
        StatusCode::FORBIDDEN => Err(FetchError::RateLimited {
            provider: provider.to_string(),
            retry_after: parse_retry_after(&response),
        }),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound(response.url().to_string())),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(FetchError::Timeout {
            provider: provider.to_string(),
        }),
        s if s.is_server_error() => Err(FetchError::network(provider, format!("HTTP {}", s))),
        s => Err(FetchError::provider(provider, format!("HTTP {}", s))),
    }
}

/// Reads `Retry-After` in its delta-seconds form.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
