//! OpenFIGI mapping API resolver.
//!
//! `POST https://api.openfigi.com/v3/mapping` with one job per CUSIP:
//! `[{"idType": "ID_CUSIP", "idValue": "037833100", "exchCode": "US"}]`.
//! The response is an array aligned with the jobs, each element holding
//! either `data` or a `warning`/`error`.
//!
//! Anonymous clients may send 10 jobs per request and 25 requests per
//! minute; with an API key the limits are 100 jobs and 250 requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{fallback_ticker, TickerResolver};
use crate::errors::FetchError;
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::source::{check_status, map_send_error};

pub const OPENFIGI_PROVIDER_ID: &str = "OPENFIGI";

const MAPPING_URL: &str = "https://api.openfigi.com/v3/mapping";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MappingJob<'a> {
    id_type: &'static str,
    id_value: &'a str,
    exch_code: &'static str,
}

#[derive(Debug, Deserialize)]
struct MappingResult {
    #[serde(default)]
    data: Vec<FigiRecord>,
    #[serde(default)]
    warning: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FigiRecord {
    ticker: Option<String>,
}

pub struct OpenFigiResolver {
    client: Client,
    api_key: Option<String>,
    mapping_url: String,
    rate_limiter: Arc<RateLimiter>,
    /// `None` records a CUSIP OpenFIGI does not know.
    cache: DashMap<String, Option<String>>,
}

impl OpenFigiResolver {
    pub fn new(api_key: Option<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        let per_minute = if api_key.is_some() { 250 } else { 25 };
        rate_limiter.configure(OPENFIGI_PROVIDER_ID, RateLimitConfig::per_minute(per_minute));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            mapping_url: MAPPING_URL.to_string(),
            rate_limiter,
            cache: DashMap::new(),
        }
    }

    pub fn with_mapping_url(mut self, url: impl Into<String>) -> Self {
        self.mapping_url = url.into();
        self
    }

    fn batch_size(&self) -> usize {
        if self.api_key.is_some() {
            100
        } else {
            10
        }
    }

    async fn map_batch(&self, cusips: &[String]) -> Result<Vec<Option<String>>, FetchError> {
        self.rate_limiter.acquire(OPENFIGI_PROVIDER_ID).await;

        let jobs: Vec<MappingJob<'_>> = cusips
            .iter()
            .map(|cusip| MappingJob {
                id_type: "ID_CUSIP",
                id_value: cusip,
                exch_code: "US",
            })
            .collect();

        let mut request = self.client.post(&self.mapping_url).json(&jobs);
        if let Some(key) = &self.api_key {
            request = request.header("X-OPENFIGI-APIKEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(OPENFIGI_PROVIDER_ID, e))?;
        let results: Vec<MappingResult> = check_status(OPENFIGI_PROVIDER_ID, response)?
            .json()
            .await
            .map_err(|e| {
                FetchError::provider(OPENFIGI_PROVIDER_ID, format!("Invalid response: {}", e))
            })?;

        if results.len() != cusips.len() {
            return Err(FetchError::provider(
                OPENFIGI_PROVIDER_ID,
                format!("Expected {} results, got {}", cusips.len(), results.len()),
            ));
        }

        Ok(results.into_iter().map(first_ticker).collect())
    }
}

/// First ticker of a mapping result, normalized to the dotted share-class
/// form (`BRK/B` becomes `BRK.B`).
fn first_ticker(result: MappingResult) -> Option<String> {
    if let Some(message) = result.error.as_ref().or(result.warning.as_ref()) {
        debug!("OpenFIGI: {}", message);
    }
    result
        .data
        .into_iter()
        .find_map(|record| record.ticker)
        .map(|ticker| ticker.trim().replace(['/', ' '], ".").to_ascii_uppercase())
        .filter(|ticker| !ticker.is_empty())
}

#[async_trait]
impl TickerResolver for OpenFigiResolver {
    async fn resolve(&self, cusips: &[String]) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        let mut pending: Vec<String> = Vec::new();

        for cusip in cusips {
            let cusip = cusip.trim().to_ascii_uppercase();
            if resolved.contains_key(&cusip) || pending.contains(&cusip) {
                continue;
            }
            if let Some(cached) = self.cache.get(&cusip) {
                if let Some(ticker) = cached.value() {
                    resolved.insert(cusip.clone(), ticker.clone());
                }
                continue;
            }
            if let Some(ticker) = fallback_ticker(&cusip) {
                self.cache.insert(cusip.clone(), Some(ticker.to_string()));
                resolved.insert(cusip, ticker.to_string());
                continue;
            }
            pending.push(cusip);
        }

        for batch in pending.chunks(self.batch_size()) {
            match self.map_batch(batch).await {
                Ok(tickers) => {
                    for (cusip, ticker) in batch.iter().zip(tickers) {
                        if let Some(ticker) = &ticker {
                            resolved.insert(cusip.clone(), ticker.clone());
                        }
                        self.cache.insert(cusip.clone(), ticker);
                    }
                }
                Err(e) => {
                    // Not cached: the next snapshot retries these CUSIPs.
                    warn!("OpenFIGI lookup of {} CUSIPs failed: {}", batch.len(), e);
                }
            }
        }

        debug!(
            "Resolved {}/{} CUSIPs to tickers",
            resolved.len(),
            cusips.len()
        );
        resolved
    }
}
