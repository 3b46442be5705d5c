//! Bearer-token JSON filing API.
//!
//! For deployments that mirror EDGAR behind an authenticated gateway. The
//! gateway issues tokens through a client-credentials exchange and serves
//! `GET {base}/filers/{id}/filings/{period}/information-table`:
//!
//! ```json
//! {
//!   "format": "xml",
//!   "filingDate": "2024-05-15",
//!   "accessionNumber": "0000950123-24-004444",
//!   "formType": "13F-HR",
//!   "document": "<informationTable>...</informationTable>"
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::credentials::{AccessToken, CredentialCache, TokenProvider};
use super::{check_status, map_send_error, FilingSource};
use crate::errors::FetchError;
use crate::models::{DocumentFormat, DocumentMetadata, FilingDocument, FilingRequest};
use crate::rate_limiter::RateLimiter;

const PROVIDER_ID: &str = "FILING_API";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilingResponse {
    format: Option<String>,
    filing_date: Option<String>,
    accession_number: Option<String>,
    form_type: Option<String>,
    document: String,
}

/// Exchanges a client id/secret pair for an access token.
pub struct ClientCredentialsTokenProvider {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentialsTokenProvider {
    pub fn new(token_url: String, client_id: String, client_secret: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token_url,
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn issue_token(&self) -> Result<AccessToken, FetchError> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER_ID, e))?;

        let body: TokenResponse = check_status(PROVIDER_ID, response)?
            .json()
            .await
            .map_err(|e| FetchError::provider(PROVIDER_ID, format!("Invalid token response: {}", e)))?;

        Ok(AccessToken {
            value: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in.max(0)),
        })
    }
}

pub struct ApiFilingSource {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialCache>,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiFilingSource {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<CredentialCache>,
        rate_limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            rate_limiter,
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.rate_limiter.acquire(PROVIDER_ID).await;
        let token = self.credentials.token().await?;
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| map_send_error(PROVIDER_ID, e))
    }
}

#[async_trait]
impl FilingSource for ApiFilingSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch(&self, request: &FilingRequest) -> Result<FilingDocument, FetchError> {
        let url = format!(
            "{}/filers/{}/filings/{}/information-table",
            self.base_url, request.external_filer_id, request.period
        );
        debug!("Filing API request: {}", url);

        let mut response = self.send(&url).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Tokens can be revoked before their advertised expiry.
            warn!("Filing API rejected the access token, refreshing once");
            self.credentials.invalidate().await;
            response = self.send(&url).await?;
        }

        let body: FilingResponse = check_status(PROVIDER_ID, response)?
            .json()
            .await
            .map_err(|e| FetchError::provider(PROVIDER_ID, format!("Invalid filing response: {}", e)))?;

        let content = body.document.into_bytes();
        let declared = body.format.as_deref().map(|f| match f.to_ascii_lowercase().as_str() {
            "xml" => "application/xml",
            "tsv" => "text/tab-separated-values",
            _ => "application/octet-stream",
        });
        let format = DocumentFormat::detect(declared, None, &content);

        info!(
            "Fetched information table for {} {} from filing API ({} bytes)",
            request.investor_id,
            request.period,
            content.len()
        );

        Ok(FilingDocument::new(
            content,
            DocumentMetadata {
                format,
                content_type: declared.map(str::to_string),
                source_url: url,
                period: request.period,
                filing_date: body
                    .filing_date
                    .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                accession_number: body.accession_number,
                form_type: body.form_type,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filing_response_shape() {
        let json = r#"{
            "format": "tsv",
            "filingDate": "2024-05-15",
            "accessionNumber": "0000950123-24-004444",
            "formType": "13F-HR",
            "document": "NAMEOFISSUER\tCUSIP\tVALUE\tSSHPRNAMT\n"
        }"#;
        let parsed: FilingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.format.as_deref(), Some("tsv"));
        assert_eq!(parsed.form_type.as_deref(), Some("13F-HR"));
    }

    #[test]
    fn test_token_response_shape() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","token_type":"Bearer","expires_in":86400}"#)
                .unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert_eq!(parsed.expires_in, 86400);
    }
}
