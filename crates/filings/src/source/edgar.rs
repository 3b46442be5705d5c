//! SEC EDGAR filing source.
//!
//! Resolution takes three requests, each through the shared rate limiter:
//!
//! 1. `data.sec.gov/submissions/CIK##########.json` lists recent filings;
//!    the 13F-HR whose `reportDate` is the period end is selected.
//! 2. `Archives/edgar/data/{cik}/{accession}/index.json` lists the filing's
//!    documents; the largest XML other than `primary_doc.xml` is the
//!    information table.
//! 3. The information table itself.
//!
//! EDGAR requires a descriptive `User-Agent` and allows 10 requests/second.
//! When throttled it may serve an HTML page with status 200; that is
//! reported as [`FetchError::RateLimited`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::{check_status, map_send_error, FilingSource};
use crate::errors::FetchError;
use crate::models::{
    DocumentFormat, DocumentMetadata, FilingDocument, FilingPeriod, FilingRequest,
};
use crate::rate_limiter::RateLimiter;

pub const EDGAR_PROVIDER_ID: &str = "SEC_EDGAR";

const SUBMISSIONS_BASE_URL: &str = "https://data.sec.gov";
const ARCHIVES_BASE_URL: &str = "https://www.sec.gov";

const FORM_ORIGINAL: &str = "13F-HR";
const FORM_AMENDMENT: &str = "13F-HR/A";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmissionsResponse {
    filings: SubmissionsFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionsFilings {
    recent: RecentFilings,
}

/// Column-oriented list of recent filings, newest first.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    report_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    directory: IndexDirectory,
}

#[derive(Debug, Deserialize)]
struct IndexDirectory {
    #[serde(default)]
    item: Vec<IndexItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexItem {
    name: String,
    /// Reported as a string, empty for sub-directories.
    #[serde(default)]
    size: serde_json::Value,
}

impl IndexItem {
    fn size_bytes(&self) -> u64 {
        self.size
            .as_u64()
            .or_else(|| self.size.as_str().and_then(|s| s.trim().parse().ok()))
            .unwrap_or(0)
    }
}

/// The filing chosen for a period.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FilingRef {
    accession_number: String,
    filing_date: Option<NaiveDate>,
    form: String,
}

// ============================================================================
// EdgarFilingSource
// ============================================================================

/// Connection settings for [`EdgarFilingSource`].
#[derive(Debug, Clone)]
pub struct EdgarConfig {
    /// `"Company Name admin@example.com"` per SEC fair-access policy.
    pub user_agent: String,
    pub timeout: Duration,
    pub submissions_base_url: String,
    pub archives_base_url: String,
}

impl EdgarConfig {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout: Duration::from_secs(30),
            submissions_base_url: SUBMISSIONS_BASE_URL.to_string(),
            archives_base_url: ARCHIVES_BASE_URL.to_string(),
        }
    }
}

pub struct EdgarFilingSource {
    client: Client,
    config: EdgarConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl EdgarFilingSource {
    pub fn new(config: EdgarConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            rate_limiter,
        }
    }

    /// GETs `url` and returns the body with its declared content type.
    async fn get_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>), FetchError> {
        self.rate_limiter.acquire(EDGAR_PROVIDER_ID).await;
        debug!("EDGAR request: {}", url);

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| map_send_error(EDGAR_PROVIDER_ID, e))?;
        let response = check_status(EDGAR_PROVIDER_ID, response)?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| map_send_error(EDGAR_PROVIDER_ID, e))?;

        Ok((body.to_vec(), content_type))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let (body, content_type) = self.get_bytes(url).await?;
        if DocumentFormat::detect(content_type.as_deref(), None, &body) == DocumentFormat::Html {
            return Err(throttled());
        }
        serde_json::from_slice(&body).map_err(|e| {
            FetchError::provider(EDGAR_PROVIDER_ID, format!("Invalid JSON from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl FilingSource for EdgarFilingSource {
    fn id(&self) -> &'static str {
        EDGAR_PROVIDER_ID
    }

    async fn fetch(&self, request: &FilingRequest) -> Result<FilingDocument, FetchError> {
        let cik = normalize_cik(&request.external_filer_id)?;
        let period = request.period;

        let submissions_url = format!(
            "{}/submissions/CIK{:010}.json",
            self.config.submissions_base_url, cik
        );
        let submissions: SubmissionsResponse =
            self.get_json(&submissions_url).await.map_err(|e| match e {
                // An unknown CIK is a configuration problem, not an unpublished filing.
                FetchError::NotFound(_) => {
                    FetchError::provider(EDGAR_PROVIDER_ID, format!("Unknown CIK {}", cik))
                }
                other => other,
            })?;

        let filing = select_filing(&submissions.filings.recent, period).ok_or_else(|| {
            FetchError::NotFound(format!("No 13F-HR for CIK {} period {}", cik, period))
        })?;

        let folder = filing.accession_number.replace('-', "");
        let index_url = format!(
            "{}/Archives/edgar/data/{}/{}/index.json",
            self.config.archives_base_url, cik, folder
        );
        let index: IndexResponse = self.get_json(&index_url).await?;

        let item = select_information_table(&index.directory.item).ok_or_else(|| {
            FetchError::provider(
                EDGAR_PROVIDER_ID,
                format!(
                    "Filing {} has no information table document",
                    filing.accession_number
                ),
            )
        })?;

        let document_url = format!(
            "{}/Archives/edgar/data/{}/{}/{}",
            self.config.archives_base_url, cik, folder, item.name
        );
        let (content, content_type) = self.get_bytes(&document_url).await?;

        let format = DocumentFormat::detect(content_type.as_deref(), Some(&item.name), &content);
        if format == DocumentFormat::Html {
            return Err(throttled());
        }

        info!(
            "Fetched {} for {} {} ({} bytes, {})",
            filing.form,
            request.investor_id,
            period,
            content.len(),
            filing.accession_number
        );

        Ok(FilingDocument::new(
            content,
            DocumentMetadata {
                format,
                content_type,
                source_url: document_url,
                period,
                filing_date: filing.filing_date,
                accession_number: Some(filing.accession_number),
                form_type: Some(filing.form),
            },
        ))
    }
}

fn throttled() -> FetchError {
    FetchError::RateLimited {
        provider: EDGAR_PROVIDER_ID.to_string(),
        retry_after: None,
    }
}

/// Accepts `"1067983"`, `"0001067983"` and `"CIK0001067983"`.
fn normalize_cik(raw: &str) -> Result<u64, FetchError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("CIK")
        .or_else(|| trimmed.strip_prefix("cik"))
        .unwrap_or(trimmed);
    digits
        .parse::<u64>()
        .map_err(|_| FetchError::provider(EDGAR_PROVIDER_ID, format!("Invalid CIK '{}'", raw)))
}

/// Picks the filing reporting `period`. The original 13F-HR wins over
/// amendments; without one, the most recent amendment is used.
fn select_filing(recent: &RecentFilings, period: FilingPeriod) -> Option<FilingRef> {
    let period_end = period.end_date().format("%Y-%m-%d").to_string();

    let candidates: Vec<FilingRef> = recent
        .form
        .iter()
        .enumerate()
        .filter(|(_, form)| form.as_str() == FORM_ORIGINAL || form.as_str() == FORM_AMENDMENT)
        .filter(|(i, _)| recent.report_date.get(*i) == Some(&period_end))
        .filter_map(|(i, form)| {
            let accession_number = recent.accession_number.get(i)?.clone();
            let filing_date = recent
                .filing_date
                .get(i)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            Some(FilingRef {
                accession_number,
                filing_date,
                form: form.clone(),
            })
        })
        .collect();

    candidates
        .iter()
        .find(|f| f.form == FORM_ORIGINAL)
        .or_else(|| candidates.first())
        .cloned()
}

/// Picks the largest XML document that is not the cover page.
fn select_information_table(items: &[IndexItem]) -> Option<&IndexItem> {
    items
        .iter()
        .filter(|item| {
            let name = item.name.to_ascii_lowercase();
            name.ends_with(".xml") && name != "primary_doc.xml"
        })
        .max_by_key(|item| item.size_bytes())
}
