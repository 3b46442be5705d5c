//! Filing requests and fetched documents.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::FilingPeriod;

/// First filing date on which information-table values are reported in
/// dollars rather than thousands of dollars.
pub const DOLLAR_VALUES_EFFECTIVE: (i32, u32, u32) = (2023, 1, 3);

/// Which investor and period to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingRequest {
    pub investor_id: String,
    /// The filer's id at the provider (SEC CIK).
    pub external_filer_id: String,
    pub period: FilingPeriod,
}

impl FilingRequest {
    pub fn new(
        investor_id: impl Into<String>,
        external_filer_id: impl Into<String>,
        period: FilingPeriod,
    ) -> Self {
        Self {
            investor_id: investor_id.into(),
            external_filer_id: external_filer_id.into(),
            period,
        }
    }
}

/// Physical layout of an information table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentFormat {
    /// EDGAR `informationTable` XML.
    XmlInfoTable,
    /// Tab-separated `INFOTABLE.tsv` from the structured 13F data sets.
    TsvInfoTable,
    /// An HTML page where a data document was expected.
    Html,
    Unknown,
}

impl DocumentFormat {
    /// Detects the format from the declared content type, the file name and
    /// the document's leading bytes.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>, leading: &[u8]) -> Self {
        let head = String::from_utf8_lossy(&leading[..leading.len().min(256)])
            .trim_start_matches('\u{feff}')
            .trim_start()
            .to_ascii_lowercase();

        if head.starts_with("<!doctype html") || head.starts_with("<html") {
            return Self::Html;
        }
        if head.starts_with('<') {
            return Self::XmlInfoTable;
        }

        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        let file_name = file_name.unwrap_or_default().to_ascii_lowercase();
        if content_type.contains("xml") || file_name.ends_with(".xml") {
            return Self::XmlInfoTable;
        }
        if content_type.contains("tab-separated")
            || file_name.ends_with(".tsv")
            || head
                .lines()
                .next()
                .is_some_and(|header| header.contains('\t') && header.contains("nameofissuer"))
        {
            return Self::TsvInfoTable;
        }
        Self::Unknown
    }
}

/// Unit of the `value` column in an information table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueUnit {
    Thousands,
    Dollars,
}

impl ValueUnit {
    /// Filings made before January 3, 2023 report values in thousands.
    /// Without a filing date the period end decides: anything for 2022Q4 or
    /// later was filed under the dollar rule.
    pub fn for_filing(filing_date: Option<NaiveDate>, period: FilingPeriod) -> Self {
        let (y, m, d) = DOLLAR_VALUES_EFFECTIVE;
        let cutover = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
        match filing_date {
            Some(date) if date < cutover => Self::Thousands,
            Some(_) => Self::Dollars,
            None if period.year() >= 2023 || (period.year() == 2022 && period.quarter() == 4) => {
                Self::Dollars
            }
            None => Self::Thousands,
        }
    }
}

/// Metadata describing a fetched document; the only input parser selection
/// depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub format: DocumentFormat,
    pub content_type: Option<String>,
    pub source_url: String,
    pub period: FilingPeriod,
    pub filing_date: Option<NaiveDate>,
    pub accession_number: Option<String>,
    /// `13F-HR` or `13F-HR/A`.
    pub form_type: Option<String>,
}

impl DocumentMetadata {
    pub fn value_unit(&self) -> ValueUnit {
        ValueUnit::for_filing(self.filing_date, self.period)
    }
}

/// A raw filing document as returned by a source.
#[derive(Debug, Clone)]
pub struct FilingDocument {
    pub content: Vec<u8>,
    pub metadata: DocumentMetadata,
}

impl FilingDocument {
    pub fn new(content: Vec<u8>, metadata: DocumentMetadata) -> Self {
        Self { content, metadata }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
