//! Holdwatch Filings Crate
//!
//! Provider-agnostic access to quarterly 13F institutional holdings
//! disclosures.
//!
//! # Overview
//!
//! ```text
//! FilingRequest (investor, CIK, period)
//!        |
//!        v
//! +------------------+   RetryingSource -> EdgarFilingSource / ApiFilingSource
//! |   FilingSource   |   (shared RateLimiter, CredentialCache)
//! +------------------+
//!        |  FilingDocument (bytes + DocumentMetadata)
//!        v
//! +------------------+   select_parser(metadata)
//! |   FilingParser   |   -> XmlInfoTableParser / TsvInfoTableParser
//! +------------------+
//!        |  Vec<ParsedHolding> (CUSIP keyed)
//!        v
//! +------------------+
//! |  TickerResolver  |   OpenFIGI + built-in table
//! +------------------+
//! ```
//!
//! Nothing here knows about checkpoints or persistence; that lives in
//! `holdwatch-core`.

pub mod errors;
pub mod models;
pub mod parser;
pub mod rate_limiter;
pub mod source;
pub mod tickers;

pub use errors::{FetchError, ParseError, ParseErrorKind, RetryClass};
pub use models::{
    DocumentFormat, DocumentMetadata, FilingDocument, FilingPeriod, FilingRequest, InvalidPeriod,
    ParsedHolding, ValueUnit,
};
pub use parser::{select_parser, FilingParser, TsvInfoTableParser, XmlInfoTableParser};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use source::{
    AccessToken, ApiFilingSource, ClientCredentialsTokenProvider, CredentialCache, EdgarConfig,
    EdgarFilingSource, FilingSource, RetryPolicy, RetryingSource, TokenProvider,
    EDGAR_PROVIDER_ID,
};
pub use tickers::{OpenFigiResolver, StaticTickerResolver, TickerResolver};
