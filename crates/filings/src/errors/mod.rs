//! Error types and retry classification for the filings crate.
//!
//! - [`FetchError`]: failures talking to a filing source
//! - [`ParseError`]: failures turning a fetched document into holdings
//! - [`RetryClass`]: how the collector should react to a [`FetchError`]

mod retry;

pub use retry::RetryClass;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while fetching a filing document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The filing for the requested period has not been published (yet).
    #[error("Filing not found: {0}")]
    NotFound(String),

    /// The provider throttled the request (HTTP 429, or an HTML throttle page).
    #[error("Rate limited: {provider}")]
    RateLimited {
        provider: String,
        /// Delay requested by the provider through `Retry-After`.
        retry_after: Option<Duration>,
    },

    /// Connection failure or 5xx response.
    #[error("Network error: {provider} - {message}")]
    Network { provider: String, message: String },

    /// The request exceeded the client timeout.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// The provider rejected the request or answered with something unusable.
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },
}

impl FetchError {
    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use holdwatch_filings::errors::{FetchError, RetryClass};
    ///
    /// let error = FetchError::Timeout { provider: "SEC_EDGAR".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = FetchError::NotFound("CIK0001067983 2024Q1".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::NotPublished);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::NotFound(_) => RetryClass::NotPublished,
            Self::RateLimited { .. } | Self::Network { .. } | Self::Timeout { .. } => {
                RetryClass::WithBackoff
            }
            Self::Provider { .. } => RetryClass::Never,
        }
    }

    /// Provider-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn network(provider: &str, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// What went wrong while parsing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The document is not well-formed for its declared format.
    Malformed,
    /// No parser exists for the document's format.
    UnsupportedFormat,
    /// The document has no information table at all.
    MissingTable,
    /// A holding row lacks a required field.
    MissingField,
    /// A numeric field could not be read.
    InvalidNumber,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Malformed => "malformed document",
            Self::UnsupportedFormat => "unsupported format",
            Self::MissingTable => "missing information table",
            Self::MissingField => "missing field",
            Self::InvalidNumber => "invalid number",
        };
        f.write_str(label)
    }
}

/// A document could not be turned into holdings.
///
/// Carries the offending fragment and its byte offset so that a failing
/// filing can be diagnosed from the checkpoint's `fail_reason` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub fragment: Option<String>,
    pub offset: Option<u64>,
}

/// Fragments longer than this are truncated in error messages.
const MAX_FRAGMENT_CHARS: usize = 120;

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fragment: None,
            offset: None,
        }
    }

    pub fn with_fragment(mut self, fragment: impl AsRef<str>) -> Self {
        let fragment = fragment.as_ref();
        let truncated: String = fragment.chars().take(MAX_FRAGMENT_CHARS).collect();
        self.fragment = Some(truncated);
        self
    }

    pub fn at(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " (byte {})", offset)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, " near `{}`", fragment)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_retry_with_backoff() {
        let rate_limited = FetchError::RateLimited {
            provider: "SEC_EDGAR".to_string(),
            retry_after: Some(Duration::from_secs(10)),
        };
        assert_eq!(rate_limited.retry_class(), RetryClass::WithBackoff);
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(10)));

        let network = FetchError::network("SEC_EDGAR", "connection reset");
        assert_eq!(network.retry_class(), RetryClass::WithBackoff);
        assert_eq!(network.retry_after(), None);
    }

    #[test]
    fn test_provider_error_never_retries() {
        let error = FetchError::provider("FILING_API", "401 Unauthorized");
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_parse_error_display_includes_location() {
        let error = ParseError::new(ParseErrorKind::InvalidNumber, "value is not a number")
            .with_fragment("12,3x4")
            .at(512);
        assert_eq!(
            error.to_string(),
            "invalid number: value is not a number (byte 512) near `12,3x4`"
        );
    }

    #[test]
    fn test_parse_error_fragment_is_truncated() {
        let long = "x".repeat(500);
        let error = ParseError::new(ParseErrorKind::Malformed, "bad").with_fragment(&long);
        assert_eq!(error.fragment.map(|f| f.len()), Some(MAX_FRAGMENT_CHARS));
    }
}
