//! Bounded exponential backoff around a [`FilingSource`].
//!
//! Retries here happen within one claim of a work unit and never touch the
//! checkpoint's cross-cycle `retry_count`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use super::FilingSource;
use crate::errors::{FetchError, RetryClass};
use crate::models::{FilingDocument, FilingRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Relative jitter in `[0, 1]`; `0.25` spreads delays by ±25%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    ///
    /// A provider `Retry-After` hint replaces the computed backoff; both are
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }

        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || backoff.is_zero() {
            return backoff;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        backoff.mul_f64(factor).min(self.max_delay)
    }
}

/// Decorator that retries transient fetch failures with backoff.
pub struct RetryingSource {
    inner: Arc<dyn FilingSource>,
    policy: RetryPolicy,
}

impl RetryingSource {
    pub fn new(inner: Arc<dyn FilingSource>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl FilingSource for RetryingSource {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    async fn fetch(&self, request: &FilingRequest) -> Result<FilingDocument, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.fetch(request).await {
                Ok(document) => return Ok(document),
                Err(error)
                    if error.retry_class() == RetryClass::WithBackoff
                        && attempt < max_attempts =>
                {
                    let delay = self.policy.delay_for(attempt, error.retry_after());
                    warn!(
                        "{} fetch for {} {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        self.inner.id(),
                        request.investor_id,
                        request.period,
                        attempt,
                        max_attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentFormat, DocumentMetadata, FilingPeriod};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<(), FetchError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<(), FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl FilingSource for ScriptedSource {
        fn id(&self) -> &'static str {
            "SCRIPTED"
        }

        async fn fetch(&self, request: &FilingRequest) -> Result<FilingDocument, FetchError> {
            *self.calls.lock().unwrap() += 1;
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            next.map(|_| {
                FilingDocument::new(
                    b"<informationTable/>".to_vec(),
                    DocumentMetadata {
                        format: DocumentFormat::XmlInfoTable,
                        content_type: None,
                        source_url: "https://example.test/doc.xml".to_string(),
                        period: request.period,
                        filing_date: None,
                        accession_number: None,
                        form_type: None,
                    },
                )
            })
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
        }
    }

    fn request() -> FilingRequest {
        let period: FilingPeriod = "2024Q1".parse().unwrap();
        FilingRequest::new("buffett", "1067983", period)
    }

    fn timeout() -> FetchError {
        FetchError::Timeout {
            provider: "SCRIPTED".to_string(),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let inner = Arc::new(ScriptedSource::new(vec![Err(timeout()), Err(timeout()), Ok(())]));
        let source = RetryingSource::new(inner.clone(), fast_policy(4));

        assert!(source.fetch(&request()).await.is_ok());
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(ScriptedSource::new(vec![
            Err(timeout()),
            Err(timeout()),
            Err(timeout()),
        ]));
        let source = RetryingSource::new(inner.clone(), fast_policy(3));

        let result = source.fetch(&request()).await;
        assert!(matches!(result, Err(FetchError::Timeout { .. })));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let inner = Arc::new(ScriptedSource::new(vec![Err(FetchError::NotFound(
            "not yet".to_string(),
        ))]));
        let source = RetryingSource::new(inner.clone(), fast_policy(4));

        let result = source.fetch(&request()).await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_is_not_retried() {
        let inner = Arc::new(ScriptedSource::new(vec![Err(FetchError::provider(
            "SCRIPTED",
            "HTTP 401",
        ))]));
        let source = RetryingSource::new(inner.clone(), fast_policy(4));

        assert!(source.fetch(&request()).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_honours_retry_after() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(600))),
            policy.max_delay
        );
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }
}
