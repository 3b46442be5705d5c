//! Cached bearer credentials with single-flight refresh.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::FetchError;

/// A bearer token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> bool {
        instant < self.expires_at
    }
}

/// Issues new access tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue_token(&self) -> Result<AccessToken, FetchError>;
}

/// Owns the current token and its expiry.
///
/// The token is refreshed lazily when absent or within `refresh_margin` of
/// expiry. The lock is held across the refresh, so concurrent callers that
/// find the token expired wait for the one in-flight refresh instead of each
/// issuing their own.
pub struct CredentialCache {
    provider: Arc<dyn TokenProvider>,
    refresh_margin: Duration,
    current: Mutex<Option<AccessToken>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_margin(provider, Duration::minutes(5))
    }

    pub fn with_margin(provider: Arc<dyn TokenProvider>, refresh_margin: Duration) -> Self {
        Self {
            provider,
            refresh_margin,
            current: Mutex::new(None),
        }
    }

    /// Returns a token valid for at least `refresh_margin`.
    pub async fn token(&self) -> Result<String, FetchError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if token.is_valid_at(Utc::now() + self.refresh_margin) {
                return Ok(token.value.clone());
            }
            debug!("Access token expires at {}, refreshing", token.expires_at);
        }

        let fresh = self.provider.issue_token().await?;
        info!("Issued new access token valid until {}", fresh.expires_at);
        let value = fresh.value.clone();
        *current = Some(fresh);
        Ok(value)
    }

    /// Drops the cached token, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        issued: AtomicUsize,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenProvider for CountingProvider {
        async fn issue_token(&self) -> Result<AccessToken, FetchError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            // Widen the race window.
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(AccessToken {
                value: format!("token-{}", n),
                expires_at: Utc::now() + self.lifetime,
            })
        }
    }

    fn provider(lifetime: Duration) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            issued: AtomicUsize::new(0),
            lifetime,
        })
    }

    #[tokio::test]
    async fn test_token_is_reused_until_expiry() {
        let provider = provider(Duration::hours(24));
        let cache = CredentialCache::new(provider.clone());

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(provider.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let provider = provider(Duration::hours(24));
        let cache = Arc::new(CredentialCache::new(provider.clone()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(provider.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        // Lifetime shorter than the default 5 minute margin.
        let provider = provider(Duration::minutes(1));
        let cache = CredentialCache::new(provider.clone());

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let provider = provider(Duration::hours(24));
        let cache = CredentialCache::new(provider.clone());

        cache.token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }
}
