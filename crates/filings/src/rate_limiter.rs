//! Token bucket rate limiter shared by every worker that talks to a provider.
//!
//! SEC EDGAR allows 10 requests per second per client; a single limiter
//! instance must therefore be shared (through `Arc`) by all sources hitting
//! the same host.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    /// Tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            tokens: config.burst_capacity,
            last_update: Instant::now(),
            rate: config.requests_per_second,
            capacity: config.burst_capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Takes a token, or returns how long until one is available.
    fn take(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.rate))
        }
    }
}

/// Rate limit for one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    /// Tokens available at once. `1.0` spaces requests evenly.
    pub burst_capacity: f64,
}

impl RateLimitConfig {
    pub fn per_second(requests: u32) -> Self {
        Self {
            requests_per_second: f64::from(requests.max(1)),
            burst_capacity: 1.0,
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self {
            requests_per_second: f64::from(requests.max(1)) / 60.0,
            burst_capacity: 1.0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_second(1)
    }
}

/// Thread-safe rate limiter holding one bucket per provider id.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    configs: Mutex<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a limiter with one configured provider.
    pub fn with_provider(provider: &str, config: RateLimitConfig) -> Self {
        let limiter = Self::new();
        limiter.configure(provider, config);
        limiter
    }

    // A poisoned lock only means a panic happened mid-refill; the bucket
    // state is still usable.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Sets the limit for `provider`, resetting its bucket.
    pub fn configure(&self, provider: &str, config: RateLimitConfig) {
        self.lock_configs().insert(provider.to_string(), config);
        self.lock_buckets().remove(provider);
    }

    fn config_for(&self, provider: &str) -> RateLimitConfig {
        self.lock_configs()
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Waits until a token for `provider` is available and takes it.
    pub async fn acquire(&self, provider: &str) {
        loop {
            let wait = {
                let config = self.config_for(provider);
                let mut buckets = self.lock_buckets();
                let bucket = buckets
                    .entry(provider.to_string())
                    .or_insert_with(|| TokenBucket::new(&config));
                match bucket.take() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            debug!("Rate limiter: waiting {:?} for '{}'", wait, provider);
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a token without waiting. Returns false when rate limited.
    pub fn try_acquire(&self, provider: &str) -> bool {
        let config = self.config_for(provider);
        let mut buckets = self.lock_buckets();
        buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::new(&config))
            .take()
            .is_ok()
    }
}
