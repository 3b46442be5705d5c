//! CUSIP to exchange-ticker resolution.

mod fallback;
mod openfigi;

pub use fallback::fallback_ticker;
pub use openfigi::{OpenFigiResolver, OPENFIGI_PROVIDER_ID};

use std::collections::HashMap;

use async_trait::async_trait;

/// Maps CUSIPs to tickers.
///
/// Resolution is best effort: CUSIPs missing from the returned map are
/// unresolved, and a failed lookup never fails the caller.
#[async_trait]
pub trait TickerResolver: Send + Sync {
    async fn resolve(&self, cusips: &[String]) -> HashMap<String, String>;
}

/// Resolver backed only by the built-in table. Used in tests and when the
/// remote mapping service is disabled.
#[derive(Debug, Default, Clone)]
pub struct StaticTickerResolver;

#[async_trait]
impl TickerResolver for StaticTickerResolver {
    async fn resolve(&self, cusips: &[String]) -> HashMap<String, String> {
        cusips
            .iter()
            .filter_map(|cusip| {
                fallback_ticker(cusip).map(|ticker| (cusip.clone(), ticker.to_string()))
            })
            .collect()
    }
}
