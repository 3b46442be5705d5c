use async_trait::async_trait;

use holdwatch_filings::FilingPeriod;

use crate::errors::Result;
use crate::holdings::holdings_model::{Holding, HoldingSnapshot};

/// Trait for holdings persistence.
#[async_trait]
pub trait HoldingsStore: Send + Sync {
    /// Atomically replaces every row of the snapshot's unit with its
    /// holdings. Returns the number of rows written.
    async fn replace_snapshot(&self, snapshot: HoldingSnapshot) -> Result<usize>;

    fn get_snapshot(&self, investor_id: &str, period: FilingPeriod)
        -> Result<Option<HoldingSnapshot>>;

    /// The snapshot of the most recent period whose unit completed
    /// successfully.
    fn latest_snapshot(&self, investor_id: &str) -> Result<Option<HoldingSnapshot>>;

    /// Holdings of `ticker` taken from each investor's latest successful
    /// snapshot.
    fn holders_of(&self, ticker: &str) -> Result<Vec<Holding>>;
}
