use std::time::Duration;

use async_trait::async_trait;

use crate::checkpoints::checkpoints_model::{
    Checkpoint, CheckpointFilter, FailureKind, WorkUnitKey,
};
use crate::errors::Result;

/// Durable per-unit progress records.
///
/// Every state change is atomic with respect to concurrent callers: of N
/// workers racing to `claim` the same unit, exactly one succeeds. Rejected
/// transitions surface as [`crate::errors::CheckpointError`] wrapped in
/// [`crate::Error::Checkpoint`].
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the checkpoint for `key`, creating a PENDING one if absent.
    async fn find_or_create(&self, key: &WorkUnitKey) -> Result<Checkpoint>;

    /// Moves PENDING, SKIPPED, or FAILED with retries left to IN_PROGRESS.
    async fn claim(&self, key: &WorkUnitKey, max_retries: u32) -> Result<Checkpoint>;

    async fn complete(
        &self,
        key: &WorkUnitKey,
        holdings_count: u32,
        low_quality: bool,
    ) -> Result<Checkpoint>;

    /// Marks an IN_PROGRESS unit FAILED and consumes one retry.
    async fn fail(&self, key: &WorkUnitKey, reason: &str, kind: FailureKind)
        -> Result<Checkpoint>;

    /// Parks a unit without spending a retry. Exhausted units are refused
    /// with `RetryExhausted`.
    async fn skip(&self, key: &WorkUnitKey, reason: &str, max_retries: u32)
        -> Result<Checkpoint>;

    /// Fails every IN_PROGRESS unit whose claim is older than `stale_after`.
    async fn reclaim_stale(&self, stale_after: Duration) -> Result<Vec<Checkpoint>>;

    /// Returns a non-running unit to PENDING with a fresh retry budget.
    async fn reset(&self, key: &WorkUnitKey) -> Result<Checkpoint>;

    fn get(&self, key: &WorkUnitKey) -> Result<Option<Checkpoint>>;

    fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>>;

    /// FAILED units whose retry budget is spent.
    fn list_exhausted(&self, max_retries: u32) -> Result<Vec<Checkpoint>>;
}
