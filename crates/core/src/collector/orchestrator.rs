use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use uuid::Uuid;

use holdwatch_filings::{
    select_parser, FetchError, FilingPeriod, FilingRequest, FilingSource, RetryClass,
    TickerResolver,
};

use super::collector_model::{
    CollectorConfig, CollectorStatus, CycleReport, UnitOutcome, UnitResult,
};
use crate::alerts::{AlertSink, CollectorAlert};
use crate::checkpoints::{
    Checkpoint, CheckpointFilter, CheckpointOperation, CheckpointStatus, CheckpointStore,
    FailureKind, WorkUnitKey,
};
use crate::errors::{Error, Result};
use crate::holdings::{HoldingSnapshot, HoldingsStore, PortfolioReconciler, ResolvedHolding};
use crate::investors::{InvestorDirectory, InvestorProfile};

const INACTIVE_REASON: &str = "Investor is inactive";

/// Why a claimed unit could not be collected.
#[derive(Debug)]
struct StepFailure {
    kind: FailureKind,
    reason: String,
}

impl StepFailure {
    fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    fn fetch(error: FetchError) -> Self {
        let kind = match error.retry_class() {
            RetryClass::WithBackoff => FailureKind::Transient,
            RetryClass::Never | RetryClass::NotPublished => FailureKind::Source,
        };
        Self::new(kind, error.to_string())
    }
}

enum Collected {
    Snapshot { holdings_count: u32, low_quality: bool },
    NotPublished(String),
}

/// Decrements the active cycle count when a run ends, however it ends.
struct ActiveRun<'a>(&'a AtomicUsize);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives work units through claim, fetch, parse, resolve, reconcile,
/// persist and complete.
///
/// The orchestrator holds no per-unit state of its own; everything needed to
/// resume after a crash lives in the [`CheckpointStore`].
pub struct CollectionOrchestrator {
    checkpoints: Arc<dyn CheckpointStore>,
    holdings: Arc<dyn HoldingsStore>,
    investors: Arc<dyn InvestorDirectory>,
    source: Arc<dyn FilingSource>,
    resolver: Arc<dyn TickerResolver>,
    alerts: Arc<dyn AlertSink>,
    reconciler: PortfolioReconciler,
    config: CollectorConfig,
    active_runs: AtomicUsize,
    stop_requested: AtomicBool,
}

impl CollectionOrchestrator {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        holdings: Arc<dyn HoldingsStore>,
        investors: Arc<dyn InvestorDirectory>,
        source: Arc<dyn FilingSource>,
        resolver: Arc<dyn TickerResolver>,
        alerts: Arc<dyn AlertSink>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            checkpoints,
            holdings,
            investors,
            source,
            resolver,
            alerts,
            reconciler: PortfolioReconciler::new(config.zero_total_policy),
            config,
            active_runs: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// The most recent elapsed quarters as of `today`, newest first.
    pub fn target_periods(&self, today: NaiveDate) -> Vec<FilingPeriod> {
        FilingPeriod::recent_elapsed(today, self.config.target_quarters)
    }

    /// Runs one collection cycle over the current target periods.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let periods = self.target_periods(Utc::now().date_naive());
        self.run_cycle_for(&periods).await
    }

    /// Runs one collection cycle over `periods`.
    ///
    /// Safe to call concurrently with other cycles: each unit is processed
    /// by whichever caller wins its claim.
    pub async fn run_cycle_for(&self, periods: &[FilingPeriod]) -> Result<CycleReport> {
        let _run = self.enter_run();
        let cycle_id = Uuid::new_v4().to_string();
        let mut report = CycleReport::new(cycle_id.clone(), Utc::now());
        info!(
            "Collection cycle {} started: {} periods, concurrency {}",
            cycle_id,
            periods.len(),
            self.config.concurrency
        );

        report.reclaimed = self.reclaim_stale().await?;

        let active = self.investors.active_investors()?;
        let skipped_inactive = self.skip_inactive(&active).await?;
        if skipped_inactive > 0 {
            info!("Skipped {} open units of inactive investors", skipped_inactive);
        }

        let mut work: Vec<(InvestorProfile, WorkUnitKey)> = Vec::new();
        for investor in &active {
            for period in periods {
                let key = WorkUnitKey::new(investor.investor_id.clone(), *period);
                let checkpoint = self.checkpoints.find_or_create(&key).await?;
                report.discovered += 1;
                if checkpoint.status == CheckpointStatus::Success
                    || checkpoint.is_exhausted(self.config.max_retries)
                {
                    continue;
                }
                work.push((investor.clone(), key));
            }
        }
        debug!(
            "Cycle {}: {} of {} units need collection",
            cycle_id,
            work.len(),
            report.discovered
        );

        let outcomes: Vec<UnitOutcome> = stream::iter(work)
            .map(|(investor, key)| self.process_unit(investor, key))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            report.record(outcome);
        }
        report.outcomes.sort_by(|a, b| a.key.cmp(&b.key));

        report.exhausted = self
            .checkpoints
            .list_exhausted(self.config.max_retries)?
            .iter()
            .map(Checkpoint::key)
            .collect();
        report.finished_at = Utc::now();

        info!(
            "Collection cycle {} finished: {} succeeded, {} failed, {} skipped, {} not claimed, {} exhausted{}",
            cycle_id,
            report.succeeded,
            report.failed,
            report.skipped,
            report.not_claimed,
            report.exhausted.len(),
            if report.cancelled { " (stopped early)" } else { "" }
        );
        Ok(report)
    }

    /// Collects a single unit on demand.
    ///
    /// Without `force` a collected unit is rejected with `AlreadyDone` and an
    /// exhausted one with `RetryExhausted`. With `force` any unit that is not
    /// currently running is reset first.
    pub async fn collect_unit(
        &self,
        investor_id: &str,
        period: FilingPeriod,
        force: bool,
    ) -> Result<UnitOutcome> {
        let _run = self.enter_run();
        let investor = self
            .investors
            .get_investor(investor_id)?
            .ok_or_else(|| Error::InvestorNotFound(investor_id.to_string()))?;
        let key = WorkUnitKey::new(investor.investor_id.clone(), period);
        let checkpoint = self.checkpoints.find_or_create(&key).await?;

        if !investor.active {
            self.checkpoints
                .skip(&key, INACTIVE_REASON, self.config.max_retries)
                .await?;
            return Ok(UnitOutcome::new(
                key,
                UnitResult::Skipped {
                    reason: INACTIVE_REASON.to_string(),
                },
            ));
        }

        let needs_reset = force
            && !matches!(
                checkpoint.status,
                CheckpointStatus::Pending | CheckpointStatus::InProgress
            );
        if needs_reset {
            info!("Force-resetting {} from {}", key, checkpoint.status);
            self.checkpoints.reset(&key).await?;
        } else {
            checkpoint.transition(CheckpointOperation::Claim, self.config.max_retries)?;
        }

        Ok(self.process_unit(investor, key).await)
    }

    /// Asks running cycles to stop claiming new units. Units already claimed
    /// run to completion.
    pub fn request_stop(&self) {
        if self.is_running() {
            info!("Collector stop requested");
        }
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.active_runs.load(Ordering::SeqCst) > 0
    }

    pub fn status(&self) -> CollectorStatus {
        let active_cycles = self.active_runs.load(Ordering::SeqCst);
        CollectorStatus {
            running: active_cycles > 0,
            active_cycles,
            stop_requested: self.stop_requested.load(Ordering::SeqCst),
        }
    }

    fn enter_run(&self) -> ActiveRun<'_> {
        if self.active_runs.fetch_add(1, Ordering::SeqCst) == 0 {
            self.stop_requested.store(false, Ordering::SeqCst);
        }
        ActiveRun(&self.active_runs)
    }

    async fn reclaim_stale(&self) -> Result<usize> {
        let reclaimed = self
            .checkpoints
            .reclaim_stale(self.config.stale_after)
            .await?;
        if reclaimed.is_empty() {
            return Ok(0);
        }

        let keys: Vec<WorkUnitKey> = reclaimed.iter().map(Checkpoint::key).collect();
        warn!(
            "Reclaimed {} stale units: {}",
            keys.len(),
            keys.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut alerts = vec![CollectorAlert::stale_units_reclaimed(keys)];
        for checkpoint in reclaimed
            .iter()
            .filter(|c| c.is_exhausted(self.config.max_retries))
        {
            alerts.push(CollectorAlert::retry_exhausted(
                checkpoint.key(),
                checkpoint.retry_count,
                checkpoint.fail_reason.clone().unwrap_or_default(),
            ));
        }
        self.alerts.emit_batch(alerts);

        Ok(reclaimed.len())
    }

    /// Skips pending or failed units that belong to investors no longer
    /// active. Exhausted units stay FAILED so they keep being reported.
    async fn skip_inactive(&self, active: &[InvestorProfile]) -> Result<usize> {
        let active_ids: HashSet<&str> = active.iter().map(|i| i.investor_id.as_str()).collect();
        let mut skipped = 0;

        for status in [CheckpointStatus::Pending, CheckpointStatus::Failed] {
            let open = self.checkpoints.list(&CheckpointFilter::with_status(status))?;
            for checkpoint in open
                .iter()
                .filter(|c| !active_ids.contains(c.investor_id.as_str()))
                .filter(|c| !c.is_exhausted(self.config.max_retries))
            {
                match self
                    .checkpoints
                    .skip(&checkpoint.key(), INACTIVE_REASON, self.config.max_retries)
                    .await
                {
                    Ok(_) => skipped += 1,
                    Err(Error::Checkpoint(rejection)) => {
                        debug!("Could not skip {}: {}", checkpoint.key(), rejection)
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(skipped)
    }

    async fn process_unit(&self, investor: InvestorProfile, key: WorkUnitKey) -> UnitOutcome {
        if self.stop_requested.load(Ordering::SeqCst) {
            debug!("Not claiming {}: stop requested", key);
            return UnitOutcome::new(key, UnitResult::Cancelled);
        }

        let claimed = match self.checkpoints.claim(&key, self.config.max_retries).await {
            Ok(checkpoint) => checkpoint,
            Err(Error::Checkpoint(rejection)) => {
                debug!("Not claiming {}: {}", key, rejection);
                return UnitOutcome::new(
                    key,
                    UnitResult::NotClaimed {
                        reason: rejection.to_string(),
                    },
                );
            }
            Err(e) => {
                error!("Failed to claim {}: {}", key, e);
                return UnitOutcome::new(
                    key,
                    UnitResult::Errored {
                        message: e.to_string(),
                    },
                );
            }
        };
        info!("Collecting {} (attempt {})", key, claimed.retry_count + 1);

        let result = match self.collect(&investor, &key).await {
            Ok(Collected::Snapshot {
                holdings_count,
                low_quality,
            }) => self
                .checkpoints
                .complete(&key, holdings_count, low_quality)
                .await
                .map(|_| {
                    info!("Collected {}: {} holdings", key, holdings_count);
                    UnitResult::Succeeded {
                        holdings_count,
                        low_quality,
                    }
                }),
            Ok(Collected::NotPublished(reason)) => {
                info!("{} not published yet: {}", key, reason);
                self.checkpoints
                    .skip(&key, &reason, self.config.max_retries)
                    .await
                    .map(|_| UnitResult::Skipped { reason })
            }
            Err(failure) => self.record_failure(&key, failure).await,
        };

        match result {
            Ok(result) => UnitOutcome::new(key, result),
            Err(e) => {
                error!("Failed to record outcome of {}: {}", key, e);
                UnitOutcome::new(
                    key,
                    UnitResult::Errored {
                        message: e.to_string(),
                    },
                )
            }
        }
    }

    async fn record_failure(&self, key: &WorkUnitKey, failure: StepFailure) -> Result<UnitResult> {
        warn!("{} failed ({:?}): {}", key, failure.kind, failure.reason);
        let checkpoint = self
            .checkpoints
            .fail(key, &failure.reason, failure.kind)
            .await?;

        if failure.kind == FailureKind::Parse
            && checkpoint.consecutive_parse_failures >= self.config.parse_alert_threshold
        {
            self.alerts.emit(CollectorAlert::parse_failure_escalated(
                key.clone(),
                checkpoint.consecutive_parse_failures,
                failure.reason.clone(),
            ));
        }

        let exhausted = checkpoint.is_exhausted(self.config.max_retries);
        if exhausted {
            error!(
                "{} exhausted its {} retries; manual reset required",
                key, checkpoint.retry_count
            );
            self.alerts.emit(CollectorAlert::retry_exhausted(
                key.clone(),
                checkpoint.retry_count,
                failure.reason.clone(),
            ));
        }

        Ok(UnitResult::Failed {
            kind: failure.kind,
            reason: failure.reason,
            retry_count: checkpoint.retry_count,
            exhausted,
        })
    }

    /// Fetch through persist for a claimed unit.
    async fn collect(
        &self,
        investor: &InvestorProfile,
        key: &WorkUnitKey,
    ) -> std::result::Result<Collected, StepFailure> {
        let request = FilingRequest::new(
            investor.investor_id.clone(),
            investor.external_filer_id.clone(),
            key.period,
        );

        let document = match self.source.fetch(&request).await {
            Ok(document) => document,
            Err(e) if e.retry_class() == RetryClass::NotPublished => {
                return Ok(Collected::NotPublished(e.to_string()))
            }
            Err(e) => return Err(StepFailure::fetch(e)),
        };
        debug!(
            "Fetched {} bytes for {} from {}",
            document.len(),
            key,
            document.metadata.source_url
        );

        let parser = select_parser(&document.metadata)
            .map_err(|e| StepFailure::new(FailureKind::Parse, e.to_string()))?;
        let parsed = parser
            .parse(&document)
            .map_err(|e| StepFailure::new(FailureKind::Parse, e.to_string()))?;

        let (options, equities): (Vec<_>, Vec<_>) =
            parsed.into_iter().partition(|h| h.is_option());
        if !options.is_empty() {
            debug!("{}: ignoring {} option positions", key, options.len());
        }

        let cusips: Vec<String> = equities
            .iter()
            .map(|h| h.cusip.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let tickers = self.resolver.resolve(&cusips).await;
        let unresolved = cusips.iter().filter(|c| !tickers.contains_key(*c)).count();
        if unresolved > 0 {
            warn!(
                "{}: {} of {} CUSIPs have no ticker; keeping the CUSIP",
                key,
                unresolved,
                cusips.len()
            );
        }

        let resolved: Vec<ResolvedHolding> = equities
            .into_iter()
            .map(|h| ResolvedHolding {
                ticker: tickers
                    .get(&h.cusip)
                    .cloned()
                    .unwrap_or_else(|| h.cusip.clone()),
                cusip: Some(h.cusip),
                company_name: h.issuer,
                shares: h.shares,
                market_value: h.market_value,
            })
            .collect();

        let portfolio = self
            .reconciler
            .reconcile(resolved)
            .map_err(|e| StepFailure::new(FailureKind::Validation, e.to_string()))?;
        let low_quality = portfolio.low_quality;
        if low_quality {
            warn!("{}: total market value is zero; recording as low quality", key);
        }

        let snapshot = HoldingSnapshot::from_portfolio(
            key,
            document.metadata.filing_date,
            document.metadata.source_url.clone(),
            portfolio,
        );
        let written = self
            .holdings
            .replace_snapshot(snapshot)
            .await
            .map_err(|e| StepFailure::new(FailureKind::Persistence, e.to_string()))?;

        Ok(Collected::Snapshot {
            holdings_count: u32::try_from(written).unwrap_or(u32::MAX),
            low_quality,
        })
    }
}
