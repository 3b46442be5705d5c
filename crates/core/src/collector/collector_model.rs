//! Collector configuration and run reports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoints::{FailureKind, WorkUnitKey};
use crate::holdings::ZeroTotalPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Failed attempts after which a unit needs a manual reset.
    pub max_retries: u32,
    /// Age after which an IN_PROGRESS claim is presumed dead.
    pub stale_after: Duration,
    /// Units processed in parallel.
    pub concurrency: usize,
    /// Most recent elapsed quarters collected per investor.
    pub target_quarters: usize,
    /// Consecutive parse failures that raise an alert.
    pub parse_alert_threshold: u32,
    pub zero_total_policy: ZeroTotalPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            stale_after: Duration::from_secs(2 * 60 * 60),
            concurrency: 4,
            target_quarters: 4,
            parse_alert_threshold: 2,
            zero_total_policy: ZeroTotalPolicy::RecordLowQuality,
        }
    }
}

/// How one unit ended within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum UnitResult {
    #[serde(rename_all = "camelCase")]
    Succeeded {
        holdings_count: u32,
        low_quality: bool,
    },
    Skipped {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        kind: FailureKind,
        reason: String,
        retry_count: u32,
        exhausted: bool,
    },
    /// Another worker holds the unit, it is done, or its retries are spent.
    NotClaimed {
        reason: String,
    },
    /// A stop was requested before the unit was claimed.
    Cancelled,
    /// The checkpoint store itself failed; the unit's state is unknown.
    Errored {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOutcome {
    pub key: WorkUnitKey,
    #[serde(flatten)]
    pub result: UnitResult,
}

impl UnitOutcome {
    pub fn new(key: WorkUnitKey, result: UnitResult) -> Self {
        Self { key, result }
    }
}

/// Summary of one `run_cycle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Stale units failed at the start of the cycle.
    pub reclaimed: usize,
    /// Units enumerated (active investors × target periods).
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_claimed: usize,
    pub errored: usize,
    /// FAILED units awaiting a manual reset when the cycle finished.
    pub exhausted: Vec<WorkUnitKey>,
    pub cancelled: bool,
    pub outcomes: Vec<UnitOutcome>,
}

impl CycleReport {
    pub(crate) fn new(cycle_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            finished_at: started_at,
            reclaimed: 0,
            discovered: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            not_claimed: 0,
            errored: 0,
            exhausted: Vec::new(),
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, outcome: UnitOutcome) {
        match &outcome.result {
            UnitResult::Succeeded { .. } => self.succeeded += 1,
            UnitResult::Skipped { .. } => self.skipped += 1,
            UnitResult::Failed { .. } => self.failed += 1,
            UnitResult::NotClaimed { .. } => self.not_claimed += 1,
            UnitResult::Cancelled => self.cancelled = true,
            UnitResult::Errored { .. } => self.errored += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Process-local collector state exposed to the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStatus {
    pub running: bool,
    pub active_cycles: usize,
    pub stop_requested: bool,
}
