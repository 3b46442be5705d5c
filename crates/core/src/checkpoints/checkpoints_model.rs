//! Checkpoint domain models and the work-unit state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use holdwatch_filings::FilingPeriod;

use crate::errors::CheckpointError;

/// Identity of one unit of collection work: an investor's filing for one
/// quarter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnitKey {
    pub investor_id: String,
    pub period: FilingPeriod,
}

impl WorkUnitKey {
    pub fn new(investor_id: impl Into<String>, period: FilingPeriod) -> Self {
        Self {
            investor_id: investor_id.into(),
            period,
        }
    }
}

impl fmt::Display for WorkUnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.investor_id, self.period)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Skipped,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "PENDING",
            CheckpointStatus::InProgress => "IN_PROGRESS",
            CheckpointStatus::Success => "SUCCESS",
            CheckpointStatus::Failed => "FAILED",
            CheckpointStatus::Skipped => "SKIPPED",
        }
    }

    pub const ALL: [CheckpointStatus; 5] = [
        CheckpointStatus::Pending,
        CheckpointStatus::InProgress,
        CheckpointStatus::Success,
        CheckpointStatus::Failed,
        CheckpointStatus::Skipped,
    ];

    /// Whether `operation` may start from this state, ignoring the retry
    /// budget.
    pub fn can_transition(self, operation: CheckpointOperation) -> bool {
        use CheckpointStatus::*;
        match operation {
            CheckpointOperation::Claim => matches!(self, Pending | Skipped | Failed),
            CheckpointOperation::Complete
            | CheckpointOperation::Fail
            | CheckpointOperation::Reclaim => self == InProgress,
            CheckpointOperation::Skip => self != Success,
            CheckpointOperation::Reset => self != InProgress,
        }
    }

    /// States from which `operation` may start.
    pub fn sources(operation: CheckpointOperation) -> Vec<CheckpointStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition(operation))
            .collect()
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(CheckpointStatus::Pending),
            "IN_PROGRESS" => Ok(CheckpointStatus::InProgress),
            "SUCCESS" => Ok(CheckpointStatus::Success),
            "FAILED" => Ok(CheckpointStatus::Failed),
            "SKIPPED" => Ok(CheckpointStatus::Skipped),
            other => Err(format!("Unknown checkpoint status: {}", other)),
        }
    }
}

/// Operations that move a checkpoint between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointOperation {
    Claim,
    Complete,
    Fail,
    Skip,
    Reclaim,
    Reset,
}

impl fmt::Display for CheckpointOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckpointOperation::Claim => "claim",
            CheckpointOperation::Complete => "complete",
            CheckpointOperation::Fail => "fail",
            CheckpointOperation::Skip => "skip",
            CheckpointOperation::Reclaim => "reclaim",
            CheckpointOperation::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Why a unit failed. Drives alerting and operator triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Network, timeout or rate limiting that survived the fetch retries.
    Transient,
    /// The document was fetched but could not be parsed.
    Parse,
    /// The provider rejected the request outright (unknown filer, bad
    /// credentials, missing information table).
    Source,
    /// The holdings could not be reconciled into a snapshot.
    Validation,
    /// The snapshot could not be written.
    Persistence,
    /// The worker holding the claim disappeared.
    Stale,
}

/// Persistent record of one work unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub investor_id: String,
    pub filing_period: FilingPeriod,
    pub status: CheckpointStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fail_reason: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub retry_count: u32,
    pub holdings_count: Option<u32>,
    pub consecutive_parse_failures: u32,
    pub low_quality: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(key: &WorkUnitKey, now: DateTime<Utc>) -> Self {
        Self {
            investor_id: key.investor_id.clone(),
            filing_period: key.period,
            status: CheckpointStatus::Pending,
            started_at: None,
            completed_at: None,
            fail_reason: None,
            failure_kind: None,
            retry_count: 0,
            holdings_count: None,
            consecutive_parse_failures: 0,
            low_quality: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> WorkUnitKey {
        WorkUnitKey::new(self.investor_id.clone(), self.filing_period)
    }

    /// A failed unit that may not be claimed again without a reset.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.status == CheckpointStatus::Failed && self.retry_count >= max_retries
    }

    /// Resolves the state `operation` would move this checkpoint to.
    ///
    /// An exhausted unit refuses both claim and skip: only a reset brings it
    /// back into rotation.
    pub fn transition(
        &self,
        operation: CheckpointOperation,
        max_retries: u32,
    ) -> Result<CheckpointStatus, CheckpointError> {
        use CheckpointOperation as Op;
        use CheckpointStatus as S;

        match (operation, self.status) {
            (Op::Claim | Op::Skip, S::Failed) if self.retry_count >= max_retries => {
                Err(CheckpointError::RetryExhausted {
                    key: self.key(),
                    retry_count: self.retry_count,
                    max_retries,
                })
            }
            (Op::Claim, S::InProgress) => Err(CheckpointError::AlreadyInProgress(self.key())),
            (Op::Claim, S::Success) => Err(CheckpointError::AlreadyDone(self.key())),
            (Op::Complete, S::InProgress) => Ok(S::Success),
            (Op::Fail | Op::Reclaim, S::InProgress) => Ok(S::Failed),
            (Op::Claim, _) => Ok(S::InProgress),
            (Op::Skip, from) if from.can_transition(operation) => Ok(S::Skipped),
            (Op::Reset, from) if from.can_transition(operation) => Ok(S::Pending),
            (_, from) => Err(CheckpointError::InvalidTransition { from, operation }),
        }
    }

    pub fn claim(&mut self, max_retries: u32, now: DateTime<Utc>) -> Result<(), CheckpointError> {
        self.status = self.transition(CheckpointOperation::Claim, max_retries)?;
        self.started_at = Some(now);
        self.completed_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(
        &mut self,
        holdings_count: u32,
        low_quality: bool,
        now: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        self.status = self.transition(CheckpointOperation::Complete, 0)?;
        self.completed_at = Some(now);
        self.holdings_count = Some(holdings_count);
        self.low_quality = low_quality;
        self.fail_reason = None;
        self.failure_kind = None;
        self.consecutive_parse_failures = 0;
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed attempt. Reclaiming a stale claim goes through here
    /// too, with [`FailureKind::Stale`].
    pub fn fail(
        &mut self,
        reason: &str,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        let operation = if kind == FailureKind::Stale {
            CheckpointOperation::Reclaim
        } else {
            CheckpointOperation::Fail
        };
        self.status = self.transition(operation, 0)?;
        self.retry_count += 1;
        self.fail_reason = Some(reason.to_string());
        self.failure_kind = Some(kind);
        match kind {
            FailureKind::Parse => self.consecutive_parse_failures += 1,
            FailureKind::Stale => {}
            _ => self.consecutive_parse_failures = 0,
        }
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn skip(
        &mut self,
        reason: &str,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        self.status = self.transition(CheckpointOperation::Skip, max_retries)?;
        self.fail_reason = Some(reason.to_string());
        self.failure_kind = None;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<(), CheckpointError> {
        self.status = self.transition(CheckpointOperation::Reset, 0)?;
        self.retry_count = 0;
        self.consecutive_parse_failures = 0;
        self.fail_reason = None;
        self.failure_kind = None;
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = now;
        Ok(())
    }
}

/// Filter for listing checkpoints. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointFilter {
    pub status: Option<CheckpointStatus>,
    pub investor_id: Option<String>,
    pub period: Option<FilingPeriod>,
}

impl CheckpointFilter {
    pub fn with_status(status: CheckpointStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, checkpoint: &Checkpoint) -> bool {
        self.status.map_or(true, |s| s == checkpoint.status)
            && self
                .investor_id
                .as_deref()
                .map_or(true, |id| id == checkpoint.investor_id)
            && self.period.map_or(true, |p| p == checkpoint.filing_period)
    }
}
