//! Collector alert types.

use serde::{Deserialize, Serialize};

use crate::checkpoints::WorkUnitKey;

/// Conditions an operator should look at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorAlert {
    /// A unit failed to parse on several consecutive attempts; the filing
    /// format likely needs attention.
    ParseFailureEscalated {
        key: WorkUnitKey,
        consecutive_failures: u32,
        reason: String,
    },

    /// A failure consumed the last retry. The unit stays FAILED until reset.
    RetryExhausted {
        key: WorkUnitKey,
        retry_count: u32,
        reason: String,
    },

    /// Units left IN_PROGRESS by a dead worker were failed.
    StaleUnitsReclaimed { keys: Vec<WorkUnitKey> },
}

impl CollectorAlert {
    pub fn parse_failure_escalated(
        key: WorkUnitKey,
        consecutive_failures: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::ParseFailureEscalated {
            key,
            consecutive_failures,
            reason: reason.into(),
        }
    }

    pub fn retry_exhausted(key: WorkUnitKey, retry_count: u32, reason: impl Into<String>) -> Self {
        Self::RetryExhausted {
            key,
            retry_count,
            reason: reason.into(),
        }
    }

    pub fn stale_units_reclaimed(keys: Vec<WorkUnitKey>) -> Self {
        Self::StaleUnitsReclaimed { keys }
    }
}
