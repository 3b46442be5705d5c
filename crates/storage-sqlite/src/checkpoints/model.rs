//! Database model for collector checkpoints.

use diesel::prelude::*;

use holdwatch_core::checkpoints::Checkpoint;
use holdwatch_filings::FilingPeriod;

use crate::errors::StorageError;
use crate::utils::{enum_from_db, enum_to_db, format_timestamp, parse_optional_timestamp, parse_timestamp};

#[derive(Queryable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::collector_checkpoints)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CheckpointDB {
    pub investor_id: String,
    pub filing_period: String,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub fail_reason: Option<String>,
    pub failure_kind: Option<String>,
    pub retry_count: i32,
    pub holdings_count: Option<i32>,
    pub consecutive_parse_failures: i32,
    pub low_quality: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn count_from_db(column: &str, value: i32) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|e| StorageError::corrupt(column, &value.to_string(), e))
}

fn count_to_db(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TryFrom<CheckpointDB> for Checkpoint {
    type Error = StorageError;

    fn try_from(db: CheckpointDB) -> Result<Self, Self::Error> {
        let filing_period = db
            .filing_period
            .parse::<FilingPeriod>()
            .map_err(|e| StorageError::corrupt("filing_period", &db.filing_period, e))?;

        Ok(Checkpoint {
            filing_period,
            status: enum_from_db("status", &db.status)?,
            started_at: parse_optional_timestamp("started_at", db.started_at.as_deref())?,
            completed_at: parse_optional_timestamp("completed_at", db.completed_at.as_deref())?,
            fail_reason: db.fail_reason,
            failure_kind: db
                .failure_kind
                .as_deref()
                .map(|kind| enum_from_db("failure_kind", kind))
                .transpose()?,
            retry_count: count_from_db("retry_count", db.retry_count)?,
            holdings_count: db
                .holdings_count
                .map(|n| count_from_db("holdings_count", n))
                .transpose()?,
            consecutive_parse_failures: count_from_db(
                "consecutive_parse_failures",
                db.consecutive_parse_failures,
            )?,
            low_quality: db.low_quality,
            created_at: parse_timestamp("created_at", &db.created_at)?,
            updated_at: parse_timestamp("updated_at", &db.updated_at)?,
            investor_id: db.investor_id,
        })
    }
}

impl TryFrom<&Checkpoint> for CheckpointDB {
    type Error = StorageError;

    fn try_from(domain: &Checkpoint) -> Result<Self, Self::Error> {
        Ok(CheckpointDB {
            investor_id: domain.investor_id.clone(),
            filing_period: domain.filing_period.to_string(),
            status: domain.status.as_str().to_string(),
            started_at: domain.started_at.map(format_timestamp),
            completed_at: domain.completed_at.map(format_timestamp),
            fail_reason: domain.fail_reason.clone(),
            failure_kind: domain.failure_kind.as_ref().map(enum_to_db).transpose()?,
            retry_count: count_to_db(domain.retry_count),
            holdings_count: domain.holdings_count.map(count_to_db),
            consecutive_parse_failures: count_to_db(domain.consecutive_parse_failures),
            low_quality: domain.low_quality,
            created_at: format_timestamp(domain.created_at),
            updated_at: format_timestamp(domain.updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use holdwatch_core::checkpoints::{CheckpointStatus, FailureKind, WorkUnitKey};

    #[test]
    fn test_failed_checkpoint_converts_both_ways() {
        let key = WorkUnitKey::new("wood", FilingPeriod::new(2023, 4).unwrap());
        let now = Utc::now();
        let mut checkpoint = Checkpoint::new(&key, now);
        checkpoint.claim(3, now).unwrap();
        checkpoint.fail("bad xml", FailureKind::Parse, now).unwrap();

        let db = CheckpointDB::try_from(&checkpoint).unwrap();
        assert_eq!(db.filing_period, "2023Q4");
        assert_eq!(db.status, "FAILED");
        assert_eq!(db.failure_kind.as_deref(), Some("PARSE"));

        let back = Checkpoint::try_from(db).unwrap();
        assert_eq!(back.status, CheckpointStatus::Failed);
        assert_eq!(back.retry_count, 1);
        assert_eq!(back.consecutive_parse_failures, 1);
        assert_eq!(back.fail_reason.as_deref(), Some("bad xml"));
    }

    #[test]
    fn test_unknown_status_is_reported_as_corrupt() {
        let key = WorkUnitKey::new("wood", FilingPeriod::new(2023, 4).unwrap());
        let mut db = CheckpointDB::try_from(&Checkpoint::new(&key, Utc::now())).unwrap();
        db.status = "RUNNING".to_string();

        let err = Checkpoint::try_from(db).unwrap_err();
        assert!(err.to_string().contains("status"));
    }
}
