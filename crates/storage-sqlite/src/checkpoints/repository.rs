use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::{debug, warn};

use holdwatch_core::checkpoints::{
    Checkpoint, CheckpointFilter, CheckpointOperation, CheckpointStatus, CheckpointStore,
    FailureKind, WorkUnitKey,
};
use holdwatch_core::errors::{CheckpointError, DatabaseError, Error, ValidationError};
use holdwatch_core::Result;

use super::model::CheckpointDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::collector_checkpoints;
use crate::schema::collector_checkpoints::dsl::*;
use crate::utils::format_timestamp;

pub struct CheckpointRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

fn load(conn: &mut SqliteConnection, key: &WorkUnitKey) -> Result<Option<Checkpoint>> {
    let row = collector_checkpoints
        .find((&key.investor_id, key.period.to_string()))
        .select(CheckpointDB::as_select())
        .first::<CheckpointDB>(conn)
        .optional()
        .map_err(StorageError::from)?;

    Ok(row.map(Checkpoint::try_from).transpose()?)
}

fn load_existing(conn: &mut SqliteConnection, key: &WorkUnitKey) -> Result<Checkpoint> {
    load(conn, key)?.ok_or_else(|| CheckpointError::NotFound(key.clone()).into())
}

fn save(conn: &mut SqliteConnection, checkpoint: &Checkpoint) -> Result<()> {
    let row = CheckpointDB::try_from(checkpoint)?;
    diesel::update(collector_checkpoints.find((&row.investor_id, &row.filing_period)))
        .set(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

fn to_models(rows: Vec<CheckpointDB>) -> Result<Vec<Checkpoint>> {
    rows.into_iter()
        .map(|row| Checkpoint::try_from(row).map_err(Error::from))
        .collect()
}

fn retry_limit(max_retries: u32) -> i32 {
    i32::try_from(max_retries).unwrap_or(i32::MAX)
}

impl CheckpointRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        CheckpointRepository { pool, writer }
    }

    /// Loads, mutates and stores one checkpoint inside a single write job.
    async fn apply<F>(&self, key: &WorkUnitKey, change: F) -> Result<Checkpoint>
    where
        F: FnOnce(&mut Checkpoint, DateTime<Utc>) -> std::result::Result<(), CheckpointError>
            + Send
            + 'static,
    {
        let key = key.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Checkpoint> {
                let mut checkpoint = load_existing(conn, &key)?;
                change(&mut checkpoint, Utc::now())?;
                save(conn, &checkpoint)?;
                Ok(checkpoint)
            })
            .await
    }
}

#[async_trait]
impl CheckpointStore for CheckpointRepository {
    async fn find_or_create(&self, key: &WorkUnitKey) -> Result<Checkpoint> {
        let key = key.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Checkpoint> {
                let fresh = CheckpointDB::try_from(&Checkpoint::new(&key, Utc::now()))?;
                let inserted = diesel::insert_or_ignore_into(collector_checkpoints::table)
                    .values(&fresh)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if inserted > 0 {
                    debug!("Created checkpoint {}", key);
                }
                load_existing(conn, &key)
            })
            .await
    }

    async fn claim(&self, key: &WorkUnitKey, max_retries: u32) -> Result<Checkpoint> {
        let key = key.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Checkpoint> {
                let now = format_timestamp(Utc::now());
                let claimable: Vec<&'static str> =
                    CheckpointStatus::sources(CheckpointOperation::Claim)
                        .into_iter()
                        .map(|s| s.as_str())
                        .collect();

                let claimed = diesel::update(
                    collector_checkpoints
                        .filter(investor_id.eq(&key.investor_id))
                        .filter(filing_period.eq(key.period.to_string()))
                        .filter(status.eq_any(claimable))
                        .filter(
                            status
                                .ne(CheckpointStatus::Failed.as_str())
                                .or(retry_count.lt(retry_limit(max_retries))),
                        ),
                )
                .set((
                    status.eq(CheckpointStatus::InProgress.as_str()),
                    started_at.eq(Some(now.clone())),
                    completed_at.eq(None::<String>),
                    updated_at.eq(now),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

                let checkpoint = load_existing(conn, &key)?;
                if claimed == 1 {
                    return Ok(checkpoint);
                }

                // Nothing changed: report why the unit could not be claimed.
                checkpoint.transition(CheckpointOperation::Claim, max_retries)?;
                Err(Error::Database(DatabaseError::Internal(format!(
                    "Claim of {} was refused in state {}",
                    key, checkpoint.status
                ))))
            })
            .await
    }

    async fn complete(
        &self,
        key: &WorkUnitKey,
        count: u32,
        is_low_quality: bool,
    ) -> Result<Checkpoint> {
        self.apply(key, move |checkpoint, now| {
            checkpoint.complete(count, is_low_quality, now)
        })
        .await
    }

    async fn fail(&self, key: &WorkUnitKey, reason: &str, kind: FailureKind) -> Result<Checkpoint> {
        let reason = reason.to_string();
        self.apply(key, move |checkpoint, now| checkpoint.fail(&reason, kind, now))
            .await
    }

    async fn skip(&self, key: &WorkUnitKey, reason: &str, max_retries: u32) -> Result<Checkpoint> {
        let reason = reason.to_string();
        self.apply(key, move |checkpoint, now| {
            checkpoint.skip(&reason, max_retries, now)
        })
        .await
    }

    async fn reclaim_stale(&self, stale_after: Duration) -> Result<Vec<Checkpoint>> {
        let window = chrono::Duration::from_std(stale_after).map_err(|e| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "Stale window out of range: {}",
                e
            )))
        })?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Vec<Checkpoint>> {
                let now = Utc::now();
                let cutoff = format_timestamp(now - window);

                let rows = collector_checkpoints
                    .filter(status.eq(CheckpointStatus::InProgress.as_str()))
                    .filter(started_at.is_null().or(started_at.lt(cutoff)))
                    .select(CheckpointDB::as_select())
                    .load::<CheckpointDB>(conn)
                    .map_err(StorageError::from)?;

                let mut reclaimed = Vec::with_capacity(rows.len());
                for mut checkpoint in to_models(rows)? {
                    let reason = match checkpoint.started_at {
                        Some(since) => format!(
                            "Claim abandoned: in progress since {}",
                            format_timestamp(since)
                        ),
                        None => "Claim abandoned: no start time recorded".to_string(),
                    };
                    checkpoint.fail(&reason, FailureKind::Stale, now)?;
                    save(conn, &checkpoint)?;
                    warn!("Reclaimed stale unit {}", checkpoint.key());
                    reclaimed.push(checkpoint);
                }
                Ok(reclaimed)
            })
            .await
    }

    async fn reset(&self, key: &WorkUnitKey) -> Result<Checkpoint> {
        self.apply(key, |checkpoint, now| checkpoint.reset(now)).await
    }

    fn get(&self, key: &WorkUnitKey) -> Result<Option<Checkpoint>> {
        let mut conn = get_connection(&self.pool)?;
        load(&mut conn, key)
    }

    fn list(&self, filter: &CheckpointFilter) -> Result<Vec<Checkpoint>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = collector_checkpoints
            .select(CheckpointDB::as_select())
            .into_boxed();
        if let Some(wanted) = filter.status {
            query = query.filter(status.eq(wanted.as_str()));
        }
        if let Some(wanted) = &filter.investor_id {
            query = query.filter(investor_id.eq(wanted.clone()));
        }
        if let Some(wanted) = filter.period {
            query = query.filter(filing_period.eq(wanted.to_string()));
        }

        let rows = query
            .order((investor_id.asc(), filing_period.desc()))
            .load::<CheckpointDB>(&mut conn)
            .map_err(StorageError::from)?;
        to_models(rows)
    }

    fn list_exhausted(&self, max_retries: u32) -> Result<Vec<Checkpoint>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = collector_checkpoints
            .filter(status.eq(CheckpointStatus::Failed.as_str()))
            .filter(retry_count.ge(retry_limit(max_retries)))
            .order((investor_id.asc(), filing_period.desc()))
            .select(CheckpointDB::as_select())
            .load::<CheckpointDB>(&mut conn)
            .map_err(StorageError::from)?;
        to_models(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use diesel::r2d2::ConnectionManager;
    use holdwatch_filings::FilingPeriod;
    use tempfile::tempdir;

    async fn create_test_repository() -> (
        Arc<CheckpointRepository>,
        Arc<Pool<ConnectionManager<SqliteConnection>>>,
        tempfile::TempDir,
    ) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path.to_string_lossy()).expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        let writer = spawn_writer((*pool).clone());

        let repo = Arc::new(CheckpointRepository::new(Arc::clone(&pool), writer));
        (repo, pool, temp_dir)
    }

    fn key(investor: &str, quarter: u8) -> WorkUnitKey {
        WorkUnitKey::new(investor, FilingPeriod::new(2024, quarter).unwrap())
    }

    fn backdate_claim(pool: &Arc<Pool<ConnectionManager<SqliteConnection>>>, unit: &WorkUnitKey) {
        let mut conn = get_connection(pool).unwrap();
        diesel::update(collector_checkpoints.find((&unit.investor_id, unit.period.to_string())))
            .set(started_at.eq(Some("2020-01-01T00:00:00.000Z".to_string())))
            .execute(&mut conn)
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("buffett", 1);

        let created = repo.find_or_create(&unit).await.unwrap();
        assert_eq!(created.status, CheckpointStatus::Pending);

        repo.claim(&unit, 3).await.unwrap();
        let again = repo.find_or_create(&unit).await.unwrap();
        assert_eq!(again.status, CheckpointStatus::InProgress);
        assert_eq!(repo.list(&CheckpointFilter::default()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_investor_violates_foreign_key() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let err = repo.find_or_create(&key("nobody", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::ForeignKeyViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_complete_lifecycle() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("buffett", 2);
        repo.find_or_create(&unit).await.unwrap();

        let claimed = repo.claim(&unit, 3).await.unwrap();
        assert_eq!(claimed.status, CheckpointStatus::InProgress);
        assert!(claimed.started_at.is_some());

        let done = repo.complete(&unit, 45, false).await.unwrap();
        assert_eq!(done.status, CheckpointStatus::Success);
        assert_eq!(done.holdings_count, Some(45));

        let err = repo.claim(&unit, 3).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Checkpoint(CheckpointError::AlreadyDone(ref k)) if *k == unit
        ));
        assert_eq!(repo.get(&unit).unwrap(), Some(done));
    }

    #[tokio::test]
    async fn test_claim_of_missing_unit_is_not_found() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("buffett", 3);
        let err = repo.claim(&unit, 3).await.unwrap_err();
        assert!(matches!(err, Error::Checkpoint(CheckpointError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("wood", 1);
        repo.find_or_create(&unit).await.unwrap();

        let attempts = (0..8).map(|_| {
            let repo = Arc::clone(&repo);
            let unit = unit.clone();
            tokio::spawn(async move { repo.claim(&unit, 3).await })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results
            .iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        let rejected = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Ok(Err(Error::Checkpoint(CheckpointError::AlreadyInProgress(_))))
                )
            })
            .count();
        assert_eq!(winners, 1);
        assert_eq!(rejected, 7);
    }

    #[tokio::test]
    async fn test_failures_exhaust_retry_budget() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("dalio", 1);
        repo.find_or_create(&unit).await.unwrap();

        for attempt in 1..=2 {
            repo.claim(&unit, 2).await.unwrap();
            let failed = repo
                .fail(&unit, "malformed information table", FailureKind::Parse)
                .await
                .unwrap();
            assert_eq!(failed.retry_count, attempt);
            assert_eq!(failed.consecutive_parse_failures, attempt);
        }

        let err = repo.claim(&unit, 2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Checkpoint(CheckpointError::RetryExhausted { retry_count: 2, .. })
        ));
        assert_eq!(repo.list_exhausted(2).unwrap().len(), 1);
        // A larger budget makes it claimable again.
        assert!(repo.list_exhausted(3).unwrap().is_empty());

        let reset = repo.reset(&unit).await.unwrap();
        assert_eq!(reset.status, CheckpointStatus::Pending);
        assert_eq!(reset.retry_count, 0);
        assert_eq!(reset.fail_reason, None);
        repo.claim(&unit, 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_row_untouched() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("ackman", 4);
        let pending = repo.find_or_create(&unit).await.unwrap();

        let err = repo.complete(&unit, 3, false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Checkpoint(CheckpointError::InvalidTransition {
                from: CheckpointStatus::Pending,
                operation: CheckpointOperation::Complete,
            })
        ));
        assert_eq!(repo.get(&unit).unwrap(), Some(pending));
    }

    #[tokio::test]
    async fn test_skipped_unit_can_be_claimed_again() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("burry", 1);
        repo.find_or_create(&unit).await.unwrap();
        repo.claim(&unit, 3).await.unwrap();

        let skipped = repo
            .skip(&unit, "Filing not yet published", 3)
            .await
            .unwrap();
        assert_eq!(skipped.status, CheckpointStatus::Skipped);
        assert_eq!(skipped.retry_count, 0);

        let reclaimed = repo.claim(&unit, 3).await.unwrap();
        assert_eq!(reclaimed.status, CheckpointStatus::InProgress);
    }

    #[tokio::test]
    async fn test_exhausted_unit_cannot_be_skipped_back_into_rotation() {
        let (repo, _pool, _dir) = create_test_repository().await;
        let unit = key("dalio", 2);
        repo.find_or_create(&unit).await.unwrap();
        for _ in 0..2 {
            repo.claim(&unit, 2).await.unwrap();
            repo.fail(&unit, "connection reset", FailureKind::Transient)
                .await
                .unwrap();
        }
        let exhausted = repo.get(&unit).unwrap();

        let err = repo.skip(&unit, "Investor is inactive", 2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Checkpoint(CheckpointError::RetryExhausted { retry_count: 2, .. })
        ));
        assert_eq!(repo.get(&unit).unwrap(), exhausted);
        assert_eq!(repo.list_exhausted(2).unwrap().len(), 1);
        assert!(matches!(
            repo.claim(&unit, 2).await.unwrap_err(),
            Error::Checkpoint(CheckpointError::RetryExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_reclaim_stale_only_touches_old_claims() {
        let (repo, pool, _dir) = create_test_repository().await;
        let stale = key("buffett", 1);
        let fresh = key("buffett", 2);
        for unit in [&stale, &fresh] {
            repo.find_or_create(unit).await.unwrap();
            repo.claim(unit, 3).await.unwrap();
        }
        backdate_claim(&pool, &stale);

        let reclaimed = repo
            .reclaim_stale(Duration::from_secs(2 * 60 * 60))
            .await
            .unwrap();

        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].key(), stale);
        assert_eq!(reclaimed[0].failure_kind, Some(FailureKind::Stale));
        assert_eq!(reclaimed[0].retry_count, 1);
        assert_eq!(
            repo.get(&fresh).unwrap().unwrap().status,
            CheckpointStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_investor() {
        let (repo, _pool, _dir) = create_test_repository().await;
        for unit in [key("buffett", 1), key("buffett", 2), key("wood", 1)] {
            repo.find_or_create(&unit).await.unwrap();
        }
        repo.claim(&key("buffett", 2), 3).await.unwrap();

        let in_progress = repo
            .list(&CheckpointFilter::with_status(CheckpointStatus::InProgress))
            .unwrap();
        assert_eq!(in_progress.len(), 1);

        let buffett = repo
            .list(&CheckpointFilter {
                investor_id: Some("buffett".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            buffett
                .iter()
                .map(|c| c.filing_period.to_string())
                .collect::<Vec<_>>(),
            vec!["2024Q2", "2024Q1"]
        );
    }
}
