use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::info;

use holdwatch_core::checkpoints::{CheckpointStatus, WorkUnitKey};
use holdwatch_core::errors::Error;
use holdwatch_core::holdings::{Holding, HoldingSnapshot, HoldingsStore};
use holdwatch_core::Result;
use holdwatch_filings::FilingPeriod;

use super::model::HoldingDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::investor_holdings::dsl::*;
use crate::schema::{collector_checkpoints, investor_holdings};
use crate::utils::now_timestamp;

pub struct HoldingsRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

fn to_models(rows: Vec<HoldingDB>) -> Result<Vec<Holding>> {
    rows.into_iter()
        .map(|row| Holding::try_from(row).map_err(Error::from))
        .collect()
}

fn load_unit(conn: &mut SqliteConnection, key: &WorkUnitKey) -> Result<Vec<Holding>> {
    let rows = investor_holdings
        .filter(investor_id.eq(&key.investor_id))
        .filter(filing_period.eq(key.period.to_string()))
        .select(HoldingDB::as_select())
        .load::<HoldingDB>(conn)
        .map_err(StorageError::from)?;
    to_models(rows)
}

impl HoldingsRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        HoldingsRepository { pool, writer }
    }
}

#[async_trait]
impl HoldingsStore for HoldingsRepository {
    async fn replace_snapshot(&self, snapshot: HoldingSnapshot) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let period = snapshot.filing_period.to_string();
                let removed = diesel::delete(
                    investor_holdings
                        .filter(investor_id.eq(&snapshot.investor_id))
                        .filter(filing_period.eq(&period)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;

                let stamp = now_timestamp();
                let rows: Vec<HoldingDB> = snapshot
                    .holdings
                    .iter()
                    .map(|h| HoldingDB::from_domain(h, &stamp))
                    .collect();

                let written = if rows.is_empty() {
                    0
                } else {
                    diesel::insert_into(investor_holdings::table)
                        .values(&rows)
                        .execute(conn)
                        .map_err(StorageError::from)?
                };

                info!(
                    "Stored {} holdings for {}/{} (replaced {})",
                    written, snapshot.investor_id, period, removed
                );
                Ok(written)
            })
            .await
    }

    fn get_snapshot(
        &self,
        investor: &str,
        period: FilingPeriod,
    ) -> Result<Option<HoldingSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        let key = WorkUnitKey::new(investor, period);
        let holdings = load_unit(&mut conn, &key)?;

        if holdings.is_empty() {
            return Ok(None);
        }
        Ok(Some(HoldingSnapshot::from_rows(&key, holdings)))
    }

    fn latest_snapshot(&self, investor: &str) -> Result<Option<HoldingSnapshot>> {
        let mut conn = get_connection(&self.pool)?;

        // "YYYYQn" sorts chronologically as text.
        let latest = investor_holdings
            .inner_join(
                collector_checkpoints::table.on(collector_checkpoints::investor_id
                    .eq(investor_id)
                    .and(collector_checkpoints::filing_period.eq(filing_period))),
            )
            .filter(investor_id.eq(investor))
            .filter(collector_checkpoints::status.eq(CheckpointStatus::Success.as_str()))
            .select(max(filing_period))
            .first::<Option<String>>(&mut conn)
            .map_err(StorageError::from)?;

        let Some(latest) = latest else {
            return Ok(None);
        };
        let period = latest
            .parse::<FilingPeriod>()
            .map_err(|e| StorageError::corrupt("filing_period", &latest, e))?;

        let key = WorkUnitKey::new(investor, period);
        let holdings = load_unit(&mut conn, &key)?;
        Ok(Some(HoldingSnapshot::from_rows(&key, holdings)))
    }

    fn holders_of(&self, symbol: &str) -> Result<Vec<Holding>> {
        let mut conn = get_connection(&self.pool)?;
        let symbol = symbol.trim().to_ascii_uppercase();

        let latest_by_investor: HashMap<String, String> = investor_holdings
            .inner_join(
                collector_checkpoints::table.on(collector_checkpoints::investor_id
                    .eq(investor_id)
                    .and(collector_checkpoints::filing_period.eq(filing_period))),
            )
            .filter(collector_checkpoints::status.eq(CheckpointStatus::Success.as_str()))
            .group_by(investor_id)
            .select((investor_id, max(filing_period)))
            .load::<(String, Option<String>)>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .filter_map(|(investor, period)| period.map(|p| (investor, p)))
            .collect();

        let rows = investor_holdings
            .filter(ticker.eq(&symbol))
            .select(HoldingDB::as_select())
            .load::<HoldingDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .filter(|row| latest_by_investor.get(&row.investor_id) == Some(&row.filing_period))
            .collect();

        let mut holders = to_models(rows)?;
        holders.sort_by(|a, b| {
            b.portfolio_weight
                .cmp(&a.portfolio_weight)
                .then_with(|| a.investor_id.cmp(&b.investor_id))
        });
        Ok(holders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoints::CheckpointRepository;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use chrono::NaiveDate;
    use diesel::r2d2::ConnectionManager;
    use holdwatch_core::checkpoints::{CheckpointStore, FailureKind};
    use holdwatch_core::holdings::{PortfolioReconciler, ResolvedHolding};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    async fn create_test_repository() -> (
        HoldingsRepository,
        CheckpointRepository,
        tempfile::TempDir,
    ) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let pool: Arc<Pool<ConnectionManager<SqliteConnection>>> =
            create_pool(&db_path.to_string_lossy()).expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        let writer = spawn_writer((*pool).clone());

        let repo = HoldingsRepository::new(Arc::clone(&pool), writer.clone());
        let checkpoints = CheckpointRepository::new(pool, writer);
        (repo, checkpoints, temp_dir)
    }

    fn unit(investor: &str, quarter: u8) -> WorkUnitKey {
        WorkUnitKey::new(investor, FilingPeriod::new(2024, quarter).unwrap())
    }

    /// Stores a snapshot the way a successful collection does.
    async fn collect(
        repo: &HoldingsRepository,
        checkpoints: &CheckpointRepository,
        snapshot: HoldingSnapshot,
    ) {
        let key = snapshot.key();
        checkpoints.find_or_create(&key).await.unwrap();
        checkpoints.claim(&key, 3).await.unwrap();
        let written = repo.replace_snapshot(snapshot).await.unwrap();
        checkpoints
            .complete(&key, u32::try_from(written).unwrap(), false)
            .await
            .unwrap();
    }

    fn resolved(symbol: &str, value: rust_decimal::Decimal) -> ResolvedHolding {
        ResolvedHolding {
            ticker: symbol.to_string(),
            cusip: None,
            company_name: format!("{} Inc", symbol),
            shares: 100,
            market_value: value,
        }
    }

    fn snapshot(investor: &str, quarter: u8, rows: Vec<ResolvedHolding>) -> HoldingSnapshot {
        let key = WorkUnitKey::new(investor, FilingPeriod::new(2024, quarter).unwrap());
        let portfolio = PortfolioReconciler::default().reconcile(rows).unwrap();
        HoldingSnapshot::from_portfolio(
            &key,
            NaiveDate::from_ymd_opt(2024, 5, 15),
            "https://www.sec.gov/Archives/edgar/data/1067983/infotable.xml",
            portfolio,
        )
    }

    #[tokio::test]
    async fn test_replace_snapshot_overwrites_unit() {
        let (repo, _checkpoints, _dir) = create_test_repository().await;
        let period = FilingPeriod::new(2024, 1).unwrap();

        let first = snapshot(
            "buffett",
            1,
            vec![resolved("AAPL", dec!(600)), resolved("KO", dec!(400))],
        );
        assert_eq!(repo.replace_snapshot(first).await.unwrap(), 2);

        let second = snapshot("buffett", 1, vec![resolved("OXY", dec!(250))]);
        assert_eq!(repo.replace_snapshot(second.clone()).await.unwrap(), 1);

        let stored = repo.get_snapshot("buffett", period).unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.holdings[0].portfolio_weight, dec!(100.00));
    }

    #[tokio::test]
    async fn test_snapshot_preserves_decimals_and_order() {
        let (repo, _checkpoints, _dir) = create_test_repository().await;
        let written = snapshot(
            "wood",
            2,
            vec![
                resolved("TSLA", dec!(1234.56)),
                resolved("COIN", dec!(2469.12)),
                resolved("ROKU", dec!(0.01)),
            ],
        );
        repo.replace_snapshot(written.clone()).await.unwrap();

        let stored = repo
            .get_snapshot("wood", FilingPeriod::new(2024, 2).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.holdings.iter().map(|h| h.ticker.as_str()).collect::<Vec<_>>(),
            vec!["COIN", "TSLA", "ROKU"]
        );
        assert_eq!(stored.total_value, dec!(3703.69));
        assert_eq!(stored.filing_date, NaiveDate::from_ymd_opt(2024, 5, 15));
    }

    #[tokio::test]
    async fn test_latest_snapshot_picks_newest_period() {
        let (repo, checkpoints, _dir) = create_test_repository().await;
        assert!(repo.latest_snapshot("buffett").unwrap().is_none());

        for quarter in [3, 1, 2] {
            collect(
                &repo,
                &checkpoints,
                snapshot("buffett", quarter, vec![resolved("AAPL", dec!(10))]),
            )
            .await;
        }

        let latest = repo.latest_snapshot("buffett").unwrap().unwrap();
        assert_eq!(latest.filing_period, FilingPeriod::new(2024, 3).unwrap());
    }

    #[tokio::test]
    async fn test_holders_of_uses_each_investors_latest_period() {
        let (repo, checkpoints, _dir) = create_test_repository().await;

        // buffett sold AAPL in Q2; only wood still holds it.
        collect(
            &repo,
            &checkpoints,
            snapshot(
                "buffett",
                1,
                vec![resolved("AAPL", dec!(900)), resolved("KO", dec!(100))],
            ),
        )
        .await;
        collect(
            &repo,
            &checkpoints,
            snapshot("buffett", 2, vec![resolved("KO", dec!(100))]),
        )
        .await;
        collect(
            &repo,
            &checkpoints,
            snapshot(
                "wood",
                2,
                vec![resolved("TSLA", dec!(300)), resolved("AAPL", dec!(100))],
            ),
        )
        .await;

        let holders = repo.holders_of("aapl").unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].investor_id, "wood");
        assert_eq!(holders[0].portfolio_weight, dec!(25.00));

        let ko = repo.holders_of("KO").unwrap();
        assert_eq!(ko.len(), 1);
        assert_eq!(ko[0].filing_period, FilingPeriod::new(2024, 2).unwrap());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_snapshot() {
        let (repo, _checkpoints, _dir) = create_test_repository().await;
        let original = snapshot(
            "buffett",
            1,
            vec![resolved("AAPL", dec!(600)), resolved("KO", dec!(400))],
        );
        repo.replace_snapshot(original.clone()).await.unwrap();

        // Two rows for one ticker violate the primary key halfway through
        // the insert.
        let mut broken = snapshot(
            "buffett",
            1,
            vec![resolved("OXY", dec!(300)), resolved("CVX", dec!(200))],
        );
        let duplicate = broken.holdings[0].clone();
        broken.holdings.push(duplicate);
        assert!(repo.replace_snapshot(broken).await.is_err());

        let stored = repo
            .get_snapshot("buffett", FilingPeriod::new(2024, 1).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn test_reads_ignore_snapshots_without_successful_checkpoint() {
        let (repo, checkpoints, _dir) = create_test_repository().await;
        collect(
            &repo,
            &checkpoints,
            snapshot("buffett", 1, vec![resolved("AAPL", dec!(100))]),
        )
        .await;

        // Q2 rows were written but the unit then failed.
        let q2 = unit("buffett", 2);
        checkpoints.find_or_create(&q2).await.unwrap();
        checkpoints.claim(&q2, 3).await.unwrap();
        repo.replace_snapshot(snapshot(
            "buffett",
            2,
            vec![resolved("AAPL", dec!(50)), resolved("KO", dec!(50))],
        ))
        .await
        .unwrap();
        checkpoints
            .fail(&q2, "Claim abandoned", FailureKind::Stale)
            .await
            .unwrap();

        let latest = repo.latest_snapshot("buffett").unwrap().unwrap();
        assert_eq!(latest.filing_period, FilingPeriod::new(2024, 1).unwrap());
        assert!(repo.holders_of("KO").unwrap().is_empty());
        let aapl = repo.holders_of("AAPL").unwrap();
        assert_eq!(aapl.len(), 1);
        assert_eq!(aapl[0].portfolio_weight, dec!(100.00));

        // Uncollected units have no latest snapshot at all.
        repo.replace_snapshot(snapshot("wood", 1, vec![resolved("TSLA", dec!(10))]))
            .await
            .unwrap();
        assert!(repo.latest_snapshot("wood").unwrap().is_none());
    }
}
