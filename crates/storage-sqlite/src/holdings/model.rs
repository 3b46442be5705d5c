//! Database model for holdings.

use diesel::prelude::*;

use holdwatch_core::holdings::Holding;
use holdwatch_filings::FilingPeriod;

use crate::errors::StorageError;
use crate::utils::{parse_date, parse_decimal};

#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::investor_holdings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HoldingDB {
    pub investor_id: String,
    pub filing_period: String,
    pub ticker: String,
    pub cusip: Option<String>,
    pub company_name: String,
    pub shares: i64,
    pub market_value: String,
    pub portfolio_weight: String,
    pub filing_date: Option<String>,
    pub source_url: String,
    pub created_at: String,
}

impl HoldingDB {
    pub fn from_domain(holding: &Holding, created_at: &str) -> Self {
        HoldingDB {
            investor_id: holding.investor_id.clone(),
            filing_period: holding.filing_period.to_string(),
            ticker: holding.ticker.clone(),
            cusip: holding.cusip.clone(),
            company_name: holding.company_name.clone(),
            shares: holding.shares,
            market_value: holding.market_value.to_string(),
            portfolio_weight: holding.portfolio_weight.to_string(),
            filing_date: holding.filing_date.map(|d| d.format("%Y-%m-%d").to_string()),
            source_url: holding.source_url.clone(),
            created_at: created_at.to_string(),
        }
    }
}

impl TryFrom<HoldingDB> for Holding {
    type Error = StorageError;

    fn try_from(db: HoldingDB) -> Result<Self, Self::Error> {
        let filing_period = db
            .filing_period
            .parse::<FilingPeriod>()
            .map_err(|e| StorageError::corrupt("filing_period", &db.filing_period, e))?;

        Ok(Holding {
            filing_period,
            market_value: parse_decimal("market_value", &db.market_value)?,
            portfolio_weight: parse_decimal("portfolio_weight", &db.portfolio_weight)?,
            filing_date: db
                .filing_date
                .as_deref()
                .map(|d| parse_date("filing_date", d))
                .transpose()?,
            investor_id: db.investor_id,
            ticker: db.ticker,
            cusip: db.cusip,
            company_name: db.company_name,
            shares: db.shares,
            source_url: db.source_url,
        })
    }
}
