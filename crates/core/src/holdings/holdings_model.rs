//! Holdings domain models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use holdwatch_filings::FilingPeriod;

use crate::checkpoints::WorkUnitKey;

/// A parsed position with its CUSIP mapped to a ticker, before merging and
/// weighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedHolding {
    pub ticker: String,
    pub cusip: Option<String>,
    pub company_name: String,
    pub shares: i64,
    /// Dollars.
    pub market_value: Decimal,
}

/// A merged position with its share of the portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedHolding {
    pub ticker: String,
    pub cusip: Option<String>,
    pub company_name: String,
    pub shares: i64,
    pub market_value: Decimal,
    /// Percent of total market value, two decimal places.
    pub portfolio_weight: Decimal,
}

/// Output of [`crate::holdings::PortfolioReconciler::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledPortfolio {
    /// Weight descending, then ticker ascending.
    pub holdings: Vec<WeightedHolding>,
    pub total_value: Decimal,
    pub low_quality: bool,
}

/// A stored holding row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub investor_id: String,
    pub ticker: String,
    pub cusip: Option<String>,
    pub company_name: String,
    pub shares: i64,
    pub market_value: Decimal,
    pub portfolio_weight: Decimal,
    pub filing_period: FilingPeriod,
    pub filing_date: Option<NaiveDate>,
    pub source_url: String,
}

/// The complete holdings set of one work unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingSnapshot {
    pub investor_id: String,
    pub filing_period: FilingPeriod,
    pub filing_date: Option<NaiveDate>,
    pub source_url: String,
    pub total_value: Decimal,
    pub holdings: Vec<Holding>,
}

impl HoldingSnapshot {
    pub fn from_portfolio(
        key: &WorkUnitKey,
        filing_date: Option<NaiveDate>,
        source_url: impl Into<String>,
        portfolio: ReconciledPortfolio,
    ) -> Self {
        let source_url = source_url.into();
        let holdings = portfolio
            .holdings
            .into_iter()
            .map(|h| Holding {
                investor_id: key.investor_id.clone(),
                ticker: h.ticker,
                cusip: h.cusip,
                company_name: h.company_name,
                shares: h.shares,
                market_value: h.market_value,
                portfolio_weight: h.portfolio_weight,
                filing_period: key.period,
                filing_date,
                source_url: source_url.clone(),
            })
            .collect();

        Self {
            investor_id: key.investor_id.clone(),
            filing_period: key.period,
            filing_date,
            source_url,
            total_value: portfolio.total_value,
            holdings,
        }
    }

    /// Rebuilds a snapshot from stored rows of a single unit.
    pub fn from_rows(key: &WorkUnitKey, mut holdings: Vec<Holding>) -> Self {
        holdings.sort_by(|a, b| {
            b.portfolio_weight
                .cmp(&a.portfolio_weight)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        let first = holdings.first();
        Self {
            investor_id: key.investor_id.clone(),
            filing_period: key.period,
            filing_date: first.and_then(|h| h.filing_date),
            source_url: first.map(|h| h.source_url.clone()).unwrap_or_default(),
            total_value: holdings.iter().map(|h| h.market_value).sum(),
            holdings,
        }
    }

    pub fn key(&self) -> WorkUnitKey {
        WorkUnitKey::new(self.investor_id.clone(), self.filing_period)
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

/// What to do with a snapshot whose total market value is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZeroTotalPolicy {
    /// Store it with all weights at zero and flag the unit low quality.
    #[default]
    RecordLowQuality,
    /// Reject it; the unit fails with a validation error.
    Fail,
}

impl fmt::Display for ZeroTotalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZeroTotalPolicy::RecordLowQuality => f.write_str("record"),
            ZeroTotalPolicy::Fail => f.write_str("fail"),
        }
    }
}

impl FromStr for ZeroTotalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" | "record_low_quality" => Ok(ZeroTotalPolicy::RecordLowQuality),
            "fail" => Ok(ZeroTotalPolicy::Fail),
            other => Err(format!("Unknown zero-total policy: {}", other)),
        }
    }
}
