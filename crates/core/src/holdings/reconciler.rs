//! Portfolio reconciliation: merge share classes and apportion weights.

use std::collections::HashMap;

use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::errors::ReconcileError;
use crate::holdings::holdings_model::{
    ReconciledPortfolio, ResolvedHolding, WeightedHolding, ZeroTotalPolicy,
};

/// Weights are apportioned in hundredths of a percent.
const WEIGHT_UNITS: i64 = 10_000;
const WEIGHT_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioReconciler {
    zero_total_policy: ZeroTotalPolicy,
}

impl PortfolioReconciler {
    pub fn new(zero_total_policy: ZeroTotalPolicy) -> Self {
        Self { zero_total_policy }
    }

    /// Merges duplicate tickers, computes weights that sum to exactly
    /// 100.00 and orders the result by weight descending, then ticker.
    pub fn reconcile(
        &self,
        holdings: Vec<ResolvedHolding>,
    ) -> Result<ReconciledPortfolio, ReconcileError> {
        let input_rows = holdings.len();
        let merged = merge_by_ticker(holdings)?;
        let total_value: Decimal = merged.iter().map(|h| h.market_value).sum();

        let low_quality = total_value.is_zero();
        if low_quality && self.zero_total_policy == ZeroTotalPolicy::Fail {
            return Err(ReconcileError::ZeroTotal(merged.len()));
        }

        let units = apportion(&merged, total_value);
        let mut weighted: Vec<WeightedHolding> = merged
            .into_iter()
            .zip(units)
            .map(|(h, units)| WeightedHolding {
                ticker: h.ticker,
                cusip: h.cusip,
                company_name: h.company_name,
                shares: h.shares,
                market_value: h.market_value,
                portfolio_weight: Decimal::new(units, WEIGHT_SCALE),
            })
            .collect();

        weighted.sort_by(|a, b| {
            b.portfolio_weight
                .cmp(&a.portfolio_weight)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        debug!(
            "Reconciled {} rows into {} holdings, total ${}",
            input_rows,
            weighted.len(),
            total_value
        );

        Ok(ReconciledPortfolio {
            holdings: weighted,
            total_value,
            low_quality,
        })
    }
}

/// Normalizes identifiers and folds rows sharing a ticker into the first
/// occurrence.
fn merge_by_ticker(
    holdings: Vec<ResolvedHolding>,
) -> Result<Vec<ResolvedHolding>, ReconcileError> {
    let mut merged: Vec<ResolvedHolding> = Vec::with_capacity(holdings.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for holding in holdings {
        let ticker = holding.ticker.trim().to_ascii_uppercase();
        let company_name = holding.company_name.trim().to_string();
        if ticker.is_empty() {
            return Err(ReconcileError::MissingIdentifier(company_name));
        }

        match index.get(&ticker) {
            Some(&i) => {
                let existing = &mut merged[i];
                existing.shares = existing.shares.saturating_add(holding.shares);
                existing.market_value += holding.market_value;
                if existing.cusip.is_none() {
                    existing.cusip = holding.cusip;
                }
            }
            None => {
                index.insert(ticker.clone(), merged.len());
                merged.push(ResolvedHolding {
                    ticker,
                    cusip: holding.cusip,
                    company_name,
                    shares: holding.shares,
                    market_value: holding.market_value,
                });
            }
        }
    }

    Ok(merged)
}

/// Largest-remainder apportionment of [`WEIGHT_UNITS`] across holdings.
///
/// Ties on the remainder go to the larger position, then the smaller ticker.
fn apportion(holdings: &[ResolvedHolding], total_value: Decimal) -> Vec<i64> {
    if total_value <= Decimal::ZERO {
        return vec![0; holdings.len()];
    }

    let scale = Decimal::from(WEIGHT_UNITS);
    let mut floors = Vec::with_capacity(holdings.len());
    let mut remainders = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let exact = holding.market_value * scale / total_value;
        let floor = exact.floor();
        floors.push(floor.to_i64().unwrap_or(0));
        remainders.push(exact - floor);
    }

    let allocated: i64 = floors.iter().sum();
    let deficit = (WEIGHT_UNITS - allocated).max(0) as usize;

    let mut order: Vec<usize> = (0..holdings.len()).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .cmp(&remainders[a])
            .then_with(|| holdings[b].market_value.cmp(&holdings[a].market_value))
            .then_with(|| holdings[a].ticker.cmp(&holdings[b].ticker))
    });
    for &i in order.iter().take(deficit) {
        floors[i] += 1;
    }

    floors
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn resolved(ticker: &str, name: &str, shares: i64, value: Decimal) -> ResolvedHolding {
        ResolvedHolding {
            ticker: ticker.to_string(),
            cusip: None,
            company_name: name.to_string(),
            shares,
            market_value: value,
        }
    }

    fn weight_sum(portfolio: &ReconciledPortfolio) -> Decimal {
        portfolio.holdings.iter().map(|h| h.portfolio_weight).sum()
    }

    #[test]
    fn test_two_holdings_weights() {
        let portfolio = PortfolioReconciler::default()
            .reconcile(vec![
                resolved("TSLA", "Tesla Inc", 10, dec!(400)),
                resolved("AAPL", "Apple Inc", 600, dec!(600)),
            ])
            .unwrap();

        assert_eq!(portfolio.total_value, dec!(1000));
        assert_eq!(portfolio.holdings[0].ticker, "AAPL");
        assert_eq!(portfolio.holdings[0].portfolio_weight, dec!(60.00));
        assert_eq!(portfolio.holdings[1].ticker, "TSLA");
        assert_eq!(portfolio.holdings[1].portfolio_weight, dec!(40.00));
        assert!(!portfolio.low_quality);
    }

    #[test]
    fn test_share_classes_merge() {
        let portfolio = PortfolioReconciler::default()
            .reconcile(vec![
                resolved("AAPL", "Apple Inc Class A", 100, dec!(300)),
                resolved(" aapl ", "Apple Inc Class B", 50, dec!(300)),
            ])
            .unwrap();

        assert_eq!(portfolio.holdings.len(), 1);
        let apple = &portfolio.holdings[0];
        assert_eq!(apple.ticker, "AAPL");
        assert_eq!(apple.company_name, "Apple Inc Class A");
        assert_eq!(apple.shares, 150);
        assert_eq!(apple.market_value, dec!(600));
        assert_eq!(apple.portfolio_weight, dec!(100.00));
    }

    #[test]
    fn test_thirds_sum_to_exactly_one_hundred() {
        let portfolio = PortfolioReconciler::default()
            .reconcile(vec![
                resolved("CCC", "C", 1, dec!(100)),
                resolved("AAA", "A", 1, dec!(100)),
                resolved("BBB", "B", 1, dec!(100)),
            ])
            .unwrap();

        assert_eq!(weight_sum(&portfolio), dec!(100.00));
        // The extra hundredth goes to the alphabetically first ticker.
        assert_eq!(portfolio.holdings[0].ticker, "AAA");
        assert_eq!(portfolio.holdings[0].portfolio_weight, dec!(33.34));
        assert_eq!(portfolio.holdings[1].portfolio_weight, dec!(33.33));
        assert_eq!(portfolio.holdings[2].ticker, "CCC");
    }

    #[test]
    fn test_zero_total_recorded_as_low_quality() {
        let portfolio = PortfolioReconciler::new(ZeroTotalPolicy::RecordLowQuality)
            .reconcile(vec![
                resolved("XYZ", "Zero Corp", 10, dec!(0)),
                resolved("ABC", "Nothing Inc", 5, dec!(0)),
            ])
            .unwrap();

        assert!(portfolio.low_quality);
        assert!(portfolio
            .holdings
            .iter()
            .all(|h| h.portfolio_weight == Decimal::ZERO));
        assert_eq!(portfolio.holdings[0].ticker, "ABC");
    }

    #[test]
    fn test_zero_total_rejected_under_fail_policy() {
        let result = PortfolioReconciler::new(ZeroTotalPolicy::Fail)
            .reconcile(vec![resolved("XYZ", "Zero Corp", 10, dec!(0))]);
        assert_eq!(result, Err(ReconcileError::ZeroTotal(1)));
    }

    #[test]
    fn test_empty_snapshot_is_low_quality() {
        let portfolio = PortfolioReconciler::default().reconcile(vec![]).unwrap();
        assert!(portfolio.holdings.is_empty());
        assert!(portfolio.low_quality);
    }

    #[test]
    fn test_blank_ticker_rejected() {
        let result =
            PortfolioReconciler::default().reconcile(vec![resolved("  ", "Mystery", 1, dec!(5))]);
        assert_eq!(
            result,
            Err(ReconcileError::MissingIdentifier("Mystery".to_string()))
        );
    }

    #[test]
    fn test_zero_policy_parsing() {
        assert_eq!(
            "record".parse::<ZeroTotalPolicy>(),
            Ok(ZeroTotalPolicy::RecordLowQuality)
        );
        assert_eq!("FAIL".parse::<ZeroTotalPolicy>(), Ok(ZeroTotalPolicy::Fail));
        assert!("ignore".parse::<ZeroTotalPolicy>().is_err());
    }
}
