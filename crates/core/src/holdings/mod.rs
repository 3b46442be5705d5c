//! Holdings module - snapshots, persistence trait and reconciliation.

mod holdings_model;
mod holdings_traits;
mod reconciler;

pub use holdings_model::{
    Holding, HoldingSnapshot, ReconciledPortfolio, ResolvedHolding, WeightedHolding,
    ZeroTotalPolicy,
};
pub use holdings_traits::HoldingsStore;
pub use reconciler::PortfolioReconciler;
