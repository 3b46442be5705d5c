use crate::errors::Result;
use crate::investors::investors_model::InvestorProfile;

/// Read access to the configured investor roster.
pub trait InvestorDirectory: Send + Sync {
    fn list_investors(&self) -> Result<Vec<InvestorProfile>>;
    fn active_investors(&self) -> Result<Vec<InvestorProfile>>;
    fn get_investor(&self, investor_id: &str) -> Result<Option<InvestorProfile>>;
}
