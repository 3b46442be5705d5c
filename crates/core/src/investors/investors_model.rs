//! Investor domain models.

use serde::{Deserialize, Serialize};

/// A tracked institutional investor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvestorProfile {
    /// Stable slug, e.g. `buffett`.
    pub investor_id: String,
    pub name: String,
    pub organization: Option<String>,
    /// SEC Central Index Key of the filing manager.
    pub external_filer_id: String,
    pub active: bool,
}
