use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of an information table, in document order.
///
/// `market_value` is always in dollars regardless of how the filing
/// reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedHolding {
    pub cusip: String,
    pub issuer: String,
    pub title_of_class: Option<String>,
    pub shares: i64,
    pub market_value: Decimal,
    /// `PUT` or `CALL` for option positions.
    pub put_call: Option<String>,
}

impl ParsedHolding {
    pub fn is_option(&self) -> bool {
        self.put_call.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}
