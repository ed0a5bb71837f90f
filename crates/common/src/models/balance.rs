use std::fmt;

use serde::Serialize;

use super::TradingPair;

/// Balance line shown to the presentation layer after each decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub pair: TradingPair,
    pub quote_balance: f64,
    pub asset_balance: f64,
    pub budget_available: f64,
    pub position_held: f64,
}

impl fmt::Display for BalanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2} | {}: {:.6} | Remaining budget: {:.2} {}",
            self.pair.quote,
            self.quote_balance,
            self.pair.base,
            self.asset_balance,
            self.budget_available,
            self.pair.quote,
        )
    }
}
