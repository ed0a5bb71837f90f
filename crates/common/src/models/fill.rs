use serde::{Deserialize, Serialize};

use super::OrderSide;

/// What the exchange actually executed for one order.
///
/// The only input allowed to move the budget or the position: partial fills
/// are reported as-is, never rounded up to the requested amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: OrderSide,
    pub filled_amount: f64,
    pub execution_price: f64,
    /// Quote spent on a buy, quote received on a sell.
    pub quote_amount: f64,
}

impl Fill {
    /// Fill assumed when a backend reports none: the requested amount at the reference price.
    /// An approximation, not a guarantee of what was executed.
    pub fn assumed(side: OrderSide, requested_amount: f64, price: f64) -> Self {
        Self {
            side,
            filled_amount: requested_amount,
            execution_price: price,
            quote_amount: requested_amount * price,
        }
    }

    /// Signed effect on the quote budget: negative for buys, positive for sells.
    pub fn quote_delta(&self) -> f64 {
        match self.side {
            OrderSide::Buy => -self.quote_amount,
            OrderSide::Sell => self.quote_amount,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.filled_amount.is_finite()
            && self.filled_amount >= 0.0
            && self.quote_amount.is_finite()
            && self.quote_amount >= 0.0
            && self.execution_price.is_finite()
    }
}
