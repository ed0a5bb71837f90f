use common::TradingError;
use common::models::Decision;

/// `grade >= buy` buys, `grade <= sell` sells, anything between holds.
///
/// The buy check runs first, so with `buy == sell` a grade equal to both buys.
pub fn decide(grade: f64, buy_threshold: f64, sell_threshold: f64) -> Decision {
    if grade >= buy_threshold {
        Decision::Buy
    } else if grade <= sell_threshold {
        Decision::Sell
    } else {
        Decision::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    buy_threshold: f64,
    sell_threshold: f64,
}

impl ThresholdPolicy {
    pub fn new(buy_threshold: f64, sell_threshold: f64) -> Result<Self, TradingError> {
        if !buy_threshold.is_finite() || !sell_threshold.is_finite() {
            return Err(TradingError::config("thresholds must be finite"));
        }
        if sell_threshold > buy_threshold {
            return Err(TradingError::config(format!(
                "sell threshold {} is above buy threshold {}",
                sell_threshold, buy_threshold
            )));
        }
        Ok(Self {
            buy_threshold,
            sell_threshold,
        })
    }

    pub fn decide(&self, grade: f64) -> Decision {
        decide(grade, self.buy_threshold, self.sell_threshold)
    }

    pub fn buy_threshold(&self) -> f64 {
        self.buy_threshold
    }

    pub fn sell_threshold(&self) -> f64 {
        self.sell_threshold
    }
}
