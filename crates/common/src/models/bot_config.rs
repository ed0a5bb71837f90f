use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use super::{AssetId, TradingPair};
use crate::error::TradingError;

/// Selects the decision policy: live bots use thresholds, backtests the EMA crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Live,
    Backtesting,
}

impl FromStr for TradeType {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "backtesting" | "backtest" => Ok(Self::Backtesting),
            other => Err(TradingError::config(format!("unknown trade type '{}'", other))),
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Backtesting => write!(f, "backtesting"),
        }
    }
}

/// The bot record kept by the external record store, as the engine consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    pub description: Option<String>,
    pub trade_type: TradeType,
    pub asset: AssetId,
    pub pair: TradingPair,
    pub initial_budget: f64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub order_value: f64,
    pub price_interval: Duration,
    pub trade_interval: Duration,
    pub ema_fast_span: usize,
    pub ema_slow_span: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "grade-bot".to_string(),
            description: None,
            trade_type: TradeType::Live,
            // Bitcoin on the scoring service
            asset: AssetId::TokenId(3375),
            pair: TradingPair::new("BTC", "USDT"),
            initial_budget: 1000.0,
            buy_threshold: 80.0,
            sell_threshold: 50.0,
            order_value: 100.0,
            price_interval: Duration::from_secs(10),
            trade_interval: Duration::from_secs(30),
            ema_fast_span: 3,
            ema_slow_span: 7,
        }
    }
}

impl BotConfig {
    /// Rejects configurations the engine must not start with. Nothing is clamped.
    pub fn validate(&self) -> Result<(), TradingError> {
        for (field, value) in [
            ("buy_threshold", self.buy_threshold),
            ("sell_threshold", self.sell_threshold),
            ("order_value", self.order_value),
            ("initial_budget", self.initial_budget),
        ] {
            if !value.is_finite() {
                return Err(TradingError::config(format!("{} must be finite", field)));
            }
        }
        if self.sell_threshold > self.buy_threshold {
            return Err(TradingError::config(format!(
                "sell_threshold ({}) is above buy_threshold ({})",
                self.sell_threshold, self.buy_threshold
            )));
        }
        if self.initial_budget < 0.0 {
            return Err(TradingError::config("initial_budget must not be negative"));
        }
        if self.order_value <= 0.0 {
            return Err(TradingError::config("order_value must be positive"));
        }
        if self.price_interval.is_zero() || self.trade_interval.is_zero() {
            return Err(TradingError::config("polling intervals must be non-zero"));
        }
        if self.ema_fast_span == 0 || self.ema_fast_span >= self.ema_slow_span {
            return Err(TradingError::config(format!(
                "EMA spans must satisfy 1 <= fast < slow (got {} / {})",
                self.ema_fast_span, self.ema_slow_span
            )));
        }
        Ok(())
    }
}
