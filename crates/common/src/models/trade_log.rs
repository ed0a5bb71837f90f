use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Decision, Fill, OrderSide, TradingPair};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TradeStatus {
    Executed,
    NoAction(String),
    Failed(String),
}

/// One human-readable line of the live trade log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub pair: TradingPair,
    pub side: Option<OrderSide>,
    pub amount: f64,
    pub price: f64,
    pub quote_delta: f64,
    pub status: TradeStatus,
}

impl TradeLogEntry {
    pub fn executed(timestamp: DateTime<Utc>, pair: &TradingPair, fill: &Fill) -> Self {
        Self {
            timestamp,
            pair: pair.clone(),
            side: Some(fill.side),
            amount: fill.filled_amount,
            price: fill.execution_price,
            quote_delta: fill.quote_delta(),
            status: TradeStatus::Executed,
        }
    }

    pub fn no_action(
        timestamp: DateTime<Utc>,
        pair: &TradingPair,
        decision: Decision,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            pair: pair.clone(),
            side: decision.side(),
            amount: 0.0,
            price: 0.0,
            quote_delta: 0.0,
            status: TradeStatus::NoAction(reason.into()),
        }
    }

    pub fn failed(
        timestamp: DateTime<Utc>,
        pair: &TradingPair,
        side: Option<OrderSide>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            pair: pair.clone(),
            side,
            amount: 0.0,
            price: 0.0,
            quote_delta: 0.0,
            status: TradeStatus::Failed(reason.into()),
        }
    }
}

impl fmt::Display for TradeLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.format("%H:%M:%S");
        let side = self.side.map(|s| s.as_str()).unwrap_or("-");

        match &self.status {
            TradeStatus::Executed => {
                let flow = match self.side {
                    Some(OrderSide::Sell) => "recv",
                    _ => "spent",
                };
                write!(
                    f,
                    "{}  {:<4} {:.6} {} @ {:.2}  {}-{}: {:.2}",
                    time,
                    side,
                    self.amount,
                    self.pair.base,
                    self.price,
                    self.pair.quote,
                    flow,
                    self.quote_delta.abs(),
                )
            }
            TradeStatus::NoAction(reason) => write!(f, "{}  {:<4} no action: {}", time, side, reason),
            TradeStatus::Failed(reason) => write!(f, "{}  {:<4} FAILED: {}", time, side, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 5).unwrap()
    }

    #[test]
    fn executed_buy_line() {
        let fill = Fill {
            side: OrderSide::Buy,
            filled_amount: 0.001946,
            execution_price: 50_000.0,
            quote_amount: 97.3,
        };
        let entry = TradeLogEntry::executed(noon(), &TradingPair::new("BTC", "USDT"), &fill);
        assert_eq!(entry.quote_delta, -97.3);
        assert_eq!(
            entry.to_string(),
            "12:00:05  BUY  0.001946 BTC @ 50000.00  USDT-spent: 97.30"
        );
    }

    #[test]
    fn executed_sell_line_reports_proceeds() {
        let fill = Fill::assumed(OrderSide::Sell, 0.5, 200.0);
        let entry = TradeLogEntry::executed(noon(), &TradingPair::new("ETH", "USDT"), &fill);
        assert_eq!(
            entry.to_string(),
            "12:00:05  SELL 0.500000 ETH @ 200.00  USDT-recv: 100.00"
        );
    }

    #[test]
    fn failed_line_carries_reason() {
        let entry = TradeLogEntry::failed(
            noon(),
            &TradingPair::new("BTC", "USDT"),
            Some(OrderSide::Sell),
            "insufficient balance",
        );
        assert_eq!(entry.to_string(), "12:00:05  SELL FAILED: insufficient balance");
    }
}
