use chrono::{DateTime, Utc};
use serde::Serialize;

use common::models::{OrderSide, Signal};

use crate::policy::ThresholdPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// A buy or sell point to overlay on a price chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeMarker {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub side: OrderSide,
}

/// Replays the threshold policy over historical bars.
///
/// Each bar takes the most recent signal at or before its timestamp; bars with
/// no earlier signal, and bars whose grade holds, produce no marker. `signals`
/// must be sorted by timestamp.
pub fn mark_trades(
    bars: &[PriceBar],
    signals: &[Signal],
    policy: &ThresholdPolicy,
) -> Vec<TradeMarker> {
    bars.iter()
        .filter_map(|bar| {
            let seen = signals.partition_point(|s| s.timestamp <= bar.timestamp);
            let signal = signals.get(seen.checked_sub(1)?)?;
            policy.decide(signal.grade).side().map(|side| TradeMarker {
                timestamp: bar.timestamp,
                price: bar.close,
                side,
            })
        })
        .collect()
}
