use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How an asset is addressed on the scoring service.
///
/// Symbols collide across distinct assets upstream (several tokens trade as
/// "BTC"), so the numeric token id is preferred whenever it is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetId {
    TokenId(u64),
    Symbol(String),
}

impl AssetId {
    /// Symbol as the scoring service expects it ("BTC-USD" -> "BTCUSD").
    pub fn normalized_symbol(symbol: &str) -> String {
        symbol.replace('-', "").to_uppercase()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenId(id) => write!(f, "token#{}", id),
            Self::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

/// One grade observation for an asset. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset: AssetId,
    pub symbol: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub grade: f64,
    /// Every other field the source returned, untouched.
    #[serde(default)]
    pub raw: Map<String, Value>,
}

impl Signal {
    pub fn new(asset: AssetId, timestamp: DateTime<Utc>, grade: f64) -> Self {
        Self {
            asset,
            symbol: None,
            timestamp,
            grade,
            raw: Map::new(),
        }
    }

    /// Most recent signal of a window, regardless of the order the source returned it in.
    pub fn latest(window: &[Signal]) -> Option<&Signal> {
        window.iter().max_by_key(|s| s.timestamp)
    }

    pub fn sort_window(window: &mut [Signal]) {
        window.sort_by_key(|s| s.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, grade: f64) -> Signal {
        let ts = Utc.with_ymd_and_hms(2025, 5, 1, 12, minute, 0).unwrap();
        Signal::new(AssetId::TokenId(3375), ts, grade)
    }

    #[test]
    fn latest_ignores_source_order() {
        let window = vec![at(30, 70.0), at(50, 85.0), at(10, 40.0)];
        assert_eq!(Signal::latest(&window).unwrap().grade, 85.0);
    }

    #[test]
    fn latest_of_empty_window_is_none() {
        assert!(Signal::latest(&[]).is_none());
    }

    #[test]
    fn sort_window_orders_by_timestamp() {
        let mut window = vec![at(30, 1.0), at(10, 2.0), at(20, 3.0)];
        Signal::sort_window(&mut window);
        let grades: Vec<f64> = window.iter().map(|s| s.grade).collect();
        assert_eq!(grades, vec![2.0, 3.0, 1.0]);
    }

    #[test]
    fn symbol_normalization_strips_dashes() {
        assert_eq!(AssetId::normalized_symbol("btc-usd"), "BTCUSD");
    }
}
