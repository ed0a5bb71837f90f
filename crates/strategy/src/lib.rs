pub mod backtest;
pub mod markers;
pub mod policy;

pub use backtest::{BacktestError, BacktestInput, BacktestReport, BacktestRow, BacktestSeries};
pub use markers::{PriceBar, TradeMarker, mark_trades};
pub use policy::{EmaCrossoverPolicy, EmaPoint, Policy, ThresholdPolicy};
