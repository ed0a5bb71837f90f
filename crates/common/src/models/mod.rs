pub mod balance;
pub mod bot_config;
pub mod decision;
pub mod fill;
pub mod pair;
pub mod signal;
pub mod trade_log;

pub use balance::BalanceSummary;
pub use bot_config::{BotConfig, TradeType};
pub use decision::{Decision, OrderSide};
pub use fill::Fill;
pub use pair::TradingPair;
pub use signal::{AssetId, Signal};
pub use trade_log::{TradeLogEntry, TradeStatus};
