pub mod binance_client;
pub mod signal_response;
pub mod token_metrics_client;

pub use binance_client::BinanceClient;
pub use token_metrics_client::TokenMetricsClient;
