pub mod error;
pub mod paper;
pub mod remote;
pub mod traits;

pub use error::{ExchangeError, SignalSourceError};
pub use paper::PaperExchange;
pub use remote::signal_response::TokenInfo;
pub use remote::{BinanceClient, TokenMetricsClient};
pub use traits::{Exchange, SignalSource};
