use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::TradingError;
use common::models::{AssetId, Fill, OrderSide, Signal, TradingPair};

use crate::error::ExchangeError;

/// Read-only access to the external grade series.
///
/// Implementations never retry: the caller's polling cadence is the retry policy.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Signals in `[start, end]`, sorted by timestamp. An empty window is not an error here.
    async fn fetch_window(
        &self,
        asset: &AssetId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Signal>, TradingError>;

    /// Latest signal inside the source's lookback window.
    ///
    /// Fails with [`TradingError::NoSignalAvailable`] when the window is empty;
    /// callers must treat that as HOLD, never as a zero grade.
    async fn fetch_current(&self, asset: &AssetId) -> Result<Signal, TradingError>;
}

/// Capabilities the executor needs from an exchange, whatever backs it.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn current_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;

    /// Spendable balance of the pair's quote asset.
    async fn quote_balance(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;

    /// Spendable balance of the pair's base asset.
    async fn asset_balance(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;

    /// Submits a market order for `amount` units of the base asset and reports what was executed.
    async fn market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        amount: f64,
    ) -> Result<Fill, ExchangeError>;

    /// Spends `spend` units of the quote asset at market.
    ///
    /// Venues that only size orders in the base asset get `spend / reference_price` units.
    async fn market_buy(
        &self,
        pair: &TradingPair,
        spend: f64,
        reference_price: f64,
    ) -> Result<Fill, ExchangeError> {
        self.market_order(pair, OrderSide::Buy, spend / reference_price)
            .await
    }
}
