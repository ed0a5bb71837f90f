//! In-process exchange for dry runs and tests.
//!
//! Orders fill immediately against a settable price. Slippage, partial fills
//! and one-shot rejections can be configured to exercise the executor's
//! accounting paths.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use common::models::{Fill, OrderSide, TradingPair};

use crate::error::ExchangeError;
use crate::traits::Exchange;

#[derive(Debug)]
struct PaperBook {
    price: f64,
    quote_balance: f64,
    asset_balance: f64,
    slippage: f64,
    fill_ratio: f64,
    reject_next: Option<String>,
    orders: Vec<Fill>,
}

#[derive(Debug)]
pub struct PaperExchange {
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(price: f64, quote_balance: f64) -> Self {
        Self {
            book: Mutex::new(PaperBook {
                price,
                quote_balance,
                asset_balance: 0.0,
                slippage: 0.0,
                fill_ratio: 1.0,
                reject_next: None,
                orders: Vec::new(),
            }),
        }
    }

    pub fn with_asset_balance(mut self, amount: f64) -> Self {
        self.book.get_mut().asset_balance = amount;
        self
    }

    /// Fractional price penalty: buys pay `price * (1 + s)`, sells receive `price * (1 - s)`.
    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.book.get_mut().slippage = slippage;
        self
    }

    /// Share of each requested amount that actually executes, clamped to `[0, 1]`.
    pub fn with_fill_ratio(mut self, ratio: f64) -> Self {
        self.book.get_mut().fill_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub async fn set_price(&self, price: f64) {
        self.book.lock().await.price = price;
    }

    pub async fn reject_next_order(&self, reason: impl Into<String>) {
        self.book.lock().await.reject_next = Some(reason.into());
    }

    /// Every fill executed so far, oldest first.
    pub async fn orders(&self) -> Vec<Fill> {
        self.book.lock().await.orders.clone()
    }

    pub async fn quote(&self) -> f64 {
        self.book.lock().await.quote_balance
    }

    pub async fn asset(&self) -> f64 {
        self.book.lock().await.asset_balance
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn current_price(&self, _pair: &TradingPair) -> Result<f64, ExchangeError> {
        let price = self.book.lock().await.price;
        if !price.is_finite() || price <= 0.0 {
            return Err(ExchangeError::InvalidPrice(price));
        }
        Ok(price)
    }

    async fn quote_balance(&self, _pair: &TradingPair) -> Result<f64, ExchangeError> {
        Ok(self.book.lock().await.quote_balance)
    }

    async fn asset_balance(&self, _pair: &TradingPair) -> Result<f64, ExchangeError> {
        Ok(self.book.lock().await.asset_balance)
    }

    async fn market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        amount: f64,
    ) -> Result<Fill, ExchangeError> {
        let mut book = self.book.lock().await;

        if let Some(reason) = book.reject_next.take() {
            return Err(ExchangeError::Rejected(reason));
        }
        if !book.price.is_finite() || book.price <= 0.0 {
            return Err(ExchangeError::InvalidPrice(book.price));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ExchangeError::Rejected(format!("invalid amount {}", amount)));
        }

        let filled_amount = amount * book.fill_ratio;
        let fill = match side {
            OrderSide::Buy => {
                let execution_price = book.price * (1.0 + book.slippage);
                let cost = filled_amount * execution_price;
                if cost > book.quote_balance {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient {}: need {:.2}, have {:.2}",
                        pair.quote, cost, book.quote_balance
                    )));
                }
                book.quote_balance -= cost;
                book.asset_balance += filled_amount;
                Fill {
                    side,
                    filled_amount,
                    execution_price,
                    quote_amount: cost,
                }
            }
            OrderSide::Sell => {
                if filled_amount > book.asset_balance {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient {}: need {}, have {}",
                        pair.base, filled_amount, book.asset_balance
                    )));
                }
                let execution_price = book.price * (1.0 - book.slippage);
                let proceeds = filled_amount * execution_price;
                book.asset_balance -= filled_amount;
                book.quote_balance += proceeds;
                Fill {
                    side,
                    filled_amount,
                    execution_price,
                    quote_amount: proceeds,
                }
            }
        };

        info!(
            "[PAPER] {} {:.6} {} @ {:.2}",
            side, fill.filled_amount, pair.base, fill.execution_price
        );
        book.orders.push(fill);
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> TradingPair {
        TradingPair::new("BTC", "USDT")
    }

    #[tokio::test]
    async fn buy_then_sell_moves_balances() {
        let exchange = PaperExchange::new(50_000.0, 1_000.0);
        let buy = exchange
            .market_order(&btc(), OrderSide::Buy, 0.002)
            .await
            .unwrap();
        assert_eq!(buy.quote_amount, 100.0);
        assert_eq!(exchange.quote().await, 900.0);
        assert_eq!(exchange.asset().await, 0.002);

        exchange.set_price(60_000.0).await;
        let sell = exchange
            .market_order(&btc(), OrderSide::Sell, 0.002)
            .await
            .unwrap();
        assert_eq!(sell.quote_amount, 120.0);
        assert_eq!(exchange.asset().await, 0.0);
        assert_eq!(exchange.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn partial_fill_reports_executed_amount() {
        let exchange = PaperExchange::new(100.0, 1_000.0).with_fill_ratio(0.5);
        let fill = exchange
            .market_order(&btc(), OrderSide::Buy, 2.0)
            .await
            .unwrap();
        assert_eq!(fill.filled_amount, 1.0);
        assert_eq!(fill.quote_amount, 100.0);
    }

    #[tokio::test]
    async fn slippage_worsens_both_sides() {
        let exchange = PaperExchange::new(100.0, 1_000.0)
            .with_asset_balance(1.0)
            .with_slippage(0.01);
        let buy = exchange
            .market_order(&btc(), OrderSide::Buy, 1.0)
            .await
            .unwrap();
        let sell = exchange
            .market_order(&btc(), OrderSide::Sell, 1.0)
            .await
            .unwrap();
        assert!((buy.execution_price - 101.0).abs() < 1e-9);
        assert!((sell.execution_price - 99.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejection_is_one_shot() {
        let exchange = PaperExchange::new(100.0, 1_000.0);
        exchange.reject_next_order("maintenance").await;
        assert!(matches!(
            exchange.market_order(&btc(), OrderSide::Buy, 1.0).await,
            Err(ExchangeError::Rejected(_))
        ));
        assert!(exchange.market_order(&btc(), OrderSide::Buy, 1.0).await.is_ok());
    }

    #[tokio::test]
    async fn overdrawn_orders_are_rejected() {
        let exchange = PaperExchange::new(100.0, 50.0);
        assert!(exchange.market_order(&btc(), OrderSide::Buy, 1.0).await.is_err());
        assert!(exchange.market_order(&btc(), OrderSide::Sell, 1.0).await.is_err());
        assert!(exchange.orders().await.is_empty());
    }

    #[tokio::test]
    async fn zero_price_is_invalid() {
        let exchange = PaperExchange::new(0.0, 50.0);
        assert!(matches!(
            exchange.current_price(&btc()).await,
            Err(ExchangeError::InvalidPrice(_))
        ));
    }
}
