use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::TradingError;
use common::models::{Decision, Fill, OrderSide, TradingPair};
use market_data::Exchange;

/// Soft spending cap in quote currency, independent of the real account balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    initial: f64,
    available: f64,
    total_spent: f64,
    total_received: f64,
    /// Buy cost that exceeded what was available and could not be debited.
    overspend: f64,
}

impl Budget {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            available: initial,
            total_spent: 0.0,
            total_received: 0.0,
            overspend: 0.0,
        }
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn total_spent(&self) -> f64 {
        self.total_spent
    }

    pub fn total_received(&self) -> f64 {
        self.total_received
    }

    pub fn overspend(&self) -> f64 {
        self.overspend
    }

    /// Saturates at zero; the excess is kept in `overspend`.
    fn debit(&mut self, cost: f64) {
        self.total_spent += cost;
        if cost > self.available {
            let excess = cost - self.available;
            warn!(
                "Fill cost {:.2} exceeds remaining budget {:.2}; budget clamped to zero",
                cost, self.available
            );
            self.overspend += excess;
            self.available = 0.0;
        } else {
            self.available -= cost;
        }
    }

    fn credit(&mut self, proceeds: f64) {
        self.total_received += proceeds;
        self.available += proceeds;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Position {
    held_amount: f64,
}

impl Position {
    pub fn held_amount(&self) -> f64 {
        self.held_amount
    }

    fn apply(&mut self, fill: &Fill) {
        match fill.side {
            OrderSide::Buy => self.held_amount += fill.filled_amount,
            OrderSide::Sell => {
                self.held_amount = (self.held_amount - fill.filled_amount).max(0.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ledger {
    pub budget: Budget,
    pub position: Position,
}

impl Ledger {
    pub fn new(initial_budget: f64) -> Self {
        Self {
            budget: Budget::new(initial_budget),
            position: Position::default(),
        }
    }

    /// The only way budget and position move.
    fn apply(&mut self, fill: &Fill) {
        match fill.side {
            OrderSide::Buy => self.budget.debit(fill.quote_amount),
            OrderSide::Sell => self.budget.credit(fill.quote_amount),
        }
        self.position.apply(fill);
    }
}

/// Survives loop restarts; the executor is its only writer.
pub type SharedLedger = Arc<Mutex<Ledger>>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Filled(Fill),
    NoAction(String),
}

pub struct ExecutionService {
    exchange: Arc<dyn Exchange>,
    pair: TradingPair,
    order_value: f64,
    ledger: SharedLedger,
}

impl ExecutionService {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        pair: TradingPair,
        order_value: f64,
        ledger: SharedLedger,
    ) -> Self {
        Self {
            exchange,
            pair,
            order_value,
            ledger,
        }
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn exchange(&self) -> Arc<dyn Exchange> {
        self.exchange.clone()
    }

    pub async fn execute(&self, decision: Decision) -> Result<ExecutionOutcome, TradingError> {
        match decision {
            Decision::Buy => self.on_buy_decision().await,
            Decision::Sell => self.on_sell_decision().await,
            Decision::Hold => Ok(self.on_hold_decision()),
        }
    }

    /// Spends `min(order_value, quote balance, budget)` at market.
    ///
    /// The ledger stays locked from sizing until the fill is applied, so a
    /// second order for the pair cannot be sized against a stale budget.
    pub async fn on_buy_decision(&self) -> Result<ExecutionOutcome, TradingError> {
        let mut ledger = self.ledger.lock().await;

        let price = self.exchange.current_price(&self.pair).await?;
        if !price.is_finite() || price <= 0.0 {
            return Err(TradingError::OrderExecutionFailed(format!(
                "unusable price {} for {}",
                price, self.pair
            )));
        }
        let quote_balance = self.exchange.quote_balance(&self.pair).await?;

        let spend = self
            .order_value
            .min(quote_balance)
            .min(ledger.budget.available());
        if spend <= 0.0 {
            return Ok(ExecutionOutcome::NoAction(format!(
                "nothing to spend ({} balance {:.2}, budget {:.2})",
                self.pair.quote,
                quote_balance,
                ledger.budget.available()
            )));
        }

        let fill = self.exchange.market_buy(&self.pair, spend, price).await?;
        self.settle(&mut ledger, fill)?;

        info!(
            "Bought {:.6} {} @ {:.2} for {:.2} {}; budget left {:.2}",
            fill.filled_amount,
            self.pair.base,
            fill.execution_price,
            fill.quote_amount,
            self.pair.quote,
            ledger.budget.available()
        );
        Ok(ExecutionOutcome::Filled(fill))
    }

    /// Sells the whole free base balance at market.
    pub async fn on_sell_decision(&self) -> Result<ExecutionOutcome, TradingError> {
        let mut ledger = self.ledger.lock().await;

        let amount = self.exchange.asset_balance(&self.pair).await?;
        if !amount.is_finite() || amount <= 0.0 {
            return Ok(ExecutionOutcome::NoAction(format!(
                "no {} to sell",
                self.pair.base
            )));
        }

        let fill = self
            .exchange
            .market_order(&self.pair, OrderSide::Sell, amount)
            .await?;
        self.settle(&mut ledger, fill)?;

        info!(
            "Sold {:.6} {} @ {:.2} for {:.2} {}; budget now {:.2}",
            fill.filled_amount,
            self.pair.base,
            fill.execution_price,
            fill.quote_amount,
            self.pair.quote,
            ledger.budget.available()
        );
        Ok(ExecutionOutcome::Filled(fill))
    }

    pub fn on_hold_decision(&self) -> ExecutionOutcome {
        ExecutionOutcome::NoAction("grade between thresholds".to_string())
    }

    fn settle(&self, ledger: &mut Ledger, fill: Fill) -> Result<(), TradingError> {
        if !fill.is_well_formed() {
            return Err(TradingError::OrderExecutionFailed(format!(
                "exchange reported a malformed fill: {:?}",
                fill
            )));
        }
        ledger.apply(&fill);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use market_data::{ExchangeError, PaperExchange};
    use mockall::mock;

    mock! {
        pub Venue {}

        #[async_trait]
        impl Exchange for Venue {
            async fn current_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;
            async fn quote_balance(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;
            async fn asset_balance(&self, pair: &TradingPair) -> Result<f64, ExchangeError>;
            async fn market_order(
                &self,
                pair: &TradingPair,
                side: OrderSide,
                amount: f64,
            ) -> Result<Fill, ExchangeError>;
            async fn market_buy(
                &self,
                pair: &TradingPair,
                spend: f64,
                reference_price: f64,
            ) -> Result<Fill, ExchangeError>;
        }
    }

    fn btc() -> TradingPair {
        TradingPair::new("BTC", "USDT")
    }

    fn service(exchange: Arc<dyn Exchange>, order_value: f64, budget: f64) -> ExecutionService {
        ExecutionService::new(
            exchange,
            btc(),
            order_value,
            Arc::new(Mutex::new(Ledger::new(budget))),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[tokio::test]
    async fn scenario_a_budget_tracks_actual_fill_cost() {
        let mut venue = MockVenue::new();
        venue.expect_current_price().returning(|_| Ok(50_000.0));
        venue.expect_quote_balance().returning(|_| Ok(100.0));
        venue
            .expect_market_buy()
            .withf(|_, spend, price| close(*spend, 100.0) && close(*price, 50_000.0))
            .times(1)
            .returning(|_, _, _| {
                Ok(Fill {
                    side: OrderSide::Buy,
                    filled_amount: 0.001946,
                    execution_price: 50_000.0,
                    quote_amount: 97.30,
                })
            });

        let svc = service(Arc::new(venue), 100.0, 100.0);
        let outcome = svc.execute(Decision::Buy).await.unwrap();

        assert!(matches!(outcome, ExecutionOutcome::Filled(f) if f.quote_amount == 97.30));
        let ledger = svc.ledger().lock().await.clone();
        assert!(close(ledger.budget.available(), 2.70));
        assert!(close(ledger.position.held_amount(), 0.001946));
    }

    #[tokio::test]
    async fn spend_is_capped_by_the_smallest_limit() {
        let exchange = Arc::new(PaperExchange::new(100.0, 30.0));
        let svc = service(exchange.clone(), 100.0, 1_000.0);

        svc.execute(Decision::Buy).await.unwrap();
        let orders = exchange.orders().await;
        assert_eq!(orders.len(), 1);
        assert!(close(orders[0].quote_amount, 30.0));
        assert!(close(svc.ledger().lock().await.budget.available(), 970.0));
    }

    #[tokio::test]
    async fn exhausted_budget_is_no_action() {
        let exchange = Arc::new(PaperExchange::new(100.0, 1_000.0));
        let svc = service(exchange.clone(), 100.0, 0.0);

        let outcome = svc.execute(Decision::Buy).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::NoAction(_)));
        assert!(exchange.orders().await.is_empty());
    }

    #[tokio::test]
    async fn sell_with_nothing_held_submits_nothing() {
        let mut venue = MockVenue::new();
        venue.expect_asset_balance().returning(|_| Ok(0.0));
        venue.expect_market_order().never();

        let svc = service(Arc::new(venue), 100.0, 1_000.0);
        let outcome = svc.execute(Decision::Sell).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::NoAction(_)));
    }

    #[tokio::test]
    async fn sell_credits_actual_proceeds() {
        let exchange = Arc::new(PaperExchange::new(200.0, 0.0).with_asset_balance(0.5));
        let svc = service(exchange.clone(), 100.0, 10.0);

        svc.execute(Decision::Sell).await.unwrap();
        let ledger = svc.ledger().lock().await.clone();
        assert!(close(ledger.budget.available(), 110.0));
        assert!(close(ledger.budget.total_received(), 100.0));
        assert_eq!(exchange.asset().await, 0.0);
    }

    #[tokio::test]
    async fn rejected_order_leaves_ledger_untouched() {
        let exchange = Arc::new(PaperExchange::new(100.0, 1_000.0));
        exchange.reject_next_order("venue maintenance").await;
        let svc = service(exchange, 100.0, 500.0);
        let before = svc.ledger().lock().await.clone();

        let result = svc.execute(Decision::Buy).await;
        assert!(matches!(result, Err(TradingError::OrderExecutionFailed(_))));
        assert_eq!(*svc.ledger().lock().await, before);
    }

    #[tokio::test]
    async fn price_lookup_failure_is_execution_failure() {
        let mut venue = MockVenue::new();
        venue.expect_current_price().returning(|_| {
            Err(ExchangeError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        });
        venue.expect_market_buy().never();

        let svc = service(Arc::new(venue), 100.0, 500.0);
        assert!(matches!(
            svc.execute(Decision::Buy).await,
            Err(TradingError::OrderExecutionFailed(_))
        ));
    }

    #[tokio::test]
    async fn slippage_past_the_budget_saturates_at_zero() {
        let exchange = Arc::new(PaperExchange::new(100.0, 1_000.0).with_slippage(0.05));
        let svc = service(exchange, 100.0, 50.0);

        svc.execute(Decision::Buy).await.unwrap();
        let ledger = svc.ledger().lock().await.clone();
        assert_eq!(ledger.budget.available(), 0.0);
        assert!(close(ledger.budget.total_spent(), 52.5));
        assert!(close(ledger.budget.overspend(), 2.5));
    }

    #[tokio::test]
    async fn budget_identity_holds_over_a_round_trip() {
        let exchange = Arc::new(PaperExchange::new(100.0, 1_000.0).with_fill_ratio(0.8));
        let svc = service(exchange.clone(), 100.0, 250.0);

        svc.execute(Decision::Buy).await.unwrap();
        exchange.set_price(120.0).await;
        svc.execute(Decision::Buy).await.unwrap();
        svc.execute(Decision::Hold).await.unwrap();
        svc.execute(Decision::Sell).await.unwrap();

        let budget = svc.ledger().lock().await.budget.clone();
        assert!(budget.available() >= 0.0);
        assert!(close(
            budget.available(),
            budget.initial() - budget.total_spent() + budget.total_received()
        ));
        // partial fills leave part of the position on the venue
        assert!(close(
            svc.ledger().lock().await.position.held_amount(),
            exchange.asset().await
        ));
    }
}
