use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::TradingError;
use common::actors::{Actor, ActorType, ControlMessage, HeartbeatGuard};
use common::models::{AssetId, BalanceSummary, BotConfig, TradeLogEntry};
use market_data::SignalSource;
use strategy::{Policy, TradeMarker};

use crate::services::execution_service::{ExecutionOutcome, ExecutionService};
use crate::services::snapshot::{LoopState, PricePoint, SharedSnapshot};

/// Live loop: a price timer and a trade timer multiplexed on one task.
///
/// Ticks never overlap; a cycle that overruns its period makes the next tick
/// get skipped, not replayed. All state lives behind the shared ledger and
/// snapshot handles, so a restarted loop carries on where the old one stopped.
pub struct TradingLoop {
    id: Uuid,
    asset: AssetId,
    policy: Policy,
    signals: Arc<dyn SignalSource>,
    executor: Arc<ExecutionService>,
    snapshot: SharedSnapshot,
    notification_tx: Option<broadcast::Sender<String>>,
    price_interval: Duration,
    trade_interval: Duration,
}

#[async_trait]
impl Actor for TradingLoop {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::TradingLoop
    }

    async fn run(&mut self, supervisor_tx: mpsc::Sender<ControlMessage>) -> anyhow::Result<()> {
        let _heartbeat = HeartbeatGuard::new(self.spawn_heartbeat(supervisor_tx.clone()));

        info!(
            "Starting trading loop for {} on {} ({} policy, price every {:?}, trade every {:?})",
            self.asset,
            self.executor.pair(),
            self.policy.name(),
            self.price_interval,
            self.trade_interval
        );

        let mut price_timer = time::interval(self.price_interval);
        price_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut trade_timer = time::interval(self.trade_interval);
        trade_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = price_timer.tick() => self.refresh_price().await,
                _ = trade_timer.tick() => {
                    if let Err(e) = self.run_decision_cycle().await {
                        supervisor_tx.try_send(ControlMessage::Shutdown(self.id))?;
                        return Err(e.into());
                    }
                }
            }
        }
    }
}

impl TradingLoop {
    pub fn new(
        config: &BotConfig,
        policy: Policy,
        signals: Arc<dyn SignalSource>,
        executor: Arc<ExecutionService>,
        snapshot: SharedSnapshot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset: config.asset.clone(),
            policy,
            signals,
            executor,
            snapshot,
            notification_tx: None,
            price_interval: config.price_interval,
            trade_interval: config.trade_interval,
        }
    }

    pub fn with_notifier(mut self, tx: broadcast::Sender<String>) -> Self {
        self.notification_tx = Some(tx);
        self
    }

    async fn set_state(&self, state: LoopState) {
        self.snapshot.write().await.state = state;
    }

    /// Appends the current price to the chart series. Failures are logged and skipped.
    pub async fn refresh_price(&self) {
        self.set_state(LoopState::PollingPrice).await;

        match self
            .executor
            .exchange()
            .current_price(self.executor.pair())
            .await
        {
            Ok(price) => {
                debug!("{} price {:.2}", self.executor.pair(), price);
                self.snapshot.write().await.prices.push(PricePoint {
                    timestamp: Utc::now(),
                    price,
                });
            }
            Err(e) => warn!("Price refresh for {} failed: {}", self.executor.pair(), e),
        }

        self.set_state(LoopState::Idle).await;
    }

    /// One cycle: fetch signal, decide, execute, log.
    ///
    /// Returns the trade-log line written for the cycle, or `None` when the
    /// source had no signal in its window. Errors that cannot clear on a later
    /// tick are returned instead of logged.
    pub async fn run_decision_cycle(&self) -> Result<Option<TradeLogEntry>, TradingError> {
        self.set_state(LoopState::PollingSignal).await;

        let pair = self.executor.pair().clone();
        let entry = match self.signals.fetch_current(&self.asset).await {
            Err(TradingError::NoSignalAvailable { asset }) => {
                debug!("No signal for {} in the lookback window; holding", asset);
                None
            }
            Err(e) if !e.is_recoverable() => {
                error!("Stopping trading loop: {}", e);
                self.set_state(LoopState::Idle).await;
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping cycle: {}", e);
                Some(TradeLogEntry::failed(Utc::now(), &pair, None, e.to_string()))
            }
            Ok(signal) => {
                let decision = self.policy.decide(&[signal.grade]);
                info!(
                    "Signal {} grade {:.2} at {} -> {}",
                    signal.asset, signal.grade, signal.timestamp, decision
                );
                self.snapshot.write().await.last_signal = Some(signal);

                let now = Utc::now();
                match self.executor.execute(decision).await {
                    Ok(ExecutionOutcome::Filled(fill)) => {
                        self.snapshot.write().await.markers.push(TradeMarker {
                            timestamp: now,
                            price: fill.execution_price,
                            side: fill.side,
                        });
                        Some(TradeLogEntry::executed(now, &pair, &fill))
                    }
                    Ok(ExecutionOutcome::NoAction(reason)) => {
                        Some(TradeLogEntry::no_action(now, &pair, decision, reason))
                    }
                    Err(e) => {
                        error!("{} order failed: {}", decision, e);
                        Some(TradeLogEntry::failed(now, &pair, decision.side(), e.to_string()))
                    }
                }
            }
        };

        if let Some(entry) = &entry {
            info!("{}", entry);
            self.snapshot.write().await.trade_log.push(entry.clone());
            if let Some(tx) = &self.notification_tx {
                // no subscribers is fine
                let _ = tx.send(entry.to_string());
            }
        }

        self.refresh_balance().await;
        self.set_state(LoopState::Idle).await;
        Ok(entry)
    }

    async fn refresh_balance(&self) {
        let exchange = self.executor.exchange();
        let pair = self.executor.pair();

        let balances = async {
            let quote = exchange.quote_balance(pair).await?;
            let asset = exchange.asset_balance(pair).await?;
            Ok::<_, market_data::ExchangeError>((quote, asset))
        };

        match balances.await {
            Ok((quote_balance, asset_balance)) => {
                let shared = self.executor.ledger();
                let ledger = shared.lock().await;
                let summary = BalanceSummary {
                    pair: pair.clone(),
                    quote_balance,
                    asset_balance,
                    budget_available: ledger.budget.available(),
                    position_held: ledger.position.held_amount(),
                };
                debug!("{}", summary);
                self.snapshot.write().await.balance = Some(summary);
            }
            Err(e) => warn!("Balance refresh failed: {}", e),
        }
    }
}
