use std::sync::Arc;

use anyhow::{Context, bail};
use dotenvy::dotenv;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, error, info};

use common::actors::{Actor, ActorType};
use common::config::{AppConfig, ExchangeKind};
use common::logger;
use common::models::TradeType;
use market_data::{BinanceClient, Exchange, PaperExchange, SignalSource, TokenMetricsClient};
use strategy::{Policy, backtest};

use crate::actors::supervisor::Supervisor;
use crate::services::execution_service::{ExecutionService, Ledger};
use crate::services::snapshot::LiveSnapshot;
use crate::services::telegram_service::TelegramService;
use crate::services::trading_loop::TradingLoop;

mod actors;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();
    debug!("System starting up...");

    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(
        "Bot '{}' ({}) trading {} as {}",
        config.bot.name, config.bot.trade_type, config.bot.asset, config.bot.pair
    );

    match config.bot.trade_type {
        TradeType::Live => run_live(config).await,
        TradeType::Backtesting => run_backtest(&config),
    }
}

async fn run_live(config: AppConfig) -> anyhow::Result<()> {
    let exchange: Arc<dyn Exchange> = match config.exchange.kind {
        ExchangeKind::Binance => {
            let client = BinanceClient::new(&config.exchange, config.http_timeout)
                .context("failed to build Binance client")?;
            match client.get_account().await {
                Ok(account) => info!(
                    "Binance account connected at {}. Can trade: {}",
                    config.exchange.base_url, account.can_trade
                ),
                Err(e) => error!("Failed to fetch account info: {}", e),
            }
            Arc::new(client)
        }
        ExchangeKind::Paper => {
            info!(
                "Paper exchange: {} {} at {} per {}",
                config.exchange.paper_quote_balance,
                config.bot.pair.quote,
                config.exchange.paper_price,
                config.bot.pair.base
            );
            Arc::new(PaperExchange::new(
                config.exchange.paper_price,
                config.exchange.paper_quote_balance,
            ))
        }
    };

    let client = TokenMetricsClient::new(&config.signal_source, config.http_timeout)
        .context("failed to build signal source client")?;
    let mut bot = config.bot.clone();
    bot.asset = client.resolve_asset(bot.asset).await;
    let signals: Arc<dyn SignalSource> = Arc::new(client);
    let policy = Policy::for_bot(&config.bot).context("invalid policy configuration")?;

    let ledger = Arc::new(Mutex::new(Ledger::new(config.bot.initial_budget)));
    let executor = Arc::new(ExecutionService::new(
        exchange,
        config.bot.pair.clone(),
        config.bot.order_value,
        ledger,
    ));
    let snapshot = Arc::new(RwLock::new(LiveSnapshot::new(
        config.price_history,
        config.trade_log_capacity,
    )));
    let (notify_tx, _) = broadcast::channel::<String>(256);

    let mut supervisor = Supervisor::new();

    let tx_for_loop = notify_tx.clone();
    supervisor.register_actor(
        ActorType::TradingLoop,
        Box::new(move || -> Box<dyn Actor> {
            Box::new(
                TradingLoop::new(
                    &bot,
                    policy.clone(),
                    signals.clone(),
                    executor.clone(),
                    snapshot.clone(),
                )
                .with_notifier(tx_for_loop.clone()),
            )
        }),
    );

    match config.telegram {
        Some(telegram) => {
            let tx_for_telegram = notify_tx.clone();
            supervisor.register_actor(
                ActorType::Notifier,
                Box::new(move || -> Box<dyn Actor> {
                    Box::new(TelegramService::new(&telegram, tx_for_telegram.subscribe()))
                }),
            );
        }
        None => debug!("Telegram not configured; notifications disabled"),
    }

    supervisor.start().await;
    Ok(())
}

fn run_backtest(config: &AppConfig) -> anyhow::Result<()> {
    let Policy::EmaCrossover(policy) = Policy::for_bot(&config.bot)? else {
        bail!("backtesting requires the EMA-crossover policy");
    };
    let path = config
        .backtest_data
        .as_ref()
        .context("BACKTEST_DATA is not set")?;

    let inputs = backtest::load_inputs(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let (series, report) = backtest::run(inputs, &policy).context("backtest failed")?;

    for row in series.rows.iter().rev().take(5).rev() {
        debug!(
            "{} grade {:.2} fast {:.2} slow {:.2} {} return {:+.4}",
            row.date,
            row.grade,
            row.ema_fast,
            row.ema_slow,
            if row.long { "long" } else { "flat" },
            row.portfolio_return_pct
        );
    }
    info!(
        "Backtest over {} days ({} long): mean daily return {:.5}, estimated annual return {:.4}",
        report.days, report.long_days, report.mean_daily_return, report.annual_return
    );
    Ok(())
}
