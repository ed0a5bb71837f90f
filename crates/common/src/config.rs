//! Process configuration, read from the environment (a `.env` file is loaded
//! by the binary before this runs).

use std::{path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

use crate::error::TradingError;
use crate::models::{AssetId, BotConfig, TradeType, TradingPair};

pub const DEFAULT_SIGNAL_BASE_URL: &str = "https://api.tokenmetrics.com";
pub const BINANCE_TESTNET_URL: &str = "https://testnet.binance.vision";
pub const DEFAULT_TRADE_LOG_CAPACITY: usize = 50;
pub const DEFAULT_PRICE_HISTORY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Binance,
    Paper,
}

impl FromStr for ExchangeKind {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "paper" | "dry-run" => Ok(Self::Paper),
            other => Err(TradingError::config(format!("unknown exchange '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalSourceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub lookback: Duration,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub kind: ExchangeKind,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub base_url: String,
    pub paper_quote_balance: f64,
    pub paper_price: f64,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub signal_source: SignalSourceConfig,
    pub exchange: ExchangeConfig,
    pub telegram: Option<TelegramConfig>,
    pub backtest_data: Option<PathBuf>,
    pub trade_log_capacity: usize,
    pub price_history: usize,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, TradingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TradingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BotConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let asset = match (get("TOKEN_ID"), get("TOKEN_SYMBOL")) {
            (Some(id), _) => AssetId::TokenId(parse_value("TOKEN_ID", &id)?),
            (None, Some(symbol)) => AssetId::Symbol(AssetId::normalized_symbol(&symbol)),
            (None, None) => defaults.asset.clone(),
        };

        let pair = TradingPair::new(
            get("BASE_ASSET").unwrap_or(defaults.pair.base.clone()),
            get("QUOTE_ASSET").unwrap_or(defaults.pair.quote.clone()),
        );

        let bot = BotConfig {
            name: get("BOT_NAME").unwrap_or(defaults.name.clone()),
            description: get("BOT_DESCRIPTION"),
            trade_type: parse_or(&get, "TRADE_TYPE", defaults.trade_type)?,
            asset,
            pair,
            initial_budget: parse_or(&get, "INITIAL_BUDGET", defaults.initial_budget)?,
            buy_threshold: parse_or(&get, "BUY_THRESHOLD", defaults.buy_threshold)?,
            sell_threshold: parse_or(&get, "SELL_THRESHOLD", defaults.sell_threshold)?,
            order_value: parse_or(&get, "ORDER_VALUE", defaults.order_value)?,
            price_interval: Duration::from_secs(parse_or(
                &get,
                "PRICE_INTERVAL",
                defaults.price_interval.as_secs(),
            )?),
            trade_interval: Duration::from_secs(parse_or(
                &get,
                "TRADE_INTERVAL",
                defaults.trade_interval.as_secs(),
            )?),
            ema_fast_span: parse_or(&get, "EMA_FAST_SPAN", defaults.ema_fast_span)?,
            ema_slow_span: parse_or(&get, "EMA_SLOW_SPAN", defaults.ema_slow_span)?,
        };

        let signal_source = SignalSourceConfig {
            api_key: get("TOKEN_METRICS_API_KEY"),
            base_url: get("TOKEN_METRICS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SIGNAL_BASE_URL.to_string()),
            lookback: Duration::from_secs(60 * parse_or(&get, "SIGNAL_LOOKBACK_MINUTES", 60u64)?),
        };

        let exchange = ExchangeConfig {
            kind: parse_or(&get, "EXCHANGE", ExchangeKind::Binance)?,
            api_key: get("BINANCE_API_KEY"),
            secret_key: get("BINANCE_SECRET_KEY"),
            base_url: get("BINANCE_BASE_URL").unwrap_or_else(|| BINANCE_TESTNET_URL.to_string()),
            paper_quote_balance: parse_or(&get, "PAPER_QUOTE_BALANCE", 1000.0)?,
            paper_price: parse_or(&get, "PAPER_PRICE", 50_000.0)?,
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                chat_id: parse_value("TELEGRAM_CHAT_ID", &chat_id)?,
            }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("Telegram needs both TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID; notifications disabled");
                None
            }
            (None, None) => None,
        };

        let config = Self {
            bot,
            signal_source,
            exchange,
            telegram,
            backtest_data: get("BACKTEST_DATA").map(PathBuf::from),
            trade_log_capacity: parse_or(&get, "TRADE_LOG_CAPACITY", DEFAULT_TRADE_LOG_CAPACITY)?,
            price_history: parse_or(&get, "PRICE_HISTORY", DEFAULT_PRICE_HISTORY)?,
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 10u64)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TradingError> {
        self.bot.validate()?;

        if self.trade_log_capacity == 0 {
            return Err(TradingError::config("TRADE_LOG_CAPACITY must be at least 1"));
        }
        if self.signal_source.lookback.is_zero() {
            return Err(TradingError::config("SIGNAL_LOOKBACK_MINUTES must be at least 1"));
        }
        if self.http_timeout.is_zero() {
            return Err(TradingError::config("HTTP_TIMEOUT_SECS must be non-zero"));
        }

        match self.bot.trade_type {
            TradeType::Live => {
                if self.signal_source.api_key.is_none() {
                    return Err(TradingError::config("TOKEN_METRICS_API_KEY is not set"));
                }
                if self.exchange.kind == ExchangeKind::Binance
                    && (self.exchange.api_key.is_none() || self.exchange.secret_key.is_none())
                {
                    return Err(TradingError::config(
                        "BINANCE_API_KEY and BINANCE_SECRET_KEY are required for EXCHANGE=binance",
                    ));
                }
            }
            TradeType::Backtesting => {
                if self.backtest_data.is_none() {
                    return Err(TradingError::config(
                        "BACKTEST_DATA must point at the historical series",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, TradingError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| TradingError::config(format!("{} has an invalid value '{}'", key, raw)))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, TradingError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
