use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};

use common::TradingError;
use common::config::SignalSourceConfig;
use common::models::{AssetId, Signal};

use crate::error::SignalSourceError;
use crate::remote::signal_response::{
    SignalEnvelope, SignalRecord, TokenEnvelope, TokenInfo, tokens_with_symbol,
};
use crate::traits::SignalSource;

const SIGNALS_PATH: &str = "/v2/trading-signals";
const TOKENS_PATH: &str = "/v2/tokens";

/// Client for the Token Metrics `trading-signals` endpoint.
#[derive(Clone)]
pub struct TokenMetricsClient {
    client: Client,
    base_url: String,
    api_key: String,
    lookback: chrono::Duration,
}

impl TokenMetricsClient {
    pub fn new(config: &SignalSourceConfig, timeout: Duration) -> Result<Self, TradingError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TradingError::config("TOKEN_METRICS_API_KEY is not set"))?;
        let lookback = chrono::Duration::from_std(config.lookback)
            .map_err(|e| TradingError::config(format!("invalid signal lookback: {}", e)))?;
        let client = Client::builder()
            .user_agent("grade_trading_bot/0.1.0")
            .timeout(timeout)
            .build()
            .map_err(|e| TradingError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            lookback,
        })
    }

    /// Query string for a window request. Times go out as RFC 3339 seconds with a `Z` suffix.
    pub fn window_query(
        asset: &AssetId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("start_date", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end_date", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        match asset {
            AssetId::TokenId(id) => query.push(("token_id", id.to_string())),
            AssetId::Symbol(symbol) => {
                query.push(("symbol", AssetId::normalized_symbol(symbol)))
            }
        }
        query
    }

    async fn request_window(
        &self,
        asset: &AssetId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SignalRecord>, SignalSourceError> {
        if start >= end {
            return Err(SignalSourceError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        let url = format!("{}{}", self.base_url, SIGNALS_PATH);
        let resp = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("api_key", &self.api_key)
            .query(&Self::window_query(asset, start, end))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SignalSourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope = resp.json::<SignalEnvelope>().await?;
        Ok(envelope.data)
    }

    /// Every catalogue token trading under `symbol`.
    ///
    /// Symbols are not unique upstream, so more than one id may come back.
    pub async fn resolve_token_ids(&self, symbol: &str) -> Result<Vec<TokenInfo>, TradingError> {
        let url = format!("{}{}", self.base_url, TOKENS_PATH);
        let resp = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("api_key", &self.api_key)
            .query(&[("symbol", AssetId::normalized_symbol(symbol))])
            .send()
            .await
            .map_err(SignalSourceError::from)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SignalSourceError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let envelope = resp
            .json::<TokenEnvelope>()
            .await
            .map_err(SignalSourceError::from)?;
        let tokens = tokens_with_symbol(symbol, &envelope.data);
        debug!(
            "{} catalogue entries for {} ({} returned)",
            tokens.len(),
            symbol,
            envelope.data.len()
        );
        Ok(tokens)
    }

    /// Swaps a bare symbol for its catalogue token id. Token ids pass through,
    /// and a failed or empty lookup keeps the symbol.
    pub async fn resolve_asset(&self, asset: AssetId) -> AssetId {
        let AssetId::Symbol(symbol) = &asset else {
            return asset;
        };
        match self.resolve_token_ids(symbol).await {
            Ok(tokens) => match choose_token(symbol, &tokens) {
                Some(id) => AssetId::TokenId(id),
                None => asset,
            },
            Err(e) => {
                warn!("Token lookup for {} failed, querying by symbol: {}", symbol, e);
                asset
            }
        }
    }
}

/// First catalogue entry for `symbol`; warns when the symbol is shared.
pub fn choose_token(symbol: &str, tokens: &[TokenInfo]) -> Option<u64> {
    match tokens {
        [] => {
            warn!("No catalogue token trades as {}; querying by symbol", symbol);
            None
        }
        [token] => {
            info!("Resolved {} to token {}", symbol, token.token_id);
            Some(token.token_id)
        }
        [first, rest @ ..] => {
            let others: Vec<String> = rest
                .iter()
                .map(|t| format!("{} ({})", t.token_id, t.name.as_deref().unwrap_or("?")))
                .collect();
            warn!(
                "{} is ambiguous; using token {} ({}), also listed: {}. Set TOKEN_ID to pick another",
                symbol,
                first.token_id,
                first.name.as_deref().unwrap_or("?"),
                others.join(", ")
            );
            Some(first.token_id)
        }
    }
}

/// Filters a raw window down to `asset`, drops unusable rows and sorts by time.
pub fn normalize_window(asset: &AssetId, records: &[SignalRecord]) -> Vec<Signal> {
    let mut signals: Vec<Signal> = records
        .iter()
        .filter(|r| r.matches(asset))
        .filter_map(|r| match r.to_signal(asset) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!("Dropping signal record for {}: {}", asset, e);
                None
            }
        })
        .collect();
    Signal::sort_window(&mut signals);
    signals
}

#[async_trait]
impl SignalSource for TokenMetricsClient {
    async fn fetch_window(
        &self,
        asset: &AssetId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Signal>, TradingError> {
        let records = self.request_window(asset, start, end).await?;
        let signals = normalize_window(asset, &records);
        debug!(
            "Fetched {} signals ({} raw) for {}",
            signals.len(),
            records.len(),
            asset
        );
        Ok(signals)
    }

    async fn fetch_current(&self, asset: &AssetId) -> Result<Signal, TradingError> {
        let end = Utc::now();
        let window = self.fetch_window(asset, end - self.lookback, end).await?;
        Signal::latest(&window)
            .cloned()
            .ok_or_else(|| TradingError::NoSignalAvailable {
                asset: asset.to_string(),
            })
    }
}
