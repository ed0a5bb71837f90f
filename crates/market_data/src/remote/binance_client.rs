use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use common::config::ExchangeConfig;
use common::models::{Fill, OrderSide, TradingPair};

use crate::error::ExchangeError;
use crate::traits::Exchange;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: Option<String>,
    #[serde(rename = "cummulativeQuoteQty")]
    pub cummulative_quote_qty: Option<String>,
}

impl OrderResponse {
    /// Converts the exchange's report into a [`Fill`].
    ///
    /// Falls back to `requested * reference_price` only when the response carries no fill fields.
    pub fn to_fill(
        &self,
        side: OrderSide,
        requested: f64,
        reference_price: f64,
    ) -> Result<Fill, ExchangeError> {
        let executed = parse_opt("executedQty", self.executed_qty.as_deref())?;
        let quote = parse_opt("cummulativeQuoteQty", self.cummulative_quote_qty.as_deref())?;

        match (executed, quote) {
            (Some(qty), Some(quote)) if qty > 0.0 => Ok(Fill {
                side,
                filled_amount: qty,
                execution_price: quote / qty,
                quote_amount: quote,
            }),
            (Some(_), _) => Err(ExchangeError::Rejected(format!(
                "order {} finished as {} with nothing executed",
                self.order_id, self.status
            ))),
            (None, _) => Ok(Fill::assumed(side, requested, reference_price)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountInformation {
    pub balances: Vec<Balance>,
    #[serde(rename = "canTrade")]
    pub can_trade: bool,
}

impl AccountInformation {
    /// Free balance of `asset`; an asset absent from the account holds zero.
    pub fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        match self.balances.iter().find(|b| b.asset.eq_ignore_ascii_case(asset)) {
            Some(balance) => parse_f64("free", &balance.free),
            None => Ok(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(rename = "quoteAssetPrecision")]
    pub quote_asset_precision: Option<usize>,
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "minQty")]
        min_qty: String,
        #[serde(rename = "stepSize")]
        step_size: String,
    },
    #[serde(other)]
    Other,
}

/// Order sizing rules for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRules {
    pub step_size: f64,
    pub min_qty: f64,
    pub step_decimals: usize,
    pub quote_precision: usize,
}

impl SymbolRules {
    pub fn from_info(info: &SymbolInfo) -> Result<Self, ExchangeError> {
        let (min_qty, step_size) = info
            .filters
            .iter()
            .find_map(|f| match f {
                SymbolFilter::LotSize { min_qty, step_size } => Some((min_qty, step_size)),
                SymbolFilter::Other => None,
            })
            .ok_or_else(|| ExchangeError::Parse {
                field: "LOT_SIZE",
                value: info.symbol.clone(),
            })?;

        let step = parse_f64("stepSize", step_size)?;
        if !step.is_finite() || step <= 0.0 {
            return Err(ExchangeError::Parse {
                field: "stepSize",
                value: step_size.clone(),
            });
        }

        Ok(Self {
            step_size: step,
            min_qty: parse_f64("minQty", min_qty)?,
            step_decimals: decimals(step_size),
            quote_precision: info.quote_asset_precision.unwrap_or(8),
        })
    }

    /// `amount` rounded down to a whole number of lot steps.
    pub fn round_to_lot(&self, amount: f64) -> Result<f64, ExchangeError> {
        let steps = (amount / self.step_size + 1e-9).floor();
        let quantity = steps * self.step_size;
        if !quantity.is_finite() || quantity <= 0.0 || quantity < self.min_qty {
            return Err(ExchangeError::Rejected(format!(
                "{} is below the minimum lot {}",
                amount, self.min_qty
            )));
        }
        Ok(quantity)
    }

    pub fn format_lot(&self, quantity: f64) -> String {
        trim_decimal(format!("{:.*}", self.step_decimals, quantity))
    }

    /// Quote amount truncated to the symbol's quote precision.
    pub fn round_quote(&self, spend: f64) -> Result<f64, ExchangeError> {
        let scale = 10f64.powi(self.quote_precision as i32);
        let quote = (spend * scale + 1e-6).floor() / scale;
        if !quote.is_finite() || quote <= 0.0 {
            return Err(ExchangeError::Rejected(format!("invalid spend {}", spend)));
        }
        Ok(quote)
    }

    pub fn format_quote(&self, quote: f64) -> String {
        trim_decimal(format!("{:.*}", self.quote_precision, quote))
    }
}

/// How a market order is sized: in the base asset or as a quote amount to spend.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderQuantity {
    Base(String),
    Quote(String),
}

/// Unsigned query for `POST /api/v3/order`.
pub fn market_order_params(symbol: &str, side: OrderSide, quantity: &OrderQuantity) -> String {
    let sizing = match quantity {
        OrderQuantity::Base(qty) => format!("quantity={}", qty),
        OrderQuantity::Quote(quote) => format!("quoteOrderQty={}", quote),
    };
    format!(
        "symbol={}&side={}&type=MARKET&{}&newOrderRespType=FULL",
        symbol.to_uppercase(),
        side.as_str(),
        sizing
    )
}

/// Signed Binance spot REST client. The base URL selects testnet or production.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    rules: Arc<RwLock<HashMap<String, SymbolRules>>>,
}

impl BinanceClient {
    pub fn new(config: &ExchangeConfig, timeout: Duration) -> Result<Self, ExchangeError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ExchangeError::Credentials("BINANCE_API_KEY not set".into()))?;
        let secret_key = config
            .secret_key
            .clone()
            .ok_or_else(|| ExchangeError::Credentials("BINANCE_SECRET_KEY not set".into()))?;

        Ok(Self {
            client: Client::builder()
                .user_agent("grade_trading_bot/0.1.0")
                .timeout(timeout)
                .build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
            rules: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::Credentials(e.to_string()))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(&self, path: &str, params: &str) -> Result<String, ExchangeError> {
        let params = format!("{}&timestamp={}", params, Utc::now().timestamp_millis());
        let params = params.trim_start_matches('&');
        let signature = self.sign(params)?;
        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, path, params, signature
        ))
    }

    pub async fn get_account(&self) -> Result<AccountInformation, ExchangeError> {
        let url = self.signed_url("/api/v3/account", "")?;

        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            error!("Binance Account Info Failed: {}", body);
            return Err(ExchangeError::Status { status, body });
        }

        Ok(resp.json::<AccountInformation>().await?)
    }

    pub async fn get_price(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.to_uppercase())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            return Err(ExchangeError::Status { status, body });
        }

        let ticker = resp.json::<TickerPrice>().await?;
        let price = parse_f64("price", &ticker.price)?;
        debug!("Ticker {} = {}", ticker.symbol, price);
        Ok(price)
    }

    /// Lot and precision rules for `symbol`, fetched once and then served from cache.
    pub async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules, ExchangeError> {
        let symbol = symbol.to_uppercase();
        if let Some(rules) = self.rules.read().await.get(&symbol) {
            return Ok(rules.clone());
        }

        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            return Err(ExchangeError::Status { status, body });
        }

        let info = resp.json::<ExchangeInfo>().await?;
        let symbol_info = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::Parse {
                field: "symbols",
                value: symbol.clone(),
            })?;
        let rules = SymbolRules::from_info(symbol_info)?;
        debug!("{} lot step {} (min {})", symbol, rules.step_size, rules.min_qty);

        self.rules.write().await.insert(symbol, rules.clone());
        Ok(rules)
    }

    pub async fn post_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &OrderQuantity,
    ) -> Result<OrderResponse, ExchangeError> {
        let params = market_order_params(symbol, side, quantity);
        let url = self.signed_url("/api/v3/order", &params)?;

        info!("Placing Order: {} {:?} {}", side, quantity, symbol);

        let resp = self
            .client
            .request(Method::POST, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            error!("Binance Order Failed: {}", body);
            return Err(ExchangeError::Status { status, body });
        }

        let order_resp = resp.json::<OrderResponse>().await?;
        info!(
            "Order {} on {} finished as {}",
            order_resp.order_id, order_resp.symbol, order_resp.status
        );
        Ok(order_resp)
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn current_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError> {
        self.get_price(&pair.symbol()).await
    }

    async fn quote_balance(&self, pair: &TradingPair) -> Result<f64, ExchangeError> {
        self.get_account().await?.free_balance(&pair.quote)
    }

    async fn asset_balance(&self, pair: &TradingPair) -> Result<f64, ExchangeError> {
        self.get_account().await?.free_balance(&pair.base)
    }

    async fn market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        amount: f64,
    ) -> Result<Fill, ExchangeError> {
        let symbol = pair.symbol();
        let rules = self.symbol_rules(&symbol).await?;
        let quantity = rules.round_to_lot(amount)?;
        let reference_price = self.get_price(&symbol).await?;
        let response = self
            .post_market_order(&symbol, side, &OrderQuantity::Base(rules.format_lot(quantity)))
            .await?;
        response.to_fill(side, quantity, reference_price)
    }

    async fn market_buy(
        &self,
        pair: &TradingPair,
        spend: f64,
        reference_price: f64,
    ) -> Result<Fill, ExchangeError> {
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(ExchangeError::InvalidPrice(reference_price));
        }
        let symbol = pair.symbol();
        let rules = self.symbol_rules(&symbol).await?;
        let quote = rules.round_quote(spend)?;
        let response = self
            .post_market_order(
                &symbol,
                OrderSide::Buy,
                &OrderQuantity::Quote(rules.format_quote(quote)),
            )
            .await?;
        response.to_fill(OrderSide::Buy, quote / reference_price, reference_price)
    }
}

/// Decimal places of a step such as `"0.00001000"`.
fn decimals(step: &str) -> usize {
    match step.split_once('.') {
        Some((_, fraction)) => fraction.trim_end_matches('0').len(),
        None => 0,
    }
}

fn trim_decimal(formatted: String) -> String {
    if !formatted.contains('.') {
        return formatted;
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, ExchangeError> {
    value.parse::<f64>().map_err(|_| ExchangeError::Parse {
        field,
        value: value.to_string(),
    })
}

fn parse_opt(field: &'static str, value: Option<&str>) -> Result<Option<f64>, ExchangeError> {
    value.map(|v| parse_f64(field, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::{ExchangeKind, BINANCE_TESTNET_URL};
    use serde_json::json;

    fn order(value: serde_json::Value) -> OrderResponse {
        serde_json::from_value(value).unwrap()
    }

    fn client() -> BinanceClient {
        let config = ExchangeConfig {
            kind: ExchangeKind::Binance,
            api_key: Some("api-key".into()),
            // Key and query from Binance's signed-endpoint documentation example.
            secret_key: Some(
                "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".into(),
            ),
            base_url: BINANCE_TESTNET_URL.into(),
            paper_quote_balance: 0.0,
            paper_price: 0.0,
        };
        BinanceClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn signature_matches_documented_example() {
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client().sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn signed_url_appends_timestamp_and_signature() {
        let url = client().signed_url("/api/v3/account", "").unwrap();
        assert!(url.starts_with("https://testnet.binance.vision/api/v3/account?timestamp="));
        assert!(url.contains("&signature="));
    }

    #[test]
    fn missing_secret_is_a_credentials_error() {
        let config = ExchangeConfig {
            kind: ExchangeKind::Binance,
            api_key: Some("k".into()),
            secret_key: None,
            base_url: BINANCE_TESTNET_URL.into(),
            paper_quote_balance: 0.0,
            paper_price: 0.0,
        };
        assert!(matches!(
            BinanceClient::new(&config, Duration::from_secs(5)),
            Err(ExchangeError::Credentials(_))
        ));
    }

    #[test]
    fn fill_uses_reported_execution() {
        let resp = order(json!({
            "orderId": 7, "symbol": "BTCUSDT", "status": "FILLED",
            "executedQty": "0.00194600", "cummulativeQuoteQty": "97.30000000"
        }));
        let fill = resp.to_fill(OrderSide::Buy, 0.002, 50_000.0).unwrap();
        assert_eq!(fill.filled_amount, 0.001946);
        assert_eq!(fill.quote_amount, 97.3);
        assert!((fill.execution_price - 97.3 / 0.001946).abs() < 1e-9);
    }

    #[test]
    fn fill_falls_back_to_requested_times_price() {
        let resp = order(json!({ "orderId": 8, "symbol": "BTCUSDT", "status": "NEW" }));
        let fill = resp.to_fill(OrderSide::Sell, 0.5, 200.0).unwrap();
        assert_eq!(fill, Fill::assumed(OrderSide::Sell, 0.5, 200.0));
    }

    #[test]
    fn nothing_executed_is_a_rejection() {
        let resp = order(json!({
            "orderId": 9, "symbol": "BTCUSDT", "status": "EXPIRED",
            "executedQty": "0.00000000", "cummulativeQuoteQty": "0.00000000"
        }));
        assert!(matches!(
            resp.to_fill(OrderSide::Buy, 0.1, 10.0),
            Err(ExchangeError::Rejected(_))
        ));
    }

    #[test]
    fn free_balance_defaults_to_zero_for_unknown_assets() {
        let account: AccountInformation = serde_json::from_value(json!({
            "canTrade": true,
            "balances": [
                { "asset": "USDT", "free": "1000.5", "locked": "0" },
                { "asset": "BTC", "free": "0.01", "locked": "0.002" }
            ]
        }))
        .unwrap();
        assert_eq!(account.free_balance("USDT").unwrap(), 1000.5);
        assert_eq!(account.free_balance("btc").unwrap(), 0.01);
        assert_eq!(account.free_balance("ETH").unwrap(), 0.0);
    }

    fn btcusdt_rules() -> SymbolRules {
        let info: ExchangeInfo = serde_json::from_value(json!({
            "timezone": "UTC",
            "symbols": [{
                "symbol": "BTCUSDT",
                "status": "TRADING",
                "baseAsset": "BTC",
                "quoteAsset": "USDT",
                "quoteAssetPrecision": 8,
                "filters": [
                    { "filterType": "PRICE_FILTER", "minPrice": "0.01000000", "maxPrice": "1000000.00000000", "tickSize": "0.01000000" },
                    { "filterType": "LOT_SIZE", "minQty": "0.00001000", "maxQty": "9000.00000000", "stepSize": "0.00001000" },
                    { "filterType": "NOTIONAL", "minNotional": "5.00000000", "applyMinToMarket": true }
                ]
            }]
        }))
        .unwrap();
        SymbolRules::from_info(&info.symbols[0]).unwrap()
    }

    #[test]
    fn exchange_info_yields_lot_rules() {
        let rules = btcusdt_rules();
        assert_eq!(rules.step_size, 0.00001);
        assert_eq!(rules.min_qty, 0.00001);
        assert_eq!(rules.step_decimals, 5);
        assert_eq!(rules.quote_precision, 8);
    }

    #[test]
    fn sell_quantities_round_down_to_the_step() {
        let rules = btcusdt_rules();
        let qty = rules.round_to_lot(100.0 / 54_321.77).unwrap();
        assert_eq!(rules.format_lot(qty), "0.00184");
        assert!(qty <= 100.0 / 54_321.77);

        let whole = rules.round_to_lot(0.5).unwrap();
        assert_eq!(rules.format_lot(whole), "0.5");
    }

    #[test]
    fn dust_below_the_minimum_lot_is_rejected() {
        assert!(matches!(
            btcusdt_rules().round_to_lot(0.000004),
            Err(ExchangeError::Rejected(_))
        ));
    }

    #[test]
    fn whole_unit_steps_have_no_decimals() {
        let info: SymbolInfo = serde_json::from_value(json!({
            "symbol": "DOGEUSDT",
            "filters": [{ "filterType": "LOT_SIZE", "minQty": "1.00000000", "stepSize": "1.00000000" }]
        }))
        .unwrap();
        let rules = SymbolRules::from_info(&info).unwrap();
        assert_eq!(rules.step_decimals, 0);
        assert_eq!(rules.format_lot(rules.round_to_lot(1234.9).unwrap()), "1234");
    }

    #[test]
    fn missing_lot_filter_is_a_parse_error() {
        let info: SymbolInfo = serde_json::from_value(json!({
            "symbol": "BTCUSDT",
            "filters": [{ "filterType": "PRICE_FILTER", "tickSize": "0.01" }]
        }))
        .unwrap();
        assert!(matches!(
            SymbolRules::from_info(&info),
            Err(ExchangeError::Parse { field: "LOT_SIZE", .. })
        ));
    }

    #[test]
    fn buys_are_sized_by_quote_amount() {
        let rules = btcusdt_rules();
        let quote = rules.round_quote(97.333333333).unwrap();
        assert_eq!(rules.format_quote(quote), "97.33333333");

        let params = market_order_params(
            "btcusdt",
            OrderSide::Buy,
            &OrderQuantity::Quote(rules.format_quote(rules.round_quote(100.0).unwrap())),
        );
        assert_eq!(
            params,
            "symbol=BTCUSDT&side=BUY&type=MARKET&quoteOrderQty=100&newOrderRespType=FULL"
        );
        assert!(!params.contains("&quantity="));
    }

    #[test]
    fn sells_are_sized_by_lot_quantity() {
        let params = market_order_params(
            "BTCUSDT",
            OrderSide::Sell,
            &OrderQuantity::Base("0.00184".into()),
        );
        assert_eq!(
            params,
            "symbol=BTCUSDT&side=SELL&type=MARKET&quantity=0.00184&newOrderRespType=FULL"
        );
    }

    #[test]
    fn quote_buy_fallback_fill_costs_the_spend() {
        let resp = order(json!({ "orderId": 10, "symbol": "BTCUSDT", "status": "NEW" }));
        let fill = resp.to_fill(OrderSide::Buy, 100.0 / 50_000.0, 50_000.0).unwrap();
        assert!((fill.quote_amount - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn symbol_rules_are_served_from_cache() {
        let config = ExchangeConfig {
            kind: ExchangeKind::Binance,
            api_key: Some("k".into()),
            secret_key: Some("s".into()),
            // nothing listens here; only cached symbols can resolve
            base_url: "http://127.0.0.1:9".into(),
            paper_quote_balance: 0.0,
            paper_price: 0.0,
        };
        let client = BinanceClient::new(&config, Duration::from_secs(2)).unwrap();
        client
            .rules
            .write()
            .await
            .insert("BTCUSDT".into(), btcusdt_rules());

        assert_eq!(client.symbol_rules("btcusdt").await.unwrap(), btcusdt_rules());
        assert!(matches!(
            client.symbol_rules("ETHUSDT").await,
            Err(ExchangeError::Http(_))
        ));
    }
}
