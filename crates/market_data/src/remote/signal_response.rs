use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use common::models::{AssetId, Signal};

use crate::error::RecordError;

#[derive(Debug, Deserialize)]
pub struct SignalEnvelope {
    #[serde(default)]
    pub data: Vec<SignalRecord>,
}

/// One row of the `trading-signals` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalRecord {
    #[serde(rename(deserialize = "DATE"))]
    pub date: Option<String>,
    #[serde(rename(deserialize = "TOKEN_ID"))]
    pub token_id: Option<u64>,
    #[serde(rename(deserialize = "TOKEN_SYMBOL"))]
    pub token_symbol: Option<String>,
    #[serde(rename(deserialize = "SYMBOL"))]
    pub symbol: Option<String>,
    #[serde(rename(deserialize = "TM_TRADER_GRADE"))]
    pub trader_grade: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignalRecord {
    pub fn symbol(&self) -> Option<&str> {
        self.token_symbol.as_deref().or(self.symbol.as_deref())
    }

    /// Client-side filter: the source may return neighbouring assets in the same window.
    /// Records that do not carry the identifier being filtered on are dropped.
    pub fn matches(&self, asset: &AssetId) -> bool {
        match asset {
            AssetId::TokenId(id) => self.token_id.is_some_and(|t| t == *id),
            AssetId::Symbol(wanted) => self
                .symbol()
                .is_some_and(|s| AssetId::normalized_symbol(s) == *wanted),
        }
    }

    pub fn to_signal(&self, asset: &AssetId) -> Result<Signal, RecordError> {
        let grade = parse_grade(self.trader_grade.as_ref())?;
        let timestamp = parse_timestamp(self.date.as_deref().ok_or(RecordError::MissingDate)?)?;

        Ok(Signal {
            asset: match self.token_id {
                Some(id) => AssetId::TokenId(id),
                None => asset.clone(),
            },
            symbol: self.symbol().map(str::to_string),
            timestamp,
            grade,
            raw: self.extra.clone(),
        })
    }
}

fn parse_grade(value: Option<&Value>) -> Result<f64, RecordError> {
    let grade = match value {
        None | Some(Value::Null) => return Err(RecordError::MissingGrade),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match grade {
        Some(g) if g.is_finite() => Ok(g),
        _ => Err(RecordError::InvalidGrade(
            value.map(|v| v.to_string()).unwrap_or_default(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenEnvelope {
    #[serde(default)]
    pub data: Vec<TokenInfo>,
}

/// One row of the `tokens` catalogue.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenInfo {
    #[serde(rename(deserialize = "TOKEN_ID"))]
    pub token_id: u64,
    #[serde(rename(deserialize = "TOKEN_NAME"))]
    pub name: Option<String>,
    #[serde(rename(deserialize = "TOKEN_SYMBOL"))]
    pub symbol: Option<String>,
}

/// Catalogue entries whose symbol is exactly `symbol` after normalization.
pub fn tokens_with_symbol(symbol: &str, tokens: &[TokenInfo]) -> Vec<TokenInfo> {
    let wanted = AssetId::normalized_symbol(symbol);
    tokens
        .iter()
        .filter(|t| {
            t.symbol
                .as_deref()
                .is_some_and(|s| AssetId::normalized_symbol(s) == wanted)
        })
        .cloned()
        .collect()
}

/// Accepts RFC 3339 as well as the naive forms the source uses for daily rows.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordError> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RecordError::InvalidDate(raw.to_string()))
}
