use common::TradingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalSourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow { start: String, end: String },
}

impl From<SignalSourceError> for TradingError {
    fn from(err: SignalSourceError) -> Self {
        match err {
            SignalSourceError::InvalidWindow { .. } => TradingError::ConfigurationError(err.to_string()),
            other => TradingError::SourceUnavailable(other.to_string()),
        }
    }
}

/// A record that could not be turned into a [`common::models::Signal`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("record has no grade")]
    MissingGrade,

    #[error("grade {0} is not a finite number")]
    InvalidGrade(String),

    #[error("record has no date")]
    MissingDate,

    #[error("unparsable date '{0}'")]
    InvalidDate(String),
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse {field} '{value}'")]
    Parse { field: &'static str, value: String },

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("missing credentials: {0}")]
    Credentials(String),
}

impl From<ExchangeError> for TradingError {
    fn from(err: ExchangeError) -> Self {
        TradingError::OrderExecutionFailed(err.to_string())
    }
}
