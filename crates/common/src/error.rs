use thiserror::Error;

/// Failure taxonomy shared by the signal source, the executor and the live loop.
///
/// Everything except [`TradingError::ConfigurationError`] is recovered at the
/// cycle boundary; configuration errors are fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradingError {
    /// The lookback window contained no signal. Callers treat this as HOLD.
    #[error("no signal available for {asset}")]
    NoSignalAvailable { asset: String },

    /// Transport failure or non-success status from the signal source.
    #[error("signal source unavailable: {0}")]
    SourceUnavailable(String),

    /// The exchange rejected or errored on an order (or on the lookups needed to size it).
    #[error("order execution failed: {0}")]
    OrderExecutionFailed(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl TradingError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// True for errors the live loop absorbs and retries on its next tick.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ConfigurationError(_))
    }
}
