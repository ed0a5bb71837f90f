pub mod ema_crossover;
pub mod threshold;

pub use ema_crossover::{EmaCrossoverPolicy, EmaPoint};
pub use threshold::ThresholdPolicy;

use common::TradingError;
use common::models::{BotConfig, Decision, TradeType};

/// Decision policy, picked once from the bot's trade type.
#[derive(Debug, Clone)]
pub enum Policy {
    Threshold(ThresholdPolicy),
    EmaCrossover(EmaCrossoverPolicy),
}

impl Policy {
    pub fn for_bot(config: &BotConfig) -> Result<Self, TradingError> {
        match config.trade_type {
            TradeType::Live => Ok(Self::Threshold(ThresholdPolicy::new(
                config.buy_threshold,
                config.sell_threshold,
            )?)),
            TradeType::Backtesting => Ok(Self::EmaCrossover(EmaCrossoverPolicy::new(
                config.ema_fast_span,
                config.ema_slow_span,
            )?)),
        }
    }

    /// Decides on a grade series, oldest first.
    ///
    /// Threshold looks at the last grade only. The crossover buys while long and
    /// sells while flat. An empty series holds.
    pub fn decide(&self, grades: &[f64]) -> Decision {
        match self {
            Self::Threshold(policy) => grades
                .last()
                .map_or(Decision::Hold, |&grade| policy.decide(grade)),
            Self::EmaCrossover(policy) => match policy.last_signal(grades) {
                Some(true) => Decision::Buy,
                Some(false) => Decision::Sell,
                None => Decision::Hold,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Threshold(_) => "threshold",
            Self::EmaCrossover(_) => "ema-crossover",
        }
    }
}
