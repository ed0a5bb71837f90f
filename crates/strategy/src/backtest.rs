//! Historical return estimate for the EMA-crossover policy.
//!
//! The model is deliberately simple: on a long day the portfolio earns the
//! day's open-to-close return, on a flat day it earns the negated return
//! (a mirrored short with no borrow cost or margin). The annual figure
//! compounds the mean daily return over 365 days and swings wildly on short
//! samples.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::policy::EmaCrossoverPolicy;

pub const DAYS_PER_YEAR: i32 = 365;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no rows with a grade to backtest")]
    Empty,

    #[error("{date}: open must be positive, got {open}")]
    InvalidOpen { date: NaiveDate, open: f64 },

    #[error("{date}: {field} is not finite")]
    NonFinite { date: NaiveDate, field: &'static str },

    #[error("failed to read backtest data: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse backtest data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One day of historical input. Missing grades are carried forward from the previous day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BacktestInput {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub daily_return_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestRow {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub grade: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub long: bool,
    pub daily_return_pct: f64,
    pub portfolio_return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub annual_return: f64,
    pub mean_daily_return: f64,
    pub days: usize,
    pub long_days: usize,
}

/// Fully derived series. Rebuilt from the inputs on every run, never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestSeries {
    pub rows: Vec<BacktestRow>,
}

impl BacktestSeries {
    pub fn build(
        mut inputs: Vec<BacktestInput>,
        policy: &EmaCrossoverPolicy,
    ) -> Result<Self, BacktestError> {
        inputs.sort_by_key(|row| row.date);

        let mut last_grade = None;
        let mut filled = Vec::with_capacity(inputs.len());
        for input in inputs {
            last_grade = input.grade.or(last_grade);
            match last_grade {
                Some(grade) => filled.push((input, grade)),
                None => debug!("Skipping {}: no grade seen yet", input.date),
            }
        }
        if filled.is_empty() {
            return Err(BacktestError::Empty);
        }

        for (input, grade) in &filled {
            validate(input, *grade)?;
        }

        let grades: Vec<f64> = filled.iter().map(|(_, grade)| *grade).collect();
        let points = policy.evaluate(&grades);

        let rows = filled
            .into_iter()
            .zip(points)
            .map(|((input, grade), point)| {
                let daily = input
                    .daily_return_pct
                    .unwrap_or(input.close / input.open - 1.0);
                BacktestRow {
                    date: input.date,
                    open: input.open,
                    close: input.close,
                    grade,
                    ema_fast: point.ema_fast,
                    ema_slow: point.ema_slow,
                    long: point.long,
                    daily_return_pct: daily,
                    portfolio_return_pct: if point.long { daily } else { -daily },
                }
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn mean_daily_return(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let total: f64 = self.rows.iter().map(|r| r.portfolio_return_pct).sum();
        total / self.rows.len() as f64
    }

    pub fn estimate_annual_return(&self) -> f64 {
        annualize(self.mean_daily_return())
    }

    pub fn report(&self) -> BacktestReport {
        BacktestReport {
            annual_return: self.estimate_annual_return(),
            mean_daily_return: self.mean_daily_return(),
            days: self.rows.len(),
            long_days: self.rows.iter().filter(|r| r.long).count(),
        }
    }
}

/// `(1 + mean_daily)^365 - 1`
pub fn annualize(mean_daily_return: f64) -> f64 {
    (1.0 + mean_daily_return).powi(DAYS_PER_YEAR) - 1.0
}

fn validate(input: &BacktestInput, grade: f64) -> Result<(), BacktestError> {
    let date = input.date;
    for (field, value) in [
        ("open", Some(input.open)),
        ("close", Some(input.close)),
        ("grade", Some(grade)),
        ("daily_return_pct", input.daily_return_pct),
    ] {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(BacktestError::NonFinite { date, field });
        }
    }
    if input.open <= 0.0 && input.daily_return_pct.is_none() {
        return Err(BacktestError::InvalidOpen {
            date,
            open: input.open,
        });
    }
    Ok(())
}

pub fn load_inputs(path: impl AsRef<Path>) -> Result<Vec<BacktestInput>, BacktestError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let inputs: Vec<BacktestInput> = serde_json::from_str(&raw)?;
    info!(
        "Loaded {} backtest rows from {}",
        inputs.len(),
        path.as_ref().display()
    );
    Ok(inputs)
}

/// Builds the series and summarizes it in one go.
pub fn run(
    inputs: Vec<BacktestInput>,
    policy: &EmaCrossoverPolicy,
) -> Result<(BacktestSeries, BacktestReport), BacktestError> {
    let series = BacktestSeries::build(inputs, policy)?;
    let report = series.report();
    Ok((series, report))
}
