use serde::Serialize;
use ta::Next;
use ta::indicators::ExponentialMovingAverage;

use common::TradingError;

/// EMA pair and crossover state for one point of a grade series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmaPoint {
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// `ema_fast >= ema_slow`
    pub long: bool,
}

/// Fast/slow EMA crossover over a grade series.
///
/// Both averages use `alpha = 2 / (span + 1)` and are seeded with the first
/// grade, so every input point produces an output point.
#[derive(Debug, Clone)]
pub struct EmaCrossoverPolicy {
    fast_span: usize,
    slow_span: usize,
    fast: ExponentialMovingAverage,
    slow: ExponentialMovingAverage,
}

impl EmaCrossoverPolicy {
    pub fn new(fast_span: usize, slow_span: usize) -> Result<Self, TradingError> {
        if fast_span == 0 || fast_span >= slow_span {
            return Err(TradingError::config(format!(
                "EMA spans must satisfy 1 <= fast < slow (got {} / {})",
                fast_span, slow_span
            )));
        }
        let fast = ExponentialMovingAverage::new(fast_span)
            .map_err(|_| TradingError::config(format!("invalid fast EMA span {}", fast_span)))?;
        let slow = ExponentialMovingAverage::new(slow_span)
            .map_err(|_| TradingError::config(format!("invalid slow EMA span {}", slow_span)))?;

        Ok(Self {
            fast_span,
            slow_span,
            fast,
            slow,
        })
    }

    pub fn spans(&self) -> (usize, usize) {
        (self.fast_span, self.slow_span)
    }

    /// Runs both averages over `grades` from a fresh state. Same input, same output.
    pub fn evaluate(&self, grades: &[f64]) -> Vec<EmaPoint> {
        let mut fast = self.fast.clone();
        let mut slow = self.slow.clone();

        grades
            .iter()
            .map(|&grade| {
                let ema_fast = fast.next(grade);
                let ema_slow = slow.next(grade);
                EmaPoint {
                    ema_fast,
                    ema_slow,
                    long: ema_fast >= ema_slow,
                }
            })
            .collect()
    }

    /// Crossover state at the end of the series, `None` for an empty one.
    pub fn last_signal(&self, grades: &[f64]) -> Option<bool> {
        self.evaluate(grades).last().map(|p| p.long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn matches_adjust_false_recursion() {
        let policy = EmaCrossoverPolicy::new(3, 7).unwrap();
        let grades = [50.0, 60.0, 40.0, 80.0];
        let points = policy.evaluate(&grades);

        // alpha 0.5 and 0.25
        let mut fast = 50.0;
        let mut slow = 50.0;
        for (i, grade) in grades.iter().enumerate() {
            if i > 0 {
                fast = 0.5 * grade + 0.5 * fast;
                slow = 0.25 * grade + 0.75 * slow;
            }
            assert!(close(points[i].ema_fast, fast));
            assert!(close(points[i].ema_slow, slow));
            assert_eq!(points[i].long, fast >= slow);
        }
    }

    #[test]
    fn single_point_is_long() {
        let policy = EmaCrossoverPolicy::new(3, 7).unwrap();
        let points = policy.evaluate(&[42.0]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].ema_fast, 42.0);
        assert_eq!(points[0].ema_slow, 42.0);
        assert!(points[0].long);
    }

    #[test]
    fn falling_grades_go_flat() {
        let policy = EmaCrossoverPolicy::new(3, 7).unwrap();
        assert_eq!(policy.last_signal(&[90.0, 70.0, 50.0, 30.0]), Some(false));
        assert_eq!(policy.last_signal(&[]), None);
    }

    #[test]
    fn spans_are_validated() {
        assert!(EmaCrossoverPolicy::new(0, 7).is_err());
        assert!(EmaCrossoverPolicy::new(7, 7).is_err());
        assert!(EmaCrossoverPolicy::new(7, 3).is_err());
        assert_eq!(EmaCrossoverPolicy::new(3, 7).unwrap().spans(), (3, 7));
    }
}
