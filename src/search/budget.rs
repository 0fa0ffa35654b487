//! Search budget: iteration, evaluation and wall-clock limits.

use std::time::Instant;

use crate::schema::{BudgetConfig, StopReason};

/// Tracks consumption of the configured limits.
#[derive(Debug, Clone)]
pub struct Budget {
    config: BudgetConfig,
    start: Instant,
}

impl Budget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            start: Instant::now(),
        }
    }

    /// Reset the wall clock.
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Consumed share of the budget: the largest fraction over the set
    /// limits, clamped to `[0, 1]`.
    pub fn progress(&self, iterations: usize, evaluations: u64) -> f64 {
        let mut fraction: f64 = 0.0;
        if let Some(max) = self.config.max_iterations {
            fraction = fraction.max(ratio(iterations as f64, max as f64));
        }
        if let Some(max) = self.config.max_evaluations {
            fraction = fraction.max(ratio(evaluations as f64, max as f64));
        }
        if let Some(max) = self.config.max_search_time_secs {
            fraction = fraction.max(ratio(self.elapsed_secs(), max));
        }
        fraction.clamp(0.0, 1.0)
    }

    /// The first limit that has been reached, if any.
    pub fn exhausted(&self, iterations: usize, evaluations: u64) -> Option<StopReason> {
        if let Some(max) = self.config.max_iterations
            && iterations >= max
        {
            return Some(StopReason::MaxIterations);
        }
        if let Some(max) = self.config.max_evaluations
            && evaluations >= max
        {
            return Some(StopReason::MaxEvaluations);
        }
        if let Some(max) = self.config.max_search_time_secs
            && self.elapsed_secs() >= max
        {
            return Some(StopReason::MaxSearchTime);
        }
        None
    }
}

fn ratio(used: f64, max: f64) -> f64 {
    if max <= 0.0 { 1.0 } else { used / max }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(iterations: Option<usize>, evaluations: Option<u64>) -> Budget {
        Budget::new(BudgetConfig {
            max_iterations: iterations,
            max_evaluations: evaluations,
            max_search_time_secs: None,
        })
    }

    #[test]
    fn test_progress_is_largest_fraction() {
        let b = budget(Some(100), Some(1000));
        assert_eq!(b.progress(0, 0), 0.0);
        assert_eq!(b.progress(20, 100), 0.2);
        assert_eq!(b.progress(20, 500), 0.5);
        assert_eq!(b.progress(200, 0), 1.0);
    }

    #[test]
    fn test_exhausted() {
        let b = budget(Some(10), Some(50));
        assert_eq!(b.exhausted(9, 49), None);
        assert_eq!(b.exhausted(10, 0), Some(StopReason::MaxIterations));
        assert_eq!(b.exhausted(0, 50), Some(StopReason::MaxEvaluations));
    }

    #[test]
    fn test_zero_time_limit() {
        let b = Budget::new(BudgetConfig {
            max_iterations: None,
            max_evaluations: None,
            max_search_time_secs: Some(0.0),
        });
        assert_eq!(b.exhausted(0, 0), Some(StopReason::MaxSearchTime));
        assert_eq!(b.progress(0, 0), 1.0);
    }
}
