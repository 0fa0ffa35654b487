//! Progress and statistics types reported by a running search.

use serde::{Deserialize, Serialize};

/// Progress update sent to callbacks after every iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Completed iterations (MIO steps or MOSA generations).
    pub iteration: usize,
    /// Test case executions so far.
    pub evaluations: u64,
    /// Consumed share of the budget, within `[0, 1]`.
    pub progress: f64,
    /// Goals covered by the archive.
    pub covered_goals: usize,
    /// Total number of goals.
    pub total_goals: usize,
    /// Sum over all goals of the best fitness found so far.
    pub total_fitness: f64,
    /// Number of tests currently held by the archive.
    pub archive_size: usize,
    /// Statistics history for plotting.
    pub history: SearchHistory,
    /// Current phase of the algorithm.
    pub phase: SearchPhase,
}

impl SearchProgress {
    /// Covered share of the goals; 1.0 when there is nothing to cover.
    pub fn coverage(&self) -> f64 {
        if self.total_goals == 0 {
            1.0
        } else {
            self.covered_goals as f64 / self.total_goals as f64
        }
    }
}

/// Per-iteration history.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchHistory {
    /// Covered goals after each iteration.
    pub covered_goals: Vec<usize>,
    /// Summed best fitness after each iteration.
    pub total_fitness: Vec<f64>,
    /// Executions after each iteration.
    pub evaluations: Vec<u64>,
}

impl SearchHistory {
    pub(crate) fn record(&mut self, covered: usize, total_fitness: f64, evaluations: u64) {
        self.covered_goals.push(covered);
        self.total_fitness.push(total_fitness);
        self.evaluations.push(evaluations);
    }
}

/// Current phase of the search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SearchPhase {
    /// Building the initial population or first sample.
    #[default]
    Initializing,
    /// Exploring with the initial parameters.
    Exploring,
    /// MIO focused phase: parameters reached their focused values.
    Focused,
    /// Search complete.
    Complete,
    /// Search cancelled.
    Stopped,
}

/// Statistics from a finished search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: usize,
    pub evaluations: u64,
    pub covered_goals: usize,
    pub total_goals: usize,
    /// Number of tests in the resulting suite.
    pub suite_size: usize,
    /// Total statements over the resulting suite.
    pub suite_length: usize,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    pub evaluations_per_second: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Reason a search stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Every goal is covered.
    AllGoalsCovered,
    MaxIterations,
    MaxEvaluations,
    MaxSearchTime,
    /// User cancelled.
    Cancelled,
}
