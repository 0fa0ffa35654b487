//! Execution results and the executor seam.

use std::collections::{HashMap, HashSet};

use crate::genome::TestCase;

/// Identifier of a branching predicate in the subject.
pub type PredicateId = usize;

/// Identifier of a source line in the subject.
pub type LineId = usize;

/// Coverage signals collected while running one test case.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    /// Subject functions that were entered.
    pub executed_functions: HashSet<String>,
    /// Lines that were executed.
    pub covered_lines: HashSet<LineId>,
    /// Minimal observed distance to the true outcome, per predicate.
    pub true_distances: HashMap<PredicateId, f64>,
    /// Minimal observed distance to the false outcome, per predicate.
    pub false_distances: HashMap<PredicateId, f64>,
}

impl ExecutionTrace {
    pub fn record_function(&mut self, name: &str) {
        if !self.executed_functions.contains(name) {
            self.executed_functions.insert(name.to_string());
        }
    }

    pub fn record_line(&mut self, line: LineId) {
        self.covered_lines.insert(line);
    }

    /// Record one evaluation of `predicate`. The taken outcome has distance 0.
    pub fn record_predicate(&mut self, predicate: PredicateId, true_distance: f64, false_distance: f64) {
        keep_min(&mut self.true_distances, predicate, true_distance);
        keep_min(&mut self.false_distances, predicate, false_distance);
    }

    /// Whether `predicate` was evaluated at least once.
    pub fn executed_predicate(&self, predicate: PredicateId) -> bool {
        self.true_distances.contains_key(&predicate)
    }

    /// Minimal distance to `outcome` of `predicate`, if it was evaluated.
    pub fn branch_distance(&self, predicate: PredicateId, outcome: bool) -> Option<f64> {
        let distances = if outcome {
            &self.true_distances
        } else {
            &self.false_distances
        };
        distances.get(&predicate).copied()
    }

    /// Fold `other` into this trace, keeping minimal distances.
    pub fn merge(&mut self, other: &ExecutionTrace) {
        self.executed_functions
            .extend(other.executed_functions.iter().cloned());
        self.covered_lines.extend(other.covered_lines.iter().copied());
        for (&predicate, &d) in &other.true_distances {
            keep_min(&mut self.true_distances, predicate, d);
        }
        for (&predicate, &d) in &other.false_distances {
            keep_min(&mut self.false_distances, predicate, d);
        }
    }
}

fn keep_min(map: &mut HashMap<PredicateId, f64>, key: PredicateId, value: f64) {
    map.entry(key)
        .and_modify(|d| *d = d.min(value))
        .or_insert(value);
}

/// A statement that raised during execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementFailure {
    pub position: usize,
    pub message: String,
}

/// Outcome of running one test case.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub trace: ExecutionTrace,
    /// First failing statement; execution stops there.
    pub failure: Option<StatementFailure>,
}

impl ExecutionResult {
    pub fn has_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub fn first_failure_position(&self) -> Option<usize> {
        self.failure.as_ref().map(|f| f.position)
    }
}

/// Runs a test case against the subject.
///
/// Must be deterministic enough for one comparison to be meaningful; the
/// search never re-executes to filter out flakiness.
pub trait TestCaseExecutor {
    fn execute(&self, test_case: &TestCase) -> ExecutionResult;
}
