//! Fitness and coverage functions, and the per-chromosome computation cache.
//!
//! All functions minimise towards 0 (fitness) or maximise towards 1
//! (coverage) and are pure over the chromosome and its last execution
//! result. Values are cached per chromosome until the chromosome is edited
//! or re-executed.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::execution::{ExecutionTrace, LineId, PredicateId};
use super::suite::TestSuiteChromosome;
use super::test_case::TestCaseChromosome;

/// A minimising objective; 0 means satisfied.
pub trait FitnessFunction<C>: fmt::Debug {
    fn compute_fitness(&self, chromosome: &C) -> f64;
}

/// A coverage ratio in `[0, 1]`.
pub trait CoverageFunction<C>: fmt::Debug {
    fn compute_coverage(&self, chromosome: &C) -> f64;
}

/// Shared handle to a fitness function; identity is the allocation.
pub type FitnessRef<C> = Arc<dyn FitnessFunction<C>>;

/// Shared handle to a coverage function; identity is the allocation.
pub type CoverageRef<C> = Arc<dyn CoverageFunction<C>>;

fn function_key<T: ?Sized>(function: &Arc<T>) -> usize {
    Arc::as_ptr(function) as *const () as usize
}

/// Map a non-negative branch distance into `[0, 1)`.
pub fn normalise(distance: f64) -> f64 {
    distance / (distance + 1.0)
}

/// Registered functions of a chromosome and their cached values.
pub struct ComputationCache<C> {
    fitness_functions: Vec<FitnessRef<C>>,
    coverage_functions: Vec<CoverageRef<C>>,
    fitness_values: RefCell<HashMap<usize, f64>>,
    coverage_values: RefCell<HashMap<usize, f64>>,
}

impl<C> ComputationCache<C> {
    pub fn new() -> Self {
        Self {
            fitness_functions: Vec::new(),
            coverage_functions: Vec::new(),
            fitness_values: RefCell::new(HashMap::new()),
            coverage_values: RefCell::new(HashMap::new()),
        }
    }

    pub fn add_fitness_function(&mut self, function: FitnessRef<C>) {
        self.fitness_functions.push(function);
    }

    pub fn add_coverage_function(&mut self, function: CoverageRef<C>) {
        self.coverage_functions.push(function);
    }

    pub fn fitness_functions(&self) -> &[FitnessRef<C>] {
        &self.fitness_functions
    }

    pub fn coverage_functions(&self) -> &[CoverageRef<C>] {
        &self.coverage_functions
    }

    /// Drop all cached values.
    pub fn invalidate(&self) {
        self.fitness_values.borrow_mut().clear();
        self.coverage_values.borrow_mut().clear();
    }

    /// Value of `function` for `chromosome`, computed at most once until
    /// the next invalidation. `function` need not be registered.
    pub fn fitness_for(&self, chromosome: &C, function: &FitnessRef<C>) -> f64 {
        let key = function_key(function);
        if let Some(&value) = self.fitness_values.borrow().get(&key) {
            return value;
        }
        let value = function.compute_fitness(chromosome);
        self.fitness_values.borrow_mut().insert(key, value);
        value
    }

    /// Sum over the registered fitness functions.
    pub fn fitness(&self, chromosome: &C) -> f64 {
        self.fitness_functions
            .iter()
            .map(|f| self.fitness_for(chromosome, f))
            .sum()
    }

    pub fn coverage_for(&self, chromosome: &C, function: &CoverageRef<C>) -> f64 {
        let key = function_key(function);
        if let Some(&value) = self.coverage_values.borrow().get(&key) {
            return value;
        }
        let value = function.compute_coverage(chromosome);
        self.coverage_values.borrow_mut().insert(key, value);
        value
    }

    /// Mean over the registered coverage functions; 0 when there are none.
    pub fn coverage(&self, chromosome: &C) -> f64 {
        if self.coverage_functions.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .coverage_functions
            .iter()
            .map(|f| self.coverage_for(chromosome, f))
            .sum();
        total / self.coverage_functions.len() as f64
    }
}

impl<C> Default for ComputationCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ComputationCache<C> {
    fn clone(&self) -> Self {
        Self {
            fitness_functions: self.fitness_functions.clone(),
            coverage_functions: self.coverage_functions.clone(),
            fitness_values: RefCell::new(self.fitness_values.borrow().clone()),
            coverage_values: RefCell::new(self.coverage_values.borrow().clone()),
        }
    }
}

impl<C> fmt::Debug for ComputationCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputationCache")
            .field("fitness_functions", &self.fitness_functions.len())
            .field("coverage_functions", &self.coverage_functions.len())
            .field("cached_fitness", &self.fitness_values.borrow().len())
            .field("cached_coverage", &self.coverage_values.borrow().len())
            .finish()
    }
}

// ============================================================================
// Test case goals
// ============================================================================

/// Reach `outcome` of `predicate`, which lives in `function`.
///
/// Fitness is the normalised branch distance once the predicate ran, 1 if
/// only the enclosing function ran, and 2 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchGoal {
    pub function: String,
    pub predicate: PredicateId,
    pub outcome: bool,
}

impl BranchGoal {
    pub fn new(function: &str, predicate: PredicateId, outcome: bool) -> Self {
        Self {
            function: function.to_string(),
            predicate,
            outcome,
        }
    }
}

impl FitnessFunction<TestCaseChromosome> for BranchGoal {
    fn compute_fitness(&self, chromosome: &TestCaseChromosome) -> f64 {
        let Some(result) = chromosome.last_execution_result() else {
            return f64::INFINITY;
        };
        let trace = &result.trace;
        match trace.branch_distance(self.predicate, self.outcome) {
            Some(distance) => normalise(distance),
            None if trace.executed_functions.contains(&self.function) => 1.0,
            None => 2.0,
        }
    }
}

/// Enter a function; the goal for functions without branches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionGoal {
    pub function: String,
}

impl FunctionGoal {
    pub fn new(function: &str) -> Self {
        Self {
            function: function.to_string(),
        }
    }
}

impl FitnessFunction<TestCaseChromosome> for FunctionGoal {
    fn compute_fitness(&self, chromosome: &TestCaseChromosome) -> f64 {
        match chromosome.last_execution_result() {
            Some(result) if result.trace.executed_functions.contains(&self.function) => 0.0,
            Some(_) => 1.0,
            None => f64::INFINITY,
        }
    }
}

/// Execute a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineGoal {
    pub line: LineId,
}

impl LineGoal {
    pub fn new(line: LineId) -> Self {
        Self { line }
    }
}

impl FitnessFunction<TestCaseChromosome> for LineGoal {
    fn compute_fitness(&self, chromosome: &TestCaseChromosome) -> f64 {
        match chromosome.last_execution_result() {
            Some(result) if result.trace.covered_lines.contains(&self.line) => 0.0,
            Some(_) => 1.0,
            None => f64::INFINITY,
        }
    }
}

// ============================================================================
// Suite functions
// ============================================================================

/// Sum over both outcomes of every predicate of the best normalised branch
/// distance reached by any test of the suite.
#[derive(Debug, Clone)]
pub struct BranchDistanceSuiteFunction {
    predicates: Vec<PredicateId>,
}

impl BranchDistanceSuiteFunction {
    pub fn new(predicates: Vec<PredicateId>) -> Self {
        Self { predicates }
    }
}

impl FitnessFunction<TestSuiteChromosome> for BranchDistanceSuiteFunction {
    fn compute_fitness(&self, chromosome: &TestSuiteChromosome) -> f64 {
        let trace = chromosome.merged_trace();
        self.predicates
            .iter()
            .flat_map(|&p| [(p, true), (p, false)])
            .map(|(p, outcome)| {
                trace
                    .branch_distance(p, outcome)
                    .map(normalise)
                    .unwrap_or(1.0)
            })
            .sum()
    }
}

/// Share of branch outcomes taken by at least one test of the suite.
#[derive(Debug, Clone)]
pub struct BranchCoverageSuiteFunction {
    predicates: Vec<PredicateId>,
}

impl BranchCoverageSuiteFunction {
    pub fn new(predicates: Vec<PredicateId>) -> Self {
        Self { predicates }
    }
}

fn covered_outcomes(trace: &ExecutionTrace, predicates: &[PredicateId]) -> usize {
    predicates
        .iter()
        .flat_map(|&p| [(p, true), (p, false)])
        .filter(|&(p, outcome)| trace.branch_distance(p, outcome) == Some(0.0))
        .count()
}

impl CoverageFunction<TestSuiteChromosome> for BranchCoverageSuiteFunction {
    fn compute_coverage(&self, chromosome: &TestSuiteChromosome) -> f64 {
        if self.predicates.is_empty() {
            return 1.0;
        }
        let trace = chromosome.merged_trace();
        covered_outcomes(&trace, &self.predicates) as f64 / (2 * self.predicates.len()) as f64
    }
}

/// Share of lines executed by at least one test of the suite.
#[derive(Debug, Clone)]
pub struct LineCoverageSuiteFunction {
    lines: BTreeSet<LineId>,
}

impl LineCoverageSuiteFunction {
    pub fn new(lines: impl IntoIterator<Item = LineId>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
        }
    }
}

impl CoverageFunction<TestSuiteChromosome> for LineCoverageSuiteFunction {
    fn compute_coverage(&self, chromosome: &TestSuiteChromosome) -> f64 {
        if self.lines.is_empty() {
            return 1.0;
        }
        let trace = chromosome.merged_trace();
        let covered = self
            .lines
            .iter()
            .filter(|line| trace.covered_lines.contains(line))
            .count();
        covered as f64 / self.lines.len() as f64
    }
}
