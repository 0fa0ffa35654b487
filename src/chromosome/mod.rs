//! Evolvable individuals: single test cases and test suites.
//!
//! A chromosome wraps a genome with the bookkeeping the search needs: a
//! dirty flag, scratch rank and distance used by ranking, and a cache of
//! fitness and coverage values that is dropped on every edit.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use covolve::chromosome::{Chromosome, TestCaseChromosome, TestCaseExecutor};
//! use covolve::genome::random_test_case;
//! use covolve::schema::SearchConfig;
//! use covolve::search::SearchRng;
//! use covolve::toy::{ToyExecutor, ToyFactory, ToySubject};
//!
//! let subject = Arc::new(ToySubject::new());
//! let config = Arc::new(SearchConfig::default());
//! let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
//! let mut rng = SearchRng::new(42);
//!
//! let test_case = random_test_case(factory.as_ref(), &config.test_case, &mut rng).unwrap();
//! let mut chromosome = TestCaseChromosome::new(test_case, factory, config);
//! for goal in subject.goals() {
//!     chromosome.add_fitness_function(goal);
//! }
//! let result = ToyExecutor::new(subject).execute(chromosome.test_case());
//! chromosome.set_last_execution_result(result);
//! println!("fitness: {}", chromosome.get_fitness());
//! ```

mod execution;
mod fitness;
mod suite;
mod test_case;

use std::fmt;

pub use execution::{
    ExecutionResult, ExecutionTrace, LineId, PredicateId, StatementFailure, TestCaseExecutor,
};
pub use fitness::{
    BranchCoverageSuiteFunction, BranchDistanceSuiteFunction, BranchGoal, ComputationCache,
    CoverageFunction, CoverageRef, FitnessFunction, FitnessRef, FunctionGoal,
    LineCoverageSuiteFunction, LineGoal, normalise,
};
pub use suite::TestSuiteChromosome;
pub use test_case::TestCaseChromosome;

use crate::search::SearchRng;

/// Common interface of test case and suite chromosomes.
pub trait Chromosome: Clone + PartialEq + fmt::Debug + 'static {
    /// Number of direct elements (statements, or tests for a suite).
    fn size(&self) -> usize;

    /// Total number of nested elements (statements over a whole suite).
    fn length(&self) -> usize;

    fn computation_cache(&self) -> &ComputationCache<Self>;

    fn computation_cache_mut(&mut self) -> &mut ComputationCache<Self>;

    /// Whether the genome was edited since it was last evaluated.
    fn changed(&self) -> bool;

    fn set_changed(&mut self, changed: bool);

    fn rank(&self) -> usize;

    fn set_rank(&mut self, rank: usize);

    fn distance(&self) -> f64;

    fn set_distance(&mut self, distance: f64);

    /// Apply the chromosome's mutation operators. Returns whether this call
    /// changed the genome.
    fn mutate(&mut self, rng: &mut SearchRng) -> bool;

    /// Keep `self` up to `pos1` and append a copy of `other` from `pos2`.
    ///
    /// Returns `false`, leaving `self` untouched, if the offspring would be
    /// too long.
    fn cross_over(&mut self, other: &Self, pos1: usize, pos2: usize) -> bool;

    fn accept(&self, visitor: &mut dyn ChromosomeVisitor);

    /// Sum of all registered fitness functions.
    fn get_fitness(&self) -> f64 {
        self.computation_cache().fitness(self)
    }

    fn get_fitness_for(&self, function: &FitnessRef<Self>) -> f64 {
        self.computation_cache().fitness_for(self, function)
    }

    /// Mean of all registered coverage functions.
    fn get_coverage(&self) -> f64 {
        self.computation_cache().coverage(self)
    }

    fn get_coverage_for(&self, function: &CoverageRef<Self>) -> f64 {
        self.computation_cache().coverage_for(self, function)
    }

    fn add_fitness_function(&mut self, function: FitnessRef<Self>) {
        self.computation_cache_mut().add_fitness_function(function);
    }

    fn add_coverage_function(&mut self, function: CoverageRef<Self>) {
        self.computation_cache_mut().add_coverage_function(function);
    }

    fn invalidate_cache(&self) {
        self.computation_cache().invalidate();
    }

    fn is_covered(&self, function: &FitnessRef<Self>) -> bool {
        self.get_fitness_for(function) == 0.0
    }
}

/// Double dispatch over the chromosome kinds.
pub trait ChromosomeVisitor {
    fn visit_test_case_chromosome(&mut self, chromosome: &TestCaseChromosome);

    fn visit_test_suite_chromosome(&mut self, chromosome: &TestSuiteChromosome);
}

/// Visitor collecting size statistics of a suite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteStatistics {
    pub tests: usize,
    pub statements: usize,
    /// Tests whose last execution raised.
    pub failing_tests: usize,
    /// Tests that were never executed.
    pub unexecuted_tests: usize,
}

impl ChromosomeVisitor for SuiteStatistics {
    fn visit_test_case_chromosome(&mut self, chromosome: &TestCaseChromosome) {
        self.tests += 1;
        self.statements += chromosome.size();
        match chromosome.last_execution_result() {
            Some(result) if result.has_failure() => self.failing_tests += 1,
            Some(_) => {}
            None => self.unexecuted_tests += 1,
        }
    }

    fn visit_test_suite_chromosome(&mut self, chromosome: &TestSuiteChromosome) {
        for test in chromosome.test_chromosomes() {
            test.accept(self);
        }
    }
}
