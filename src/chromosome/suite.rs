//! Chromosome holding a whole test suite.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::execution::ExecutionTrace;
use super::fitness::ComputationCache;
use super::test_case::TestCaseChromosome;
use super::{Chromosome, ChromosomeVisitor};
use crate::genome::{TestFactory, random_test_case};
use crate::schema::SearchConfig;
use crate::search::SearchRng;

/// An ordered collection of test case chromosomes.
#[derive(Clone)]
pub struct TestSuiteChromosome {
    tests: Vec<TestCaseChromosome>,
    factory: Arc<dyn TestFactory>,
    config: Arc<SearchConfig>,
    changed: bool,
    rank: usize,
    distance: f64,
    cache: ComputationCache<TestSuiteChromosome>,
}

impl TestSuiteChromosome {
    pub fn new(factory: Arc<dyn TestFactory>, config: Arc<SearchConfig>) -> Self {
        Self {
            tests: Vec::new(),
            factory,
            config,
            changed: true,
            rank: 0,
            distance: 0.0,
            cache: ComputationCache::new(),
        }
    }

    pub fn test_chromosomes(&self) -> &[TestCaseChromosome] {
        &self.tests
    }

    pub fn test_chromosome(&self, index: usize) -> Option<&TestCaseChromosome> {
        self.tests.get(index)
    }

    pub fn add_test_case_chromosome(&mut self, test: TestCaseChromosome) {
        self.tests.push(test);
        self.set_changed(true);
    }

    pub fn add_test_case_chromosomes(&mut self, tests: impl IntoIterator<Item = TestCaseChromosome>) {
        self.tests.extend(tests);
        self.set_changed(true);
    }

    pub fn set_test_case_chromosome(&mut self, index: usize, test: TestCaseChromosome) {
        if let Some(slot) = self.tests.get_mut(index) {
            *slot = test;
            self.set_changed(true);
        }
    }

    pub fn delete_test_case_chromosome(&mut self, index: usize) -> Option<TestCaseChromosome> {
        if index >= self.tests.len() {
            return None;
        }
        let removed = self.tests.remove(index);
        self.set_changed(true);
        Some(removed)
    }

    /// Union of the traces of all executed tests.
    pub fn merged_trace(&self) -> ExecutionTrace {
        let mut trace = ExecutionTrace::default();
        for result in self.tests.iter().filter_map(|t| t.last_execution_result()) {
            trace.merge(&result.trace);
        }
        trace
    }
}

impl Chromosome for TestSuiteChromosome {
    fn size(&self) -> usize {
        self.tests.len()
    }

    fn length(&self) -> usize {
        self.tests.iter().map(|t| t.length()).sum()
    }

    fn computation_cache(&self) -> &ComputationCache<Self> {
        &self.cache
    }

    fn computation_cache_mut(&mut self) -> &mut ComputationCache<Self> {
        &mut self.cache
    }

    fn changed(&self) -> bool {
        self.changed || self.tests.iter().any(|t| t.changed())
    }

    fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
        if changed {
            self.cache.invalidate();
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn set_rank(&mut self, rank: usize) {
        self.rank = rank;
    }

    fn distance(&self) -> f64 {
        self.distance
    }

    fn set_distance(&mut self, distance: f64) {
        self.distance = distance;
    }

    /// Mutate each test with probability 1/size, append fresh random tests
    /// while `random() <= test_insertion_probability^k`, then drop tests
    /// that became empty.
    fn mutate(&mut self, rng: &mut SearchRng) -> bool {
        let mut changed = false;

        if !self.tests.is_empty() {
            let p = 1.0 / self.tests.len() as f64;
            for test in self.tests.iter_mut() {
                if rng.next_bool(p) {
                    changed |= test.mutate(rng);
                }
            }
        }

        let alpha = self.config.test_case.test_insertion_probability;
        let max_size = self.config.test_case.max_suite_size;
        let mut exponent = 1;
        while rng.next_f64() <= alpha.powi(exponent) && self.tests.len() < max_size {
            match random_test_case(self.factory.as_ref(), &self.config.test_case, rng) {
                Ok(test_case) => {
                    self.tests.push(TestCaseChromosome::new(
                        test_case,
                        self.factory.clone(),
                        self.config.clone(),
                    ));
                    changed = true;
                }
                Err(err) => log::debug!("Adding a random test failed: {}", err),
            }
            exponent += 1;
        }

        let before = self.tests.len();
        self.tests.retain(|t| t.size() > 0);
        changed |= self.tests.len() != before;

        if changed {
            self.set_changed(true);
        }
        changed
    }

    /// Keep tests up to `pos1` and append copies of `other`'s tests from `pos2`.
    fn cross_over(&mut self, other: &Self, pos1: usize, pos2: usize) -> bool {
        let pos1 = pos1.min(self.tests.len());
        let pos2 = pos2.min(other.tests.len());
        if pos1 + (other.tests.len() - pos2) > self.config.test_case.max_suite_size {
            return false;
        }
        self.tests.truncate(pos1);
        self.tests.extend(other.tests[pos2..].iter().cloned());
        self.set_changed(true);
        true
    }

    fn accept(&self, visitor: &mut dyn ChromosomeVisitor) {
        visitor.visit_test_suite_chromosome(self);
    }
}

impl fmt::Debug for TestSuiteChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuiteChromosome")
            .field("tests", &self.tests)
            .field("changed", &self.changed)
            .finish()
    }
}

impl PartialEq for TestSuiteChromosome {
    fn eq(&self, other: &Self) -> bool {
        self.tests == other.tests
    }
}

impl Eq for TestSuiteChromosome {}

impl Hash for TestSuiteChromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tests.hash(state);
    }
}
