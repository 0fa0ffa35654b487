//! Chromosome wrapping a single test case.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::execution::ExecutionResult;
use super::fitness::ComputationCache;
use super::{Chromosome, ChromosomeVisitor};
use crate::genome::{
    ConstructionError, Memo, Statement, TestCase, TestFactory, mutate_statement, random_test_case,
};
use crate::schema::SearchConfig;
use crate::search::SearchRng;

/// A test case under evolution.
#[derive(Clone)]
pub struct TestCaseChromosome {
    test_case: TestCase,
    factory: Arc<dyn TestFactory>,
    config: Arc<SearchConfig>,
    last_execution_result: Option<Arc<ExecutionResult>>,
    changed: bool,
    rank: usize,
    distance: f64,
    cache: ComputationCache<TestCaseChromosome>,
}

impl TestCaseChromosome {
    /// Wrap `test_case`. A new chromosome counts as changed.
    pub fn new(test_case: TestCase, factory: Arc<dyn TestFactory>, config: Arc<SearchConfig>) -> Self {
        Self {
            test_case,
            factory,
            config,
            last_execution_result: None,
            changed: true,
            rank: 0,
            distance: 0.0,
            cache: ComputationCache::new(),
        }
    }

    pub fn test_case(&self) -> &TestCase {
        &self.test_case
    }

    /// Mutable access to the genome; marks the chromosome changed.
    pub fn test_case_mut(&mut self) -> &mut TestCase {
        self.changed = true;
        self.cache.invalidate();
        &mut self.test_case
    }

    pub fn factory(&self) -> &Arc<dyn TestFactory> {
        &self.factory
    }

    pub fn last_execution_result(&self) -> Option<&ExecutionResult> {
        self.last_execution_result.as_deref()
    }

    /// Store the result of running the current genome. Cached values are
    /// dropped since every function reads the result.
    pub fn set_last_execution_result(&mut self, result: ExecutionResult) {
        self.last_execution_result = Some(Arc::new(result));
        self.cache.invalidate();
    }

    /// Last position that mutation may touch: the first failing statement,
    /// or the last statement when nothing failed.
    pub fn last_mutatable_position(&self) -> Option<usize> {
        let last = self.test_case.size().checked_sub(1)?;
        let failure = self
            .last_execution_result
            .as_ref()
            .and_then(|r| r.first_failure_position());
        Some(failure.map_or(last, |f| f.min(last)))
    }

    fn mutation_delete(&mut self, rng: &mut SearchRng) -> bool {
        let Some(last) = self.last_mutatable_position() else {
            return false;
        };
        let p = 1.0 / (last + 1) as f64;
        let mut changed = false;
        for position in (0..=last).rev() {
            if position >= self.test_case.size() {
                continue;
            }
            if rng.next_bool(p) {
                changed |= self
                    .factory
                    .delete_statement_gracefully(&mut self.test_case, position, rng);
            }
        }
        changed
    }

    fn mutation_change(&mut self, rng: &mut SearchRng) -> bool {
        let Some(last) = self.last_mutatable_position() else {
            return false;
        };
        let p = 1.0 / (last + 1) as f64;
        let mut changed = false;
        let mut position = 0;
        while self
            .last_mutatable_position()
            .is_some_and(|last| position <= last)
        {
            if rng.next_bool(p) {
                let ret_val = self.test_case.statement(position).and_then(|s| s.ret_val().cloned());
                let is_call = self.test_case.statement(position).is_some_and(Statement::is_call);

                let mutated = match mutate_statement(&mut self.test_case, position, rng, &self.config)
                {
                    Ok(mutated) => mutated,
                    Err(err @ ConstructionError::UnsupportedMutation(_)) => {
                        log::warn!("Skipping statement at {}: {}", position, err);
                        false
                    }
                    Err(err) => {
                        log::debug!("Mutation at {} failed: {}", position, err);
                        false
                    }
                };
                if mutated {
                    changed = true;
                } else if is_call
                    && self
                        .factory
                        .change_random_call(&mut self.test_case, position, rng)
                {
                    changed = true;
                }
                // Insertions before the statement move it.
                if let Some(var) = ret_val
                    && let Some(current) = self.test_case.position_of(&var)
                {
                    position = current;
                }
            }
            position += 1;
        }
        changed
    }

    fn mutation_insert(&mut self, rng: &mut SearchRng) -> bool {
        let alpha = self.config.test_case.statement_insertion_probability;
        let max_size = self.config.test_case.chromosome_length;
        let mut changed = false;
        let mut exponent = 1;
        while rng.next_f64() <= alpha.powi(exponent) && self.test_case.size() < max_size {
            let bound = self.last_mutatable_position().map_or(0, |last| last + 1);
            let position = rng.next_index(bound + 1);
            match self
                .factory
                .insert_random_statement(&mut self.test_case, position, rng)
            {
                Ok(_) => changed = true,
                Err(err) => log::debug!("Statement insertion at {} failed: {}", position, err),
            }
            exponent += 1;
        }
        changed
    }
}

impl Chromosome for TestCaseChromosome {
    fn size(&self) -> usize {
        self.test_case.size()
    }

    fn length(&self) -> usize {
        self.test_case.size()
    }

    fn computation_cache(&self) -> &ComputationCache<Self> {
        &self.cache
    }

    fn computation_cache_mut(&mut self) -> &mut ComputationCache<Self> {
        &mut self.cache
    }

    fn changed(&self) -> bool {
        self.changed
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

    /// Chop after the last mutatable statement, then delete, change and
    /// insert statements, each with its configured probability. A genome
    /// left without any subject call is regenerated.
    fn mutate(&mut self, rng: &mut SearchRng) -> bool {
        let mut changed = false;

        if let Some(last) = self.last_mutatable_position()
            && self.test_case.chop(last) > 0
        {
            changed = true;
        }

        let probabilities = &self.config.test_case;
        let (delete, change, insert) = (
            probabilities.test_delete_probability,
            probabilities.test_change_probability,
            probabilities.test_insert_probability,
        );
        if rng.next_bool(delete) && self.mutation_delete(rng) {
            changed = true;
        }
        if rng.next_bool(change) && self.mutation_change(rng) {
            changed = true;
        }
        if rng.next_bool(insert) && self.mutation_insert(rng) {
            changed = true;
        }

        if changed && !self.test_case.contains_call() {
            match random_test_case(self.factory.as_ref(), &self.config.test_case, rng) {
                Ok(fresh) => self.test_case = fresh,
                Err(err) => log::debug!("Regenerating test case failed: {}", err),
            }
        }

        if changed {
            self.set_changed(true);
        }
        changed
    }

    /// Statements of `other` from `pos2` on are cloned into the offspring.
    /// A dependency on the discarded head of `other` is re-bound to the
    /// nearest earlier compatible variable of the offspring; a statement
    /// without one is dropped.
    fn cross_over(&mut self, other: &Self, pos1: usize, pos2: usize) -> bool {
        let mut offspring = TestCase::new();

        let mut head_memo = Memo::new();
        for stmt in &self.test_case.statements()[..pos1.min(self.test_case.size())] {
            match stmt
                .clone_with(&mut offspring, &mut head_memo)
                .and_then(|copy| offspring.append_statement(copy))
            {
                Ok(_) => {}
                Err(err) => {
                    log::debug!("Crossover head copy failed: {}", err);
                    return false;
                }
            }
        }

        let mut tail_memo = Memo::new();
        for stmt in &other.test_case.statements()[pos2.min(other.test_case.size())..] {
            let end = offspring.size();
            let mut bindable = true;
            for dep in stmt.dependencies() {
                if tail_memo.contains_key(&dep.id()) {
                    continue;
                }
                match offspring.objects_before(dep.value_type(), end).pop() {
                    Some(replacement) => {
                        tail_memo.insert(dep.id(), replacement);
                    }
                    None => {
                        bindable = false;
                        break;
                    }
                }
            }
            if !bindable {
                continue;
            }
            match stmt
                .clone_with(&mut offspring, &mut tail_memo)
                .and_then(|copy| offspring.append_statement(copy))
            {
                Ok(_) => {}
                Err(err) => log::debug!("Crossover tail statement dropped: {}", err),
            }
        }

        let max = self.config.test_case.max_length_test_case;
        if offspring.size() > max {
            log::debug!(
                "{}",
                ConstructionError::LengthExceeded {
                    length: offspring.size(),
                    max
                }
            );
            return false;
        }

        self.test_case = offspring;
        self.set_changed(true);
        true
    }

    fn accept(&self, visitor: &mut dyn ChromosomeVisitor) {
        visitor.visit_test_case_chromosome(self);
    }
}

impl fmt::Debug for TestCaseChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCaseChromosome")
            .field("test_case", &self.test_case)
            .field("changed", &self.changed)
            .field("rank", &self.rank)
            .field("distance", &self.distance)
            .field("executed", &self.last_execution_result.is_some())
            .finish()
    }
}

impl PartialEq for TestCaseChromosome {
    fn eq(&self, other: &Self) -> bool {
        self.test_case == other.test_case
    }
}

impl Eq for TestCaseChromosome {}

impl Hash for TestCaseChromosome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.test_case.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{FitnessRef, StatementFailure, TestCaseExecutor};
    use crate::toy::{ToyExecutor, ToyFactory, ToySubject};

    struct Fixture {
        subject: Arc<ToySubject>,
        factory: Arc<ToyFactory>,
        config: Arc<SearchConfig>,
    }

    fn fixture() -> Fixture {
        let subject = Arc::new(ToySubject::new());
        let config = Arc::new(SearchConfig::default());
        let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
        Fixture {
            subject,
            factory,
            config,
        }
    }

    fn random_chromosome(fx: &Fixture, rng: &mut SearchRng) -> TestCaseChromosome {
        let tc = random_test_case(fx.factory.as_ref(), &fx.config.test_case, rng).unwrap();
        TestCaseChromosome::new(tc, fx.factory.clone(), fx.config.clone())
    }

    #[test]
    fn test_new_is_changed_and_unexecuted() {
        let fx = fixture();
        let mut rng = SearchRng::new(1);
        let chromosome = random_chromosome(&fx, &mut rng);
        assert!(chromosome.changed());
        assert!(chromosome.last_execution_result().is_none());
        assert_eq!(chromosome.size(), chromosome.length());
    }

    #[test]
    fn test_fitness_cached_until_execution() {
        let fx = fixture();
        let mut rng = SearchRng::new(2);
        let mut chromosome = random_chromosome(&fx, &mut rng);
        let goals: Vec<FitnessRef<TestCaseChromosome>> = fx.subject.goals();
        for goal in &goals {
            chromosome.add_fitness_function(goal.clone());
        }
        assert!(chromosome.get_fitness().is_infinite());

        let result = ToyExecutor::new(fx.subject.clone()).execute(chromosome.test_case());
        chromosome.set_last_execution_result(result);
        assert!(chromosome.get_fitness().is_finite());
        for goal in &goals {
            let value = chromosome.get_fitness_for(goal);
            assert!((0.0..=2.0).contains(&value));
        }
    }

    #[test]
    fn test_last_mutatable_position() {
        let fx = fixture();
        let mut rng = SearchRng::new(3);
        let mut chromosome = random_chromosome(&fx, &mut rng);
        while chromosome.size() < 3 {
            chromosome = random_chromosome(&fx, &mut rng);
        }
        let size = chromosome.size();
        assert_eq!(chromosome.last_mutatable_position(), Some(size - 1));

        chromosome.set_last_execution_result(ExecutionResult {
            failure: Some(StatementFailure {
                position: 1,
                message: "raised".into(),
            }),
            ..Default::default()
        });
        assert_eq!(chromosome.last_mutatable_position(), Some(1));
    }

    #[test]
    fn test_mutate_preserves_invariants() {
        let fx = fixture();
        let mut rng = SearchRng::new(4);
        let executor = ToyExecutor::new(fx.subject.clone());
        let mut chromosome = random_chromosome(&fx, &mut rng);
        for _ in 0..200 {
            chromosome.set_changed(false);
            chromosome.mutate(&mut rng);
            let tc = chromosome.test_case();
            assert!(tc.check_references().is_ok());
            assert!(tc.contains_call());
            if chromosome.changed() {
                let result = executor.execute(chromosome.test_case());
                chromosome.set_last_execution_result(result);
            }
        }
    }

    #[test]
    fn test_mutate_chops_after_failure() {
        let fx = fixture();
        let mut rng = SearchRng::new(5);
        let mut chromosome = random_chromosome(&fx, &mut rng);
        while chromosome.size() < 4 {
            chromosome = random_chromosome(&fx, &mut rng);
        }
        chromosome.set_last_execution_result(ExecutionResult {
            failure: Some(StatementFailure {
                position: 1,
                message: "raised".into(),
            }),
            ..Default::default()
        });
        chromosome.set_changed(false);

        let mut quiet = (*fx.config).clone();
        quiet.test_case.test_delete_probability = 0.0;
        quiet.test_case.test_change_probability = 0.0;
        quiet.test_case.test_insert_probability = 0.0;
        chromosome.config = Arc::new(quiet);

        chromosome.mutate(&mut rng);
        assert!(chromosome.changed());
        assert!(chromosome.test_case().contains_call());
        assert!(chromosome.test_case().check_references().is_ok());
    }

    #[test]
    fn test_crossover_has_no_dangling_references() {
        let fx = fixture();
        let mut rng = SearchRng::new(6);
        for _ in 0..50 {
            let mut a = random_chromosome(&fx, &mut rng);
            let b = random_chromosome(&fx, &mut rng);
            let pos1 = rng.next_index(a.size() + 1);
            let pos2 = rng.next_index(b.size() + 1);
            assert!(a.cross_over(&b, pos1, pos2));
            assert!(a.test_case().check_references().is_ok());
            assert!(a.size() >= pos1);
        }
    }

    #[test]
    fn test_crossover_respects_max_length() {
        let fx = fixture();
        let mut rng = SearchRng::new(7);
        let mut a = random_chromosome(&fx, &mut rng);
        while a.size() < 2 {
            a = random_chromosome(&fx, &mut rng);
        }
        let mut tight = (*fx.config).clone();
        tight.test_case.max_length_test_case = 1;
        a.config = Arc::new(tight);
        let b = a.clone();
        let before = a.test_case().clone();

        assert!(!a.cross_over(&b, a.size(), 0));
        assert_eq!(a.test_case(), &before);
    }

    #[test]
    fn test_clone_equals_original() {
        let fx = fixture();
        let mut rng = SearchRng::new(8);
        let a = random_chromosome(&fx, &mut rng);
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = TestCaseChromosome::new(TestCase::new(), fx.factory.clone(), fx.config.clone());
        assert!(c.cross_over(&a, 0, 0));
        assert_eq!(a, c);
    }
}
