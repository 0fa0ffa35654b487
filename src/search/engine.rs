//! Search engine shared by the MIO and MOSA strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::chromosome::{
    Chromosome, CoverageRef, FitnessRef, TestCaseChromosome, TestCaseExecutor,
    TestSuiteChromosome,
};
use crate::genome::{TestFactory, random_test_case};
use crate::schema::{
    SearchAlgorithm, SearchConfig, SearchHistory, SearchPhase, SearchProgress, SearchStats,
    StopReason,
};

use super::archive::MioArchive;
use super::budget::Budget;
use super::mio::MioStrategy;
use super::mosa::MosaStrategy;
use super::{SearchError, SearchRng};

/// Progress callback invoked by [`SearchEngine::run`] once after
/// initialization and once per iteration.
pub type ProgressCallback = Box<dyn Fn(&SearchProgress) + Send + Sync>;

/// Outcome of a finished search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best test per goal, without duplicates.
    pub suite: TestSuiteChromosome,
    pub stats: SearchStats,
    pub history: SearchHistory,
}

/// State shared by both strategies: operators, archive and counters.
pub(crate) struct SearchContext {
    pub(crate) config: Arc<SearchConfig>,
    pub(crate) rng: SearchRng,
    pub(crate) factory: Arc<dyn TestFactory>,
    pub(crate) executor: Arc<dyn TestCaseExecutor>,
    pub(crate) goals: Vec<FitnessRef<TestCaseChromosome>>,
    pub(crate) archive: MioArchive<TestCaseChromosome>,
    pub(crate) budget: Budget,
    pub(crate) iteration: usize,
    pub(crate) evaluations: u64,
}

impl SearchContext {
    /// Consumed share of the budget.
    pub(crate) fn progress(&self) -> f64 {
        self.budget.progress(self.iteration, self.evaluations)
    }

    /// A fresh random test with every goal registered, or `None` if the
    /// factory could not build one.
    pub(crate) fn random_chromosome(&mut self) -> Option<TestCaseChromosome> {
        match random_test_case(self.factory.as_ref(), &self.config.test_case, &mut self.rng) {
            Ok(test_case) => {
                let mut chromosome =
                    TestCaseChromosome::new(test_case, self.factory.clone(), self.config.clone());
                for goal in &self.goals {
                    chromosome.add_fitness_function(goal.clone());
                }
                Some(chromosome)
            }
            Err(err) => {
                log::debug!("Random test generation failed: {}", err);
                None
            }
        }
    }

    /// Execute `chromosome` unless its last result is still current.
    pub(crate) fn evaluate(&mut self, chromosome: &mut TestCaseChromosome) {
        if chromosome.changed() || chromosome.last_execution_result().is_none() {
            let result = self.executor.execute(chromosome.test_case());
            chromosome.set_last_execution_result(result);
            chromosome.set_changed(false);
            self.evaluations += 1;
        }
    }

    /// Evaluate `chromosome` and offer it to the archive.
    pub(crate) fn evaluate_and_archive(&mut self, chromosome: &mut TestCaseChromosome) -> bool {
        self.evaluate(chromosome);
        self.archive.update(chromosome)
    }
}

enum Strategy {
    Mio(MioStrategy),
    Mosa(MosaStrategy),
}

/// Search engine that runs test generation.
pub struct SearchEngine {
    context: SearchContext,
    strategy: Strategy,
    suite_fitness: Vec<FitnessRef<TestSuiteChromosome>>,
    suite_coverage: Vec<CoverageRef<TestSuiteChromosome>>,
    history: SearchHistory,
    phase: SearchPhase,
    initialized: bool,
    cancelled: Arc<AtomicBool>,
    progress_callback: Option<ProgressCallback>,
}

impl SearchEngine {
    /// Create a new engine over `goals`.
    pub fn new(
        config: SearchConfig,
        factory: Arc<dyn TestFactory>,
        executor: Arc<dyn TestCaseExecutor>,
        goals: Vec<FitnessRef<TestCaseChromosome>>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if goals.is_empty() {
            return Err(SearchError::NoGoals);
        }

        let seed = config.random_seed.unwrap_or_else(rand::random);
        let (strategy, capacity) = match &config.algorithm {
            SearchAlgorithm::Mio(mio) => (
                Strategy::Mio(MioStrategy::new(mio)),
                mio.initial.number_of_tests_per_target,
            ),
            SearchAlgorithm::Mosa(mosa) => (Strategy::Mosa(MosaStrategy::new(mosa)), 1),
        };
        let budget = Budget::new(config.budget.clone());
        let archive = MioArchive::new(goals.clone(), capacity);

        Ok(Self {
            context: SearchContext {
                config: Arc::new(config),
                rng: SearchRng::new(seed),
                factory,
                executor,
                goals,
                archive,
                budget,
                iteration: 0,
                evaluations: 0,
            },
            strategy,
            suite_fitness: Vec::new(),
            suite_coverage: Vec::new(),
            history: SearchHistory::default(),
            phase: SearchPhase::Initializing,
            initialized: false,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress_callback: None,
        })
    }

    /// Register functions on the resulting suite.
    pub fn with_suite_functions(
        mut self,
        fitness: Vec<FitnessRef<TestSuiteChromosome>>,
        coverage: Vec<CoverageRef<TestSuiteChromosome>>,
    ) -> Self {
        self.suite_fitness = fitness;
        self.suite_coverage = coverage;
        self
    }

    /// Report progress to `callback` during [`SearchEngine::run`].
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.context.config
    }

    pub fn archive(&self) -> &MioArchive<TestCaseChromosome> {
        &self.context.archive
    }

    /// Current MOSA population; empty for MIO.
    pub fn population(&self) -> &[TestCaseChromosome] {
        match &self.strategy {
            Strategy::Mio(_) => &[],
            Strategy::Mosa(mosa) => mosa.population(),
        }
    }

    pub fn iteration(&self) -> usize {
        self.context.iteration
    }

    pub fn evaluations(&self) -> u64 {
        self.context.evaluations
    }

    /// Build the initial state: the first population for MOSA.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        log::info!(
            "Starting {} search over {} goals",
            match self.strategy {
                Strategy::Mio(_) => "MIO",
                Strategy::Mosa(_) => "MOSA",
            },
            self.context.goals.len()
        );
        if let Strategy::Mosa(mosa) = &mut self.strategy {
            mosa.initialize(&mut self.context);
        }
        self.initialized = true;
        self.phase = SearchPhase::Exploring;
    }

    /// Perform one MIO step or one MOSA generation.
    pub fn step(&mut self) {
        self.initialize();
        match &mut self.strategy {
            Strategy::Mio(mio) => mio.evolve(&mut self.context),
            Strategy::Mosa(mosa) => mosa.evolve(&mut self.context),
        }
        self.context.iteration += 1;

        let archive = &self.context.archive;
        self.history.record(
            archive.num_covered_targets(),
            archive.total_best_fitness(),
            self.context.evaluations,
        );

        if let Strategy::Mio(mio) = &self.strategy
            && mio.is_focused(self.context.progress())
        {
            if self.phase != SearchPhase::Focused {
                log::info!("Entering focused phase at iteration {}", self.context.iteration);
            }
            self.phase = SearchPhase::Focused;
        }
    }

    /// Get current progress.
    pub fn progress(&self) -> SearchProgress {
        let archive = &self.context.archive;
        SearchProgress {
            iteration: self.context.iteration,
            evaluations: self.context.evaluations,
            progress: self.context.progress(),
            covered_goals: archive.num_covered_targets(),
            total_goals: archive.num_targets(),
            total_fitness: archive.total_best_fitness(),
            archive_size: archive.num_solutions(),
            history: self.history.clone(),
            phase: self.phase,
        }
    }

    /// Check if the search should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }
        if self.context.archive.all_covered() {
            return Some(StopReason::AllGoalsCovered);
        }
        self.context
            .budget
            .exhausted(self.context.iteration, self.context.evaluations)
    }

    /// The archive's solutions as a suite with the suite functions
    /// registered.
    pub fn best_suite(&self) -> TestSuiteChromosome {
        let mut suite = TestSuiteChromosome::new(
            self.context.factory.clone(),
            self.context.config.clone(),
        );
        suite.add_test_case_chromosomes(self.context.archive.get_solutions());
        for function in &self.suite_fitness {
            suite.add_fitness_function(function.clone());
        }
        for function in &self.suite_coverage {
            suite.add_coverage_function(function.clone());
        }
        suite
    }

    /// Run the search with progress callback.
    pub fn run_with_callback<F>(&mut self, callback: F) -> SearchResult
    where
        F: Fn(&SearchProgress),
    {
        let start_time = Instant::now();
        self.context.budget.restart();

        self.initialize();
        callback(&self.progress());

        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }
            self.step();
            callback(&self.progress());
        };

        self.phase = match stop_reason {
            StopReason::Cancelled => SearchPhase::Stopped,
            _ => SearchPhase::Complete,
        };
        log::info!(
            "Search stopped ({:?}) after {} iterations: {}/{} goals covered",
            stop_reason,
            self.context.iteration,
            self.context.archive.num_covered_targets(),
            self.context.archive.num_targets()
        );

        let suite = self.best_suite();
        let elapsed = start_time.elapsed().as_secs_f64();
        let evaluations = self.context.evaluations;

        SearchResult {
            stats: SearchStats {
                iterations: self.context.iteration,
                evaluations,
                covered_goals: self.context.archive.num_covered_targets(),
                total_goals: self.context.archive.num_targets(),
                suite_size: suite.size(),
                suite_length: suite.length(),
                elapsed_seconds: elapsed,
                evaluations_per_second: if elapsed > 0.0 {
                    evaluations as f64 / elapsed
                } else {
                    0.0
                },
                stop_reason,
            },
            suite,
            history: self.history.clone(),
        }
    }

    /// Run the search (blocking), reporting to the registered progress
    /// callback if there is one.
    pub fn run(&mut self) -> SearchResult {
        match self.progress_callback.take() {
            Some(callback) => {
                let result = self.run_with_callback(|progress| callback(progress));
                self.progress_callback = Some(callback);
                result
            }
            None => self.run_with_callback(|_| {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::chromosome::{LineCoverageSuiteFunction, SuiteStatistics};
    use crate::schema::{BudgetConfig, MioConfig, MosaConfig, SelectionMethod};
    use crate::toy::{ToyExecutor, ToyFactory, ToySubject};

    fn engine(algorithm: SearchAlgorithm, iterations: usize, seed: u64) -> SearchEngine {
        let subject = Arc::new(ToySubject::new());
        let config = SearchConfig {
            algorithm,
            budget: BudgetConfig {
                max_iterations: Some(iterations),
                max_evaluations: None,
                max_search_time_secs: None,
            },
            random_seed: Some(seed),
            ..Default::default()
        };
        let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
        let executor = Arc::new(ToyExecutor::new(subject.clone()));
        SearchEngine::new(config, factory, executor, subject.goals())
            .unwrap()
            .with_suite_functions(
                Vec::new(),
                vec![Arc::new(LineCoverageSuiteFunction::new(subject.lines()))
                    as CoverageRef<TestSuiteChromosome>],
            )
    }

    fn small_mosa() -> SearchAlgorithm {
        SearchAlgorithm::Mosa(MosaConfig {
            population_size: 10,
            ..Default::default()
        })
    }

    #[test]
    fn test_rejects_empty_goals() {
        let subject = Arc::new(ToySubject::new());
        let config = SearchConfig::default();
        let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
        let executor = Arc::new(ToyExecutor::new(subject));
        let result = SearchEngine::new(config, factory, executor, Vec::new());
        assert!(matches!(result, Err(SearchError::NoGoals)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let subject = Arc::new(ToySubject::new());
        let mut config = SearchConfig::default();
        config.test_case.test_delete_probability = 1.5;
        let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
        let executor = Arc::new(ToyExecutor::new(subject.clone()));
        let result = SearchEngine::new(config, factory, executor, subject.goals());
        assert!(matches!(result, Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn test_mio_run() {
        let mut engine = engine(SearchAlgorithm::Mio(MioConfig::default()), 200, 1);
        let result = engine.run();

        assert!(result.stats.iterations <= 200);
        assert!(result.stats.covered_goals > 0);
        assert!(result.stats.evaluations > 0);
        assert_eq!(result.history.covered_goals.len(), result.stats.iterations);
        assert!(result.suite.get_coverage() > 0.0);
        assert!(
            result
                .history
                .covered_goals
                .windows(2)
                .all(|w| w[0] <= w[1])
        );
    }

    #[test]
    fn test_mosa_run() {
        let mut engine = engine(small_mosa(), 15, 2);
        let result = engine.run();

        assert!(result.stats.covered_goals > 0);
        assert!(engine.population().len() <= 10);
        assert_eq!(result.stats.suite_size, result.suite.size());
        let mut stats = SuiteStatistics::default();
        result.suite.accept(&mut stats);
        assert_eq!(stats.unexecuted_tests, 0);
        assert_eq!(stats.tests, result.stats.suite_size);
    }

    #[test]
    fn test_rank_selection_run() {
        let algorithm = SearchAlgorithm::Mosa(MosaConfig {
            population_size: 8,
            selection: SelectionMethod::RankBased { bias: 1.7 },
            ..Default::default()
        });
        let result = engine(algorithm, 5, 3).run();
        assert!(result.stats.iterations <= 5);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let a = engine(small_mosa(), 5, 7).run();
        let b = engine(small_mosa(), 5, 7).run();
        assert_eq!(a.history.covered_goals, b.history.covered_goals);
        assert_eq!(a.history.evaluations, b.history.evaluations);
        assert_eq!(a.suite, b.suite);

        let c = engine(SearchAlgorithm::Mio(MioConfig::default()), 50, 7).run();
        let d = engine(SearchAlgorithm::Mio(MioConfig::default()), 50, 7).run();
        assert_eq!(c.history.total_fitness, d.history.total_fitness);
        assert_eq!(c.suite, d.suite);
    }

    #[test]
    fn test_evaluation_budget() {
        let subject = Arc::new(ToySubject::new());
        let config = SearchConfig {
            algorithm: SearchAlgorithm::Mio(MioConfig::default()),
            budget: BudgetConfig {
                max_iterations: None,
                max_evaluations: Some(30),
                max_search_time_secs: None,
            },
            random_seed: Some(5),
            ..Default::default()
        };
        let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
        let executor = Arc::new(ToyExecutor::new(subject.clone()));
        let mut engine = SearchEngine::new(config, factory, executor, subject.goals()).unwrap();
        let result = engine.run();
        assert!(matches!(
            result.stats.stop_reason,
            StopReason::MaxEvaluations | StopReason::AllGoalsCovered
        ));
        assert!(result.stats.evaluations <= 31);
    }

    #[test]
    fn test_callback_per_iteration() {
        let mut engine = engine(SearchAlgorithm::Mio(MioConfig::default()), 20, 4);
        let calls = Cell::new(0usize);
        let result = engine.run_with_callback(|_| calls.set(calls.get() + 1));
        assert_eq!(calls.get(), result.stats.iterations + 1);
    }

    #[test]
    fn test_registered_progress_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_iteration = Arc::new(AtomicUsize::new(0));
        let (counter, last) = (calls.clone(), last_iteration.clone());
        let mut engine = engine(small_mosa(), 5, 7).with_progress_callback(Box::new(
            move |progress: &SearchProgress| {
                counter.fetch_add(1, Ordering::Relaxed);
                last.store(progress.iteration, Ordering::Relaxed);
            },
        ));

        let result = engine.run();
        assert_eq!(calls.load(Ordering::Relaxed), result.stats.iterations + 1);
        assert_eq!(last_iteration.load(Ordering::Relaxed), result.stats.iterations);
    }

    #[test]
    fn test_cancellation() {
        let mut engine = engine(small_mosa(), 100, 6);
        let cancel = engine.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.iterations, 0);
        assert_eq!(engine.progress().phase, SearchPhase::Stopped);
    }
}
