//! Many-Objective Sorting Algorithm.

use crate::chromosome::{Chromosome, TestCaseChromosome};
use crate::schema::{MosaConfig, SelectionMethod};

use super::crossover::single_point_relative_crossover;
use super::engine::SearchContext;
use super::ranking::select_survivors;
use super::selection::select;

/// Population-based search ranked over the uncovered goals.
#[derive(Debug)]
pub(crate) struct MosaStrategy {
    population_size: usize,
    crossover_rate: f64,
    number_of_mutations: usize,
    selection: SelectionMethod,
    population: Vec<TestCaseChromosome>,
}

impl MosaStrategy {
    pub(crate) fn new(config: &MosaConfig) -> Self {
        Self {
            population_size: config.population_size,
            crossover_rate: config.crossover_rate,
            number_of_mutations: config.number_of_mutations,
            selection: config.selection.clone(),
            population: Vec::new(),
        }
    }

    pub(crate) fn population(&self) -> &[TestCaseChromosome] {
        &self.population
    }

    /// Fill the population with random tests and rank it once.
    pub(crate) fn initialize(&mut self, ctx: &mut SearchContext) {
        let mut population = Vec::with_capacity(self.population_size);
        let mut attempts = 0;
        while population.len() < self.population_size
            && attempts < ctx.config.test_case.max_generation_attempts * self.population_size
        {
            attempts += 1;
            if let Some(mut chromosome) = ctx.random_chromosome() {
                ctx.evaluate_and_archive(&mut chromosome);
                population.push(chromosome);
            }
        }
        if population.len() < self.population_size {
            log::warn!(
                "Initial population holds only {} of {} tests",
                population.len(),
                self.population_size
            );
        }
        self.population = self.rank_and_truncate(ctx, population);
    }

    /// One generation: breed, union, rank, truncate, archive.
    pub(crate) fn evolve(&mut self, ctx: &mut SearchContext) {
        let offspring = self.breed_next_generation(ctx);

        let mut union = std::mem::take(&mut self.population);
        union.extend(offspring);
        self.population = self.rank_and_truncate(ctx, union);

        for chromosome in self.population.iter_mut() {
            ctx.evaluate_and_archive(chromosome);
        }
    }

    fn breed_next_generation(&self, ctx: &mut SearchContext) -> Vec<TestCaseChromosome> {
        let mut offspring = Vec::with_capacity(self.population_size + 1);

        for _ in 0..self.population_size / 2 {
            let (Some(i), Some(j)) = (
                select(&self.selection, &self.population, &mut ctx.rng),
                select(&self.selection, &self.population, &mut ctx.rng),
            ) else {
                break;
            };
            let mut first = self.population[i].clone();
            let mut second = self.population[j].clone();

            if ctx.rng.next_bool(self.crossover_rate) {
                single_point_relative_crossover(&mut first, &mut second, &mut ctx.rng);
            }
            for _ in 0..self.number_of_mutations {
                first.mutate(&mut ctx.rng);
                second.mutate(&mut ctx.rng);
            }

            for mut child in [first, second] {
                if child.changed() && child.size() > 0 {
                    ctx.evaluate(&mut child);
                    offspring.push(child);
                }
            }
        }

        let insertions =
            (self.population_size as f64 * ctx.config.test_case.test_insertion_probability) as usize;
        for _ in 0..insertions {
            let candidate = if ctx.archive.num_covered_targets() == 0 || ctx.rng.next_bool(0.5) {
                ctx.random_chromosome()
            } else {
                let solutions = ctx.archive.covering_solutions();
                ctx.rng.choose(&solutions).cloned().map(|mut chromosome| {
                    chromosome.mutate(&mut ctx.rng);
                    chromosome
                })
            };
            if let Some(mut child) = candidate
                && child.changed()
                && child.size() > 0
            {
                ctx.evaluate(&mut child);
                offspring.push(child);
            }
        }
        offspring
    }

    /// Rank `union` over the uncovered goals and keep the best
    /// `population_size` members.
    fn rank_and_truncate(
        &self,
        ctx: &SearchContext,
        union: Vec<TestCaseChromosome>,
    ) -> Vec<TestCaseChromosome> {
        let objectives = ctx.archive.uncovered_targets();
        select_survivors(union, &objectives, self.population_size)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::genome::TestFactory;
    use crate::schema::{BudgetConfig, SearchConfig};
    use crate::search::{Budget, MioArchive, SearchRng};
    use crate::toy::{ToyExecutor, ToyFactory, ToySubject};

    fn context(seed: u64) -> SearchContext {
        let subject = Arc::new(ToySubject::new());
        let config = Arc::new(SearchConfig::default());
        let factory: Arc<dyn TestFactory> =
            Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
        let goals = subject.goals();
        SearchContext {
            config,
            rng: SearchRng::new(seed),
            factory,
            executor: Arc::new(ToyExecutor::new(subject)),
            archive: MioArchive::new(goals.clone(), 1),
            goals,
            budget: Budget::new(BudgetConfig::default()),
            iteration: 0,
            evaluations: 0,
        }
    }

    fn strategy(population_size: usize) -> MosaStrategy {
        MosaStrategy::new(&MosaConfig {
            population_size,
            ..Default::default()
        })
    }

    #[test]
    fn test_initialize_fills_population() {
        let mut ctx = context(1);
        let mut mosa = strategy(12);
        mosa.initialize(&mut ctx);
        assert_eq!(mosa.population().len(), 12);
        assert_eq!(ctx.evaluations, 12);
        assert!(mosa.population().iter().all(|c| !c.changed()));
    }

    #[test]
    fn test_population_size_is_kept() {
        let mut ctx = context(2);
        let mut mosa = strategy(10);
        mosa.initialize(&mut ctx);
        for _ in 0..5 {
            mosa.evolve(&mut ctx);
            assert_eq!(mosa.population().len(), 10);
            assert!(
                mosa.population()
                    .iter()
                    .all(|c| c.last_execution_result().is_some())
            );
        }
    }

    #[test]
    fn test_population_sorted_by_rank() {
        let mut ctx = context(3);
        let mut mosa = strategy(10);
        mosa.initialize(&mut ctx);
        mosa.evolve(&mut ctx);
        let ranks: Vec<usize> = mosa.population().iter().map(|c| c.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }
}
