//! Many Independent Objective search.

use crate::chromosome::{Chromosome, TestCaseChromosome};
use crate::schema::{MioConfig, MioParameters};

use super::archive::MioSchedule;
use super::engine::SearchContext;

/// Single-solution search driven by the archive.
///
/// The current solution is mutated until it has used up its mutation
/// allowance, then replaced by a fresh random test (probability `Pr`, or
/// always while the archive is empty) or by a mutated clone of an archive
/// entry.
#[derive(Debug)]
pub(crate) struct MioStrategy {
    schedule: MioSchedule,
    parameters: MioParameters,
    solution: Option<TestCaseChromosome>,
    mutations: usize,
}

impl MioStrategy {
    pub(crate) fn new(config: &MioConfig) -> Self {
        Self {
            schedule: MioSchedule::new(config),
            parameters: config.initial,
            solution: None,
            mutations: 0,
        }
    }

    pub(crate) fn is_focused(&self, progress: f64) -> bool {
        self.schedule.is_focused(progress)
    }

    pub(crate) fn evolve(&mut self, ctx: &mut SearchContext) {
        self.update_parameters(ctx);

        let candidate = match self.solution.take() {
            Some(mut current) if self.mutations < self.parameters.number_of_mutations => {
                current.mutate(&mut ctx.rng);
                self.mutations += 1;
                Some(current)
            }
            _ => {
                self.mutations = 0;
                self.sample(ctx)
            }
        };

        self.solution = candidate.map(|mut solution| {
            ctx.evaluate_and_archive(&mut solution);
            solution
        });
        ctx.archive
            .shrink_solutions(self.parameters.number_of_tests_per_target);
    }

    fn sample(&self, ctx: &mut SearchContext) -> Option<TestCaseChromosome> {
        let random = ctx.archive.is_empty()
            || ctx
                .rng
                .next_bool(self.parameters.random_test_or_from_archive_probability);
        if random {
            return ctx.random_chromosome();
        }
        let mut chromosome = ctx.archive.get_solution(&mut ctx.rng)?;
        chromosome.mutate(&mut ctx.rng);
        Some(chromosome)
    }

    fn update_parameters(&mut self, ctx: &mut SearchContext) {
        let parameters = self.schedule.parameters_at(ctx.progress());
        if parameters != self.parameters {
            log::debug!("MIO parameters updated: {:?}", parameters);
            self.parameters = parameters;
            ctx.archive
                .shrink_solutions(parameters.number_of_tests_per_target);
        }
    }
}
