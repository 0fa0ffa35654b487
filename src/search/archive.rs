//! Many Independent Objective archive.
//!
//! One slot per goal. An uncovered slot keeps up to `capacity` candidates
//! ordered best first by `(fitness, length)`. Once a candidate reaches
//! fitness 0 the slot collapses to that single covering solution, which is
//! only ever replaced by a shorter covering one.

use crate::chromosome::{Chromosome, FitnessRef};
use crate::schema::{MioConfig, MioParameters};

use super::SearchRng;

// ============================================================================
// Parameter schedule
// ============================================================================

/// Linear annealing of the MIO parameters from their initial to their
/// focused values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MioSchedule {
    initial: MioParameters,
    focused: MioParameters,
    exploitation_starts_at: f64,
}

impl MioSchedule {
    /// Panics if either parameter set holds a probability outside `[0, 1]`
    /// or a zero per-target capacity.
    pub fn new(config: &MioConfig) -> Self {
        for params in [&config.initial, &config.focused] {
            assert!(
                (0.0..=1.0).contains(&params.random_test_or_from_archive_probability),
                "random_test_or_from_archive_probability must be within [0, 1], got {}",
                params.random_test_or_from_archive_probability
            );
            assert!(
                params.number_of_tests_per_target >= 1,
                "number_of_tests_per_target must be at least 1"
            );
        }
        Self {
            initial: config.initial,
            focused: config.focused,
            exploitation_starts_at: config.exploitation_starts_at_percent,
        }
    }

    /// Whether `progress` lies in the focused phase.
    pub fn is_focused(&self, progress: f64) -> bool {
        progress >= self.exploitation_starts_at
    }

    /// Parameters in effect at `progress` in `[0, 1]`.
    pub fn parameters_at(&self, progress: f64) -> MioParameters {
        if self.is_focused(progress) || self.exploitation_starts_at <= 0.0 {
            return self.focused;
        }
        let scale = progress.max(0.0) / self.exploitation_starts_at;
        let lerp = |from: f64, to: f64| from + (to - from) * scale;
        MioParameters {
            number_of_tests_per_target: lerp(
                self.initial.number_of_tests_per_target as f64,
                self.focused.number_of_tests_per_target as f64,
            )
            .round()
            .max(1.0) as usize,
            random_test_or_from_archive_probability: lerp(
                self.initial.random_test_or_from_archive_probability,
                self.focused.random_test_or_from_archive_probability,
            ),
            number_of_mutations: lerp(
                self.initial.number_of_mutations as f64,
                self.focused.number_of_mutations as f64,
            )
            .round()
            .max(1.0) as usize,
        }
    }
}

// ============================================================================
// Archive
// ============================================================================

#[derive(Debug, Clone)]
struct ArchiveEntry<C> {
    fitness: f64,
    length: usize,
    chromosome: C,
}

impl<C> ArchiveEntry<C> {
    /// Whether `(fitness, length)` is strictly better than this entry.
    fn is_improved_by(&self, fitness: f64, length: usize) -> bool {
        fitness < self.fitness || (fitness == self.fitness && length < self.length)
    }
}

#[derive(Debug, Clone)]
struct Slot<C> {
    entries: Vec<ArchiveEntry<C>>,
    covered: bool,
}

impl<C> Default for Slot<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            covered: false,
        }
    }
}

impl<C> Slot<C> {
    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.fitness
                .total_cmp(&b.fitness)
                .then_with(|| a.length.cmp(&b.length))
        });
    }
}

/// Per-goal populations of the best chromosomes seen so far.
#[derive(Debug, Clone)]
pub struct MioArchive<C: Chromosome> {
    targets: Vec<FitnessRef<C>>,
    slots: Vec<Slot<C>>,
    capacity: usize,
}

impl<C: Chromosome> MioArchive<C> {
    /// Panics if `capacity` is zero.
    pub fn new(targets: Vec<FitnessRef<C>>, capacity: usize) -> Self {
        assert!(capacity >= 1, "archive capacity must be at least 1");
        let slots = targets.iter().map(|_| Slot::default()).collect();
        Self {
            targets,
            slots,
            capacity,
        }
    }

    pub fn targets(&self) -> &[FitnessRef<C>] {
        &self.targets
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offer `candidate` to every slot. Returns whether any slot changed.
    pub fn update(&mut self, candidate: &C) -> bool {
        let mut updated = false;
        let length = candidate.length();

        for (index, target) in self.targets.iter().enumerate() {
            let fitness = candidate.get_fitness_for(target);
            if !fitness.is_finite() {
                continue;
            }
            let slot = &mut self.slots[index];

            if fitness == 0.0 {
                let replace = match slot.entries.first() {
                    Some(best) if slot.covered => length < best.length,
                    _ => true,
                };
                if replace {
                    if !slot.covered {
                        log::debug!("Covered goal {} ({:?})", index, target);
                    }
                    slot.entries = vec![ArchiveEntry {
                        fitness,
                        length,
                        chromosome: candidate.clone(),
                    }];
                    slot.covered = true;
                    updated = true;
                }
                continue;
            }

            if slot.covered {
                continue;
            }

            if slot.entries.len() < self.capacity {
                slot.entries.push(ArchiveEntry {
                    fitness,
                    length,
                    chromosome: candidate.clone(),
                });
                slot.sort();
                updated = true;
            } else if let Some(worst) = slot.entries.last()
                && worst.is_improved_by(fitness, length)
            {
                let last = slot.entries.len() - 1;
                slot.entries[last] = ArchiveEntry {
                    fitness,
                    length,
                    chromosome: candidate.clone(),
                };
                slot.sort();
                updated = true;
            }
        }
        updated
    }

    /// Set the per-goal capacity to `n` and drop the worst entries of every
    /// uncovered slot beyond it. Panics if `n` is zero.
    pub fn shrink_solutions(&mut self, n: usize) {
        assert!(n >= 1, "archive capacity must be at least 1");
        self.capacity = n;
        for slot in self.slots.iter_mut().filter(|s| !s.covered) {
            slot.entries.truncate(self.capacity);
        }
    }

    /// Clone of the best entry of a uniformly chosen non-empty slot.
    /// Uncovered slots are preferred; covered ones are used only when no
    /// uncovered slot holds a candidate.
    pub fn get_solution(&self, rng: &mut SearchRng) -> Option<C> {
        let uncovered: Vec<usize> = (0..self.slots.len())
            .filter(|&i| !self.slots[i].covered && !self.slots[i].entries.is_empty())
            .collect();
        let pool = if uncovered.is_empty() {
            (0..self.slots.len())
                .filter(|&i| !self.slots[i].entries.is_empty())
                .collect()
        } else {
            uncovered
        };
        let &index = rng.choose(&pool)?;
        self.slots[index]
            .entries
            .first()
            .map(|e| e.chromosome.clone())
    }

    /// Best chromosome of every non-empty slot in goal order, without
    /// structural duplicates.
    pub fn get_solutions(&self) -> Vec<C> {
        let mut solutions: Vec<C> = Vec::new();
        for entry in self.slots.iter().filter_map(|s| s.entries.first()) {
            if !solutions.contains(&entry.chromosome) {
                solutions.push(entry.chromosome.clone());
            }
        }
        solutions
    }

    /// Covering solutions only, without structural duplicates.
    pub fn covering_solutions(&self) -> Vec<C> {
        let mut solutions: Vec<C> = Vec::new();
        for slot in self.slots.iter().filter(|s| s.covered) {
            if let Some(entry) = slot.entries.first()
                && !solutions.contains(&entry.chromosome)
            {
                solutions.push(entry.chromosome.clone());
            }
        }
        solutions
    }

    pub fn num_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn num_covered_targets(&self) -> usize {
        self.slots.iter().filter(|s| s.covered).count()
    }

    pub fn is_covered(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.covered)
    }

    pub fn all_covered(&self) -> bool {
        self.slots.iter().all(|s| s.covered)
    }

    /// Total number of stored candidates.
    pub fn num_solutions(&self) -> usize {
        self.slots.iter().map(|s| s.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_solutions() == 0
    }

    pub fn uncovered_targets(&self) -> Vec<FitnessRef<C>> {
        self.targets
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| !slot.covered)
            .map(|(target, _)| target.clone())
            .collect()
    }

    /// Best fitness recorded for goal `index`.
    pub fn best_fitness(&self, index: usize) -> Option<f64> {
        self.slots
            .get(index)
            .and_then(|s| s.entries.first())
            .map(|e| e.fitness)
    }

    /// Sum of the best fitness over goals holding at least one candidate.
    pub fn total_best_fitness(&self) -> f64 {
        (0..self.slots.len()).filter_map(|i| self.best_fitness(i)).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chromosome::{ChromosomeVisitor, ComputationCache, FitnessFunction};

    /// Chromosome with a fixed fitness per goal and a fixed length.
    #[derive(Debug, Clone)]
    struct Fixed {
        id: usize,
        values: Vec<f64>,
        length: usize,
        cache: ComputationCache<Fixed>,
    }

    impl Fixed {
        fn new(id: usize, values: Vec<f64>, length: usize) -> Self {
            Self {
                id,
                values,
                length,
                cache: ComputationCache::new(),
            }
        }
    }

    impl PartialEq for Fixed {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Chromosome for Fixed {
        fn size(&self) -> usize {
            self.length
        }
        fn length(&self) -> usize {
            self.length
        }
        fn computation_cache(&self) -> &ComputationCache<Self> {
            &self.cache
        }
        fn computation_cache_mut(&mut self) -> &mut ComputationCache<Self> {
            &mut self.cache
        }
        fn changed(&self) -> bool {
            false
        }
        fn set_changed(&mut self, _: bool) {}
        fn rank(&self) -> usize {
            0
        }
        fn set_rank(&mut self, _: usize) {}
        fn distance(&self) -> f64 {
            0.0
        }
        fn set_distance(&mut self, _: f64) {}
        fn mutate(&mut self, _: &mut SearchRng) -> bool {
            false
        }
        fn cross_over(&mut self, _: &Self, _: usize, _: usize) -> bool {
            false
        }
        fn accept(&self, _: &mut dyn ChromosomeVisitor) {}
    }

    #[derive(Debug)]
    struct Goal(usize);

    impl FitnessFunction<Fixed> for Goal {
        fn compute_fitness(&self, chromosome: &Fixed) -> f64 {
            chromosome.values[self.0]
        }
    }

    fn goals(count: usize) -> Vec<FitnessRef<Fixed>> {
        (0..count)
            .map(|i| Arc::new(Goal(i)) as FitnessRef<Fixed>)
            .collect()
    }

    fn entries(archive: &MioArchive<Fixed>, index: usize) -> Vec<(f64, usize)> {
        archive.slots[index]
            .entries
            .iter()
            .map(|e| (e.fitness, e.length))
            .collect()
    }

    #[test]
    fn test_capacity_and_replacement() {
        let mut archive = MioArchive::new(goals(1), 2);
        assert!(archive.update(&Fixed::new(0, vec![3.0], 4)));
        assert!(archive.update(&Fixed::new(1, vec![1.0], 2)));
        assert!(archive.update(&Fixed::new(2, vec![1.0], 5)));
        assert!(!archive.update(&Fixed::new(3, vec![5.0], 1)));
        assert_eq!(entries(&archive, 0), vec![(1.0, 2), (1.0, 5)]);

        archive.shrink_solutions(2);
        assert_eq!(entries(&archive, 0), vec![(1.0, 2), (1.0, 5)]);
        archive.shrink_solutions(1);
        assert_eq!(entries(&archive, 0), vec![(1.0, 2)]);
    }

    #[test]
    fn test_covering_collapses_slot() {
        let mut archive = MioArchive::new(goals(2), 3);
        archive.update(&Fixed::new(0, vec![0.5, 0.5], 3));
        archive.update(&Fixed::new(1, vec![0.2, 0.7], 3));
        assert!(archive.update(&Fixed::new(2, vec![0.0, 0.9], 6)));
        assert!(archive.is_covered(0));
        assert!(!archive.is_covered(1));
        assert_eq!(entries(&archive, 0), vec![(0.0, 6)]);

        // Equal or longer covering candidates are ignored, shorter replace.
        assert!(!archive.update(&Fixed::new(3, vec![0.0, 1.5], 6)));
        assert!(archive.update(&Fixed::new(4, vec![0.0, 1.5], 2)));
        assert_eq!(entries(&archive, 0), vec![(0.0, 2)]);
        assert_eq!(archive.num_covered_targets(), 1);
    }

    #[test]
    fn test_update_is_idempotent_on_covered() {
        let mut archive = MioArchive::new(goals(1), 2);
        let solution = Fixed::new(0, vec![0.0], 3);
        archive.update(&solution);
        let before = entries(&archive, 0);
        assert!(!archive.update(&solution));
        assert_eq!(entries(&archive, 0), before);
    }

    #[test]
    fn test_non_finite_fitness_is_ignored() {
        let mut archive = MioArchive::new(goals(1), 2);
        assert!(!archive.update(&Fixed::new(0, vec![f64::INFINITY], 1)));
        assert!(archive.is_empty());
    }

    #[test]
    fn test_get_solution_prefers_uncovered() {
        let mut archive = MioArchive::new(goals(2), 2);
        let mut rng = SearchRng::new(1);
        assert!(archive.get_solution(&mut rng).is_none());

        archive.update(&Fixed::new(0, vec![0.0, 1.0], 1));
        archive.update(&Fixed::new(1, vec![1.0, 0.5], 1));
        for _ in 0..20 {
            assert_eq!(archive.get_solution(&mut rng).map(|c| c.id), Some(1));
        }
    }

    #[test]
    fn test_get_solutions_deduplicates() {
        let mut archive = MioArchive::new(goals(3), 2);
        archive.update(&Fixed::new(0, vec![0.0, 0.0, 1.0], 1));
        archive.update(&Fixed::new(1, vec![1.0, 1.0, 0.3], 2));
        let ids: Vec<usize> = archive.get_solutions().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);
        let covering: Vec<usize> = archive.covering_solutions().iter().map(|c| c.id).collect();
        assert_eq!(covering, vec![0]);
    }

    #[test]
    fn test_schedule_interpolates() {
        let schedule = MioSchedule::new(&MioConfig {
            initial: MioParameters::initial(),
            focused: MioParameters::focused(),
            exploitation_starts_at_percent: 0.4,
        });
        assert_eq!(schedule.parameters_at(0.0), MioParameters::initial());

        let half = schedule.parameters_at(0.2);
        assert_eq!(half.number_of_tests_per_target, 6);
        assert!((half.random_test_or_from_archive_probability - 0.25).abs() < 1e-12);
        assert_eq!(half.number_of_mutations, 6);

        assert!(schedule.is_focused(0.4));
        assert_eq!(schedule.parameters_at(0.4), MioParameters::focused());
        assert_eq!(schedule.parameters_at(1.0), MioParameters::focused());
    }

    #[test]
    #[should_panic(expected = "archive capacity must be at least 1")]
    fn test_zero_capacity_is_fatal() {
        MioArchive::<Fixed>::new(goals(1), 0);
    }

    #[test]
    #[should_panic(expected = "archive capacity must be at least 1")]
    fn test_shrink_to_zero_is_fatal() {
        let mut archive = MioArchive::new(goals(1), 2);
        archive.update(&Fixed::new(0, vec![1.0], 1));
        archive.shrink_solutions(0);
    }

    #[test]
    #[should_panic(expected = "random_test_or_from_archive_probability")]
    fn test_schedule_rejects_probability_out_of_range() {
        let mut focused = MioParameters::focused();
        focused.random_test_or_from_archive_probability = 1.5;
        MioSchedule::new(&MioConfig {
            initial: MioParameters::initial(),
            focused,
            exploitation_starts_at_percent: 0.5,
        });
    }

    #[test]
    fn test_get_solution_returns_independent_copy() {
        let mut archive = MioArchive::new(goals(1), 2);
        archive.update(&Fixed::new(7, vec![0.4], 3));
        let mut rng = SearchRng::new(3);

        let mut copy = archive.get_solution(&mut rng).unwrap();
        copy.values[0] = 9.0;
        copy.length = 11;
        copy.id = 8;

        assert_eq!(entries(&archive, 0), vec![(0.4, 3)]);
        let again = archive.get_solution(&mut rng).unwrap();
        assert_eq!(again.id, 7);
        assert_eq!(again.values, vec![0.4]);
        assert_eq!(again.length, 3);
    }
}
