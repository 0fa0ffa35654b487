//! Single-point relative crossover.

use crate::chromosome::Chromosome;

use super::SearchRng;

/// Cut both parents at the same relative point and swap tails in place.
///
/// Both parents need at least two elements. The cut lies in
/// `1..size` for each parent so that every offspring keeps a non-empty
/// head. Returns whether either parent changed.
pub fn single_point_relative_crossover<C: Chromosome>(
    parent1: &mut C,
    parent2: &mut C,
    rng: &mut SearchRng,
) -> bool {
    if parent1.size() < 2 || parent2.size() < 2 {
        return false;
    }
    let split = rng.next_f64();
    let cut = |size: usize| ((size - 1) as f64 * split).floor() as usize + 1;
    let pos1 = cut(parent1.size());
    let pos2 = cut(parent2.size());

    let original1 = parent1.clone();
    let original2 = parent2.clone();
    let first = parent1.cross_over(&original2, pos1, pos2);
    let second = parent2.cross_over(&original1, pos2, pos1);
    if !(first || second) {
        log::debug!("Crossover rejected: offspring too long");
    }
    first || second
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chromosome::TestCaseChromosome;
    use crate::genome::{TestFactory, random_test_case};
    use crate::schema::SearchConfig;
    use crate::toy::{ToyFactory, ToySubject};

    fn chromosome(seed: u64) -> TestCaseChromosome {
        let subject = Arc::new(ToySubject::new());
        let config = Arc::new(SearchConfig::default());
        let factory: Arc<dyn TestFactory> =
            Arc::new(ToyFactory::new(subject, config.statement.clone()));
        let mut rng = SearchRng::new(seed);
        loop {
            let tc = random_test_case(factory.as_ref(), &config.test_case, &mut rng).unwrap();
            if tc.size() >= 2 {
                return TestCaseChromosome::new(tc, factory, config);
            }
        }
    }

    #[test]
    fn test_crossover_needs_two_elements() {
        let mut a = chromosome(1);
        let mut b = chromosome(2);
        let b_before = b.clone();
        a.test_case_mut().chop(0);
        assert_eq!(a.size(), 1);
        let a_before = a.clone();
        let mut rng = SearchRng::new(0);
        assert!(!single_point_relative_crossover(&mut a, &mut b, &mut rng));
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn test_offspring_keep_references_valid() {
        let mut rng = SearchRng::new(9);
        for seed in 0..20 {
            let mut a = chromosome(seed);
            let mut b = chromosome(seed + 100);
            single_point_relative_crossover(&mut a, &mut b, &mut rng);
            assert!(a.test_case().check_references().is_ok());
            assert!(b.test_case().check_references().is_ok());
            assert!(a.size() >= 1 && b.size() >= 1);
        }
    }
}
