//! Parent selection over a ranked population.

use std::cmp::Ordering;

use crate::chromosome::Chromosome;
use crate::schema::SelectionMethod;

use super::SearchRng;
use super::ranking::crowded_order;

/// Index of the chosen parent, or `None` for an empty population.
///
/// Rank-based selection expects `population` sorted best first (see
/// [`crowded_order`]).
pub fn select<C: Chromosome>(
    method: &SelectionMethod,
    population: &[C],
    rng: &mut SearchRng,
) -> Option<usize> {
    if population.is_empty() {
        return None;
    }
    let index = match *method {
        SelectionMethod::Tournament { size } => tournament(population, size, rng),
        SelectionMethod::RankBased { bias } => rank_based(population.len(), bias, rng),
    };
    Some(index)
}

fn tournament<C: Chromosome>(population: &[C], size: usize, rng: &mut SearchRng) -> usize {
    let mut winner = rng.next_index(population.len());
    for _ in 1..size.max(1) {
        let challenger = rng.next_index(population.len());
        if crowded_order(&population[challenger], &population[winner]) == Ordering::Less {
            winner = challenger;
        }
    }
    winner
}

/// Linear ranking: `bias` in `[1, 2]` is the expected number of offspring
/// of the best individual.
fn rank_based(len: usize, bias: f64, rng: &mut SearchRng) -> usize {
    let r = rng.next_f64();
    let position = if (bias - 1.0).abs() < f64::EPSILON {
        r
    } else {
        (bias - (bias * bias - 4.0 * (bias - 1.0) * r).sqrt()) / 2.0 / (bias - 1.0)
    };
    ((len as f64 * position) as usize).min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_based_favours_front() {
        let mut rng = SearchRng::new(11);
        let mut counts = [0usize; 10];
        for _ in 0..10_000 {
            counts[rank_based(10, 1.7, &mut rng)] += 1;
        }
        assert!(counts[0] > counts[9]);
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn test_rank_based_uniform_without_bias() {
        let mut rng = SearchRng::new(12);
        for _ in 0..1_000 {
            assert!(rank_based(7, 1.0, &mut rng) < 7);
        }
    }
}
