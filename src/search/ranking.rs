//! Many-objective ranking.
//!
//! Front 0 is the union of the preference-best members (per uncovered goal,
//! the members with the lowest fitness, ties going to the shortest) and the
//! members not dominated by anyone. The remaining members are split into
//! further fronts by non-dominated sorting. Each chromosome's `rank` is set
//! to the index of its front.

use std::cmp::Ordering;

use crate::chromosome::{Chromosome, FitnessRef};

/// `a` dominates `b` when it is no worse on every objective and strictly
/// better on at least one.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Partition `population` into fronts over `objectives`.
///
/// Fronts are disjoint and together hold every member. With no objectives
/// the whole population forms front 0.
pub fn compute_ranking_assignment<C: Chromosome>(
    population: Vec<C>,
    objectives: &[FitnessRef<C>],
) -> Vec<Vec<C>> {
    if population.is_empty() {
        return Vec::new();
    }
    if objectives.is_empty() {
        let mut front = population;
        for member in front.iter_mut() {
            member.set_rank(0);
        }
        return vec![front];
    }

    let values: Vec<Vec<f64>> = population
        .iter()
        .map(|c| objectives.iter().map(|o| c.get_fitness_for(o)).collect())
        .collect();
    let lengths: Vec<usize> = population.iter().map(|c| c.length()).collect();

    let mut front_of: Vec<Option<usize>> = vec![None; population.len()];

    for index in preference_best(&values, &lengths) {
        front_of[index] = Some(0);
    }
    let everyone: Vec<usize> = (0..population.len()).collect();
    let sorted = non_dominated_sort(&values, &everyone);
    if let Some(first) = sorted.first() {
        for &index in first {
            front_of[index] = Some(0);
        }
    }

    let remaining: Vec<usize> = (0..population.len())
        .filter(|&i| front_of[i].is_none())
        .collect();
    for (k, front) in non_dominated_sort(&values, &remaining).iter().enumerate() {
        for &index in front {
            front_of[index] = Some(k + 1);
        }
    }

    let count = front_of.iter().flatten().max().map_or(0, |m| m + 1);
    let mut fronts: Vec<Vec<C>> = (0..count).map(|_| Vec::new()).collect();
    for (mut member, front) in population.into_iter().zip(front_of) {
        let front = front.unwrap_or(0);
        member.set_rank(front);
        fronts[front].push(member);
    }
    fronts
}

/// Indices holding the minimal `(fitness, length)` pair of some objective.
fn preference_best(values: &[Vec<f64>], lengths: &[usize]) -> Vec<usize> {
    let objectives = values.first().map_or(0, |v| v.len());
    let mut best = Vec::new();
    for objective in 0..objectives {
        let key = |i: usize| (values[i][objective], lengths[i]);
        let min = (0..values.len())
            .map(key)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        if let Some(min) = min {
            best.extend((0..values.len()).filter(|&i| key(i) == min));
        }
    }
    best.sort_unstable();
    best.dedup();
    best
}

/// Fast non-dominated sort restricted to `members`.
fn non_dominated_sort(values: &[Vec<f64>], members: &[usize]) -> Vec<Vec<usize>> {
    let n = members.len();
    let mut dominated_by_count = vec![0usize; n];
    let mut dominates_list: Vec<Vec<usize>> = vec![Vec::new(); n];

    for p in 0..n {
        for q in (p + 1)..n {
            let (a, b) = (&values[members[p]], &values[members[q]]);
            if dominates(a, b) {
                dominates_list[p].push(q);
                dominated_by_count[q] += 1;
            } else if dominates(b, a) {
                dominates_list[q].push(p);
                dominated_by_count[p] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&p| dominated_by_count[p] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominates_list[p] {
                dominated_by_count[q] -= 1;
                if dominated_by_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current.iter().map(|&p| members[p]).collect());
        current = next;
    }
    fronts
}

/// Assign each member of `front` a diversity distance.
///
/// For every objective on which the front is not flat, the members reaching
/// the minimum receive `(|front| - |min set|) / |front|`, keeping the
/// largest such reward over all objectives. Everyone else stays at 0.
pub fn fast_epsilon_dominance_assignment<C: Chromosome>(
    front: &mut [C],
    objectives: &[FitnessRef<C>],
) {
    for member in front.iter_mut() {
        member.set_distance(0.0);
    }
    if front.is_empty() {
        return;
    }
    let size = front.len() as f64;

    for objective in objectives {
        let values: Vec<f64> = front.iter().map(|c| c.get_fitness_for(objective)).collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == min {
            continue;
        }
        let min_set: Vec<usize> = (0..values.len()).filter(|&i| values[i] == min).collect();
        let reward = (size - min_set.len() as f64) / size;
        for index in min_set {
            let member = &mut front[index];
            member.set_distance(member.distance().max(reward));
        }
    }
}

/// Crowded comparison: lower rank first, then larger distance, then
/// shorter genome.
pub fn crowded_order<C: Chromosome>(a: &C, b: &C) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| b.distance().total_cmp(&a.distance()))
        .then_with(|| a.length().cmp(&b.length()))
}

/// Sort a front by decreasing distance, ties going to the shorter genome.
pub fn sort_by_distance<C: Chromosome>(front: &mut [C]) {
    front.sort_by(|a, b| {
        b.distance()
            .total_cmp(&a.distance())
            .then_with(|| a.length().cmp(&b.length()))
    });
}

/// Keep the best `size` members of `population` over `objectives`.
///
/// Whole fronts are taken in rank order. The first front that does not fit
/// contributes its most distant members. The survivors come back in
/// crowded order.
pub fn select_survivors<C: Chromosome>(
    population: Vec<C>,
    objectives: &[FitnessRef<C>],
    size: usize,
) -> Vec<C> {
    let fronts = compute_ranking_assignment(population, objectives);

    let mut survivors = Vec::with_capacity(size);
    for mut front in fronts {
        let remaining = size - survivors.len();
        if remaining == 0 {
            break;
        }
        fast_epsilon_dominance_assignment(&mut front, objectives);
        if front.len() <= remaining {
            survivors.extend(front);
        } else {
            sort_by_distance(&mut front);
            survivors.extend(front.into_iter().take(remaining));
        }
    }
    survivors.sort_by(crowded_order);
    survivors
}
