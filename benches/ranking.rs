//! Benchmarks for MOSA ranking over toy populations.

use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use covolve::{
    chromosome::{Chromosome, TestCaseChromosome, TestCaseExecutor},
    genome::{TestFactory, random_test_case},
    schema::SearchConfig,
    search::{SearchRng, compute_ranking_assignment, fast_epsilon_dominance_assignment},
    toy::{ToyExecutor, ToyFactory, ToySubject},
};

/// Evaluated random population with every toy goal registered.
fn population(subject: &Arc<ToySubject>, size: usize, seed: u64) -> Vec<TestCaseChromosome> {
    let config = Arc::new(SearchConfig::default());
    let factory: Arc<dyn TestFactory> =
        Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
    let executor = ToyExecutor::new(subject.clone());
    let mut rng = SearchRng::new(seed);

    (0..size)
        .map(|_| {
            let test_case = random_test_case(factory.as_ref(), &config.test_case, &mut rng)
                .expect("toy subject always yields a test");
            let mut chromosome =
                TestCaseChromosome::new(test_case, factory.clone(), config.clone());
            for goal in subject.goals() {
                chromosome.add_fitness_function(goal);
            }
            let result = executor.execute(chromosome.test_case());
            chromosome.set_last_execution_result(result);
            chromosome
        })
        .collect()
}

fn bench_ranking_assignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking_assignment");
    let subject = Arc::new(ToySubject::new());
    let goals = subject.goals();

    for size in [50, 100, 200] {
        let members = population(&subject, size, 42);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || members.clone(),
                |members| black_box(compute_ranking_assignment(members, &goals)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_epsilon_dominance(c: &mut Criterion) {
    let mut group = c.benchmark_group("epsilon_dominance");
    let subject = Arc::new(ToySubject::new());
    let goals = subject.goals();

    for size in [50, 100, 200] {
        let mut front = population(&subject, size, 7);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                fast_epsilon_dominance_assignment(black_box(&mut front), &goals);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ranking_assignment, bench_epsilon_dominance);
criterion_main!(benches);
