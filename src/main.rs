//! Covolve CLI - Generate tests for the built-in toy subject.

use std::path::PathBuf;
use std::sync::Arc;

use covolve::{
    chromosome::{
        BranchCoverageSuiteFunction, BranchDistanceSuiteFunction, Chromosome, CoverageRef,
        FitnessRef, LineCoverageSuiteFunction, TestSuiteChromosome,
    },
    schema::{SearchAlgorithm, SearchConfig, SearchProgress},
    search::SearchEngine,
    toy::{ToyExecutor, ToyFactory, ToySubject},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).is_some_and(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: {} [config.json]", args[0]);
        eprintln!();
        eprintln!("Generate tests for the built-in toy subject.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to search configuration file (default: built-in)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        return;
    }

    if args.get(1).is_some_and(|a| a == "--example") {
        print_example_config();
        return;
    }

    // Load configuration
    let config = match args.get(1) {
        Some(path) => SearchConfig::load(PathBuf::from(path)).unwrap_or_else(|e| {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }),
        None => SearchConfig::default(),
    };

    let subject = Arc::new(ToySubject::new());
    let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
    let executor = Arc::new(ToyExecutor::new(subject.clone()));

    println!("Covolve Test Generation");
    println!("=======================");
    match &config.algorithm {
        SearchAlgorithm::Mio(_) => println!("Algorithm: MIO"),
        SearchAlgorithm::Mosa(mosa) => {
            println!("Algorithm: MOSA (population {})", mosa.population_size)
        }
    }
    println!("Goals: {}", subject.goals().len());
    if let Some(seed) = config.random_seed {
        println!("Seed: {}", seed);
    }
    println!();

    let branch_distance: FitnessRef<TestSuiteChromosome> =
        Arc::new(BranchDistanceSuiteFunction::new(subject.predicates()));
    let suite_fitness = vec![branch_distance];
    let branch_coverage: CoverageRef<TestSuiteChromosome> =
        Arc::new(BranchCoverageSuiteFunction::new(subject.predicates()));
    let line_coverage: CoverageRef<TestSuiteChromosome> =
        Arc::new(LineCoverageSuiteFunction::new(subject.lines()));
    let suite_coverage = vec![branch_coverage.clone(), line_coverage.clone()];

    let mut engine = SearchEngine::new(config, factory, executor, subject.goals())
        .unwrap_or_else(|e| {
            eprintln!("Error creating search: {}", e);
            std::process::exit(1);
        })
        .with_suite_functions(suite_fitness, suite_coverage)
        .with_progress_callback(Box::new(|progress: &SearchProgress| {
            if progress.iteration % 10 == 0 {
                println!(
                    "  Iteration {}: {}/{} goals, {} evaluations, fitness {:.3}",
                    progress.iteration,
                    progress.covered_goals,
                    progress.total_goals,
                    progress.evaluations,
                    progress.total_fitness
                );
            }
        }));

    println!("Running search...");
    let result = engine.run();

    let stats = &result.stats;
    println!();
    println!("Finished: {:?}", stats.stop_reason);
    println!("  Iterations: {}", stats.iterations);
    println!(
        "  Evaluations: {} ({:.1}/s)",
        stats.evaluations, stats.evaluations_per_second
    );
    println!("  Goals covered: {}/{}", stats.covered_goals, stats.total_goals);
    println!(
        "  Suite: {} tests, {} statements",
        stats.suite_size, stats.suite_length
    );
    println!(
        "  Branch coverage: {:.1}%",
        result.suite.get_coverage_for(&branch_coverage) * 100.0
    );
    println!(
        "  Line coverage: {:.1}%",
        result.suite.get_coverage_for(&line_coverage) * 100.0
    );
    println!("  Time: {:.2}s", stats.elapsed_seconds);
}

fn print_example_config() {
    let config = SearchConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("Example configuration (config.json):");
            println!("{}", json);
        }
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}
