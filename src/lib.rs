//! Covolve - search-based unit test generation.
//!
//! This crate evolves test cases (sequences of statements calling into a
//! subject) towards coverage goals, using either the Many Independent
//! Objective (MIO) algorithm or the Many-Objective Sorting Algorithm (MOSA).
//!
//! # Architecture
//!
//! - `genome`: statements, the test case arena and mutation operators
//! - `chromosome`: test case and suite chromosomes with fitness caching
//! - `search`: archive, ranking, selection, crossover and the search loops
//! - `schema`: configuration, progress and statistics types
//! - `toy`: a small built-in subject with an interpreter and a factory
//!
//! Analysing and executing a real subject happens outside this crate,
//! behind the [`genome::TestFactory`] and [`chromosome::TestCaseExecutor`]
//! traits.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use covolve::schema::SearchConfig;
//! use covolve::search::SearchEngine;
//! use covolve::toy::{ToyExecutor, ToyFactory, ToySubject};
//!
//! let subject = Arc::new(ToySubject::new());
//! let config = SearchConfig::default();
//! let factory = Arc::new(ToyFactory::new(subject.clone(), config.statement.clone()));
//! let executor = Arc::new(ToyExecutor::new(subject.clone()));
//!
//! let mut engine = SearchEngine::new(config, factory, executor, subject.goals()).unwrap();
//! let result = engine.run();
//! println!(
//!     "Covered {}/{} goals with {} tests",
//!     result.stats.covered_goals, result.stats.total_goals, result.stats.suite_size
//! );
//! ```

pub mod chromosome;
pub mod genome;
pub mod schema;
pub mod search;
pub mod toy;

// Re-export commonly used types
pub use schema::{SearchAlgorithm, SearchConfig};
pub use search::{SearchEngine, SearchResult};
