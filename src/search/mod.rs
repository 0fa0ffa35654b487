//! Search algorithms driving test generation.
//!
//! # Overview
//!
//! [`SearchEngine`] owns the archive, the random provider and the budget,
//! and delegates each step to one of two strategies:
//!
//! - **MIO**: keeps a single current solution, mutates it a bounded number
//!   of times, then resamples from scratch or from the archive. Archive
//!   capacity and resampling probability anneal as the budget is consumed.
//! - **MOSA**: a fixed-size population bred by selection, crossover and
//!   mutation, ranked over the uncovered goals each generation.
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
//! let result = engine.run_with_callback(|progress| {
//!     println!("{} / {} goals", progress.covered_goals, progress.total_goals);
//! });
//! println!("{} tests", result.suite.test_chromosomes().len());
//! ```

mod archive;
mod budget;
mod crossover;
mod engine;
mod mio;
mod mosa;
mod ranking;
mod rng;
mod selection;

pub use archive::{MioArchive, MioSchedule};
pub use budget::Budget;
pub use crossover::single_point_relative_crossover;
pub use engine::{ProgressCallback, SearchEngine, SearchResult};
pub use ranking::{
    compute_ranking_assignment, crowded_order, dominates, fast_epsilon_dominance_assignment,
    select_survivors, sort_by_distance,
};
pub use rng::SearchRng;
pub use selection::select;

use crate::schema::ConfigError;

/// Errors raised when building a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("No goals to search for")]
    NoGoals,
}
