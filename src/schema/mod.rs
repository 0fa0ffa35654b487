//! Schema module - Configuration and progress types for test generation runs.

mod config;
mod search;

pub use config::*;
pub use search::*;
