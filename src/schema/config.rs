//! Configuration types for a test generation run.
//!
//! The configuration is an immutable snapshot: it is validated once when the
//! engine is built and then shared read-only by every operator.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search algorithm to use.
    #[serde(default)]
    pub algorithm: SearchAlgorithm,
    /// Resource limits; the search stops when any of them is reached.
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Test case and suite level operator settings.
    #[serde(default)]
    pub test_case: TestCaseConfig,
    /// Statement level operator settings.
    #[serde(default)]
    pub statement: StatementConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: SearchAlgorithm::default(),
            budget: BudgetConfig::default(),
            test_case: TestCaseConfig::default(),
            statement: StatementConfig::default(),
            random_seed: None,
        }
    }
}

/// Search algorithm selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SearchAlgorithm {
    /// Archive-only incremental search with an annealed parameter schedule.
    Mio(MioConfig),
    /// Population-based many-objective search.
    Mosa(MosaConfig),
}

impl Default for SearchAlgorithm {
    fn default() -> Self {
        Self::Mosa(MosaConfig::default())
    }
}

/// Resource limits of a run. At least one must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum number of iterations (MIO steps or MOSA generations).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: Option<usize>,
    /// Maximum number of test case executions.
    #[serde(default)]
    pub max_evaluations: Option<u64>,
    /// Wall-clock limit in seconds.
    #[serde(default)]
    pub max_search_time_secs: Option<f64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_evaluations: None,
            max_search_time_secs: None,
        }
    }
}

fn default_max_iterations() -> Option<usize> {
    Some(100)
}

/// Test case and suite operator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseConfig {
    /// Upper bound for the length of randomly generated test cases.
    #[serde(default = "default_chromosome_length")]
    pub chromosome_length: usize,
    /// Hard ceiling on test case length; crossover over it is rejected.
    #[serde(default = "default_max_length_test_case")]
    pub max_length_test_case: usize,
    /// Maximum number of test cases in a suite.
    #[serde(default = "default_max_suite_size")]
    pub max_suite_size: usize,
    /// Probability of attempting statement deletion during mutation.
    #[serde(default = "default_third")]
    pub test_delete_probability: f64,
    /// Probability of attempting statement change during mutation.
    #[serde(default = "default_third")]
    pub test_change_probability: f64,
    /// Probability of attempting statement insertion during mutation.
    #[serde(default = "default_third")]
    pub test_insert_probability: f64,
    /// Base of the decaying probability for inserting further statements.
    #[serde(default = "default_statement_insertion_probability")]
    pub statement_insertion_probability: f64,
    /// Base of the decaying probability for adding new tests to a suite,
    /// and share of fresh tests bred per MOSA generation.
    #[serde(default = "default_test_insertion_probability")]
    pub test_insertion_probability: f64,
    /// Attempts made by the factory before giving up on a random test case.
    #[serde(default = "default_max_generation_attempts")]
    pub max_generation_attempts: usize,
}

impl Default for TestCaseConfig {
    fn default() -> Self {
        Self {
            chromosome_length: default_chromosome_length(),
            max_length_test_case: default_max_length_test_case(),
            max_suite_size: default_max_suite_size(),
            test_delete_probability: default_third(),
            test_change_probability: default_third(),
            test_insert_probability: default_third(),
            statement_insertion_probability: default_statement_insertion_probability(),
            test_insertion_probability: default_test_insertion_probability(),
            max_generation_attempts: default_max_generation_attempts(),
        }
    }
}

fn default_chromosome_length() -> usize {
    40
}
fn default_max_length_test_case() -> usize {
    2500
}
fn default_max_suite_size() -> usize {
    100
}
fn default_third() -> f64 {
    1.0 / 3.0
}
fn default_statement_insertion_probability() -> f64 {
    0.5
}
fn default_test_insertion_probability() -> f64 {
    0.1
}
fn default_max_generation_attempts() -> usize {
    100
}

/// Statement operator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementConfig {
    /// Probability of re-randomising a primitive instead of applying a delta.
    #[serde(default = "default_random_perturbation")]
    pub random_perturbation: f64,
    /// Scale of numeric deltas.
    #[serde(default = "default_max_delta")]
    pub max_delta: i64,
    /// Scale of random integers and floats.
    #[serde(default = "default_max_int")]
    pub max_int: i64,
    /// Maximum length of random and mutated strings.
    #[serde(default = "default_string_length")]
    pub string_length: usize,
    /// Maximum length of random and mutated byte strings.
    #[serde(default = "default_bytes_length")]
    pub bytes_length: usize,
    /// Maximum number of elements of a freshly generated collection.
    #[serde(default = "default_collection_size")]
    pub collection_size: usize,
    /// Probability of mutating the parameters of a call or field access.
    #[serde(default = "default_change_parameter_probability")]
    pub change_parameter_probability: f64,
    /// Probability of leaving (or making) an optional parameter unset.
    #[serde(default = "default_skip_optional_parameter_probability")]
    pub skip_optional_parameter_probability: f64,
    /// Probability of reusing an existing object for a parameter.
    #[serde(default = "default_object_reuse_probability")]
    pub object_reuse_probability: f64,
    /// Probability of passing `None` for a parameter of class type.
    #[serde(default = "default_none_probability")]
    pub none_probability: f64,
    /// Bound on "mutate until the value differs" retries.
    #[serde(default = "default_max_primitive_mutation_attempts")]
    pub max_primitive_mutation_attempts: usize,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            random_perturbation: default_random_perturbation(),
            max_delta: default_max_delta(),
            max_int: default_max_int(),
            string_length: default_string_length(),
            bytes_length: default_bytes_length(),
            collection_size: default_collection_size(),
            change_parameter_probability: default_change_parameter_probability(),
            skip_optional_parameter_probability: default_skip_optional_parameter_probability(),
            object_reuse_probability: default_object_reuse_probability(),
            none_probability: default_none_probability(),
            max_primitive_mutation_attempts: default_max_primitive_mutation_attempts(),
        }
    }
}

fn default_random_perturbation() -> f64 {
    0.2
}
fn default_max_delta() -> i64 {
    20
}
fn default_max_int() -> i64 {
    2048
}
fn default_string_length() -> usize {
    20
}
fn default_bytes_length() -> usize {
    20
}
fn default_collection_size() -> usize {
    5
}
fn default_change_parameter_probability() -> f64 {
    0.1
}
fn default_skip_optional_parameter_probability() -> f64 {
    0.7
}
fn default_object_reuse_probability() -> f64 {
    0.9
}
fn default_none_probability() -> f64 {
    0.1
}
fn default_max_primitive_mutation_attempts() -> usize {
    100
}

/// MIO configuration: initial and focused parameter sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MioConfig {
    /// Parameters at the start of the search.
    #[serde(default = "MioParameters::initial")]
    pub initial: MioParameters,
    /// Parameters once the focused (exploitation) phase is reached.
    #[serde(default = "MioParameters::focused")]
    pub focused: MioParameters,
    /// Fraction of the budget after which the focused parameters apply.
    #[serde(default = "default_exploitation_starts_at_percent")]
    pub exploitation_starts_at_percent: f64,
}

impl Default for MioConfig {
    fn default() -> Self {
        Self {
            initial: MioParameters::initial(),
            focused: MioParameters::focused(),
            exploitation_starts_at_percent: default_exploitation_starts_at_percent(),
        }
    }
}

fn default_exploitation_starts_at_percent() -> f64 {
    0.5
}

/// One end of the MIO parameter schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MioParameters {
    /// Capacity of each target slot of the archive.
    pub number_of_tests_per_target: usize,
    /// Probability of sampling a fresh random test instead of an archived one.
    pub random_test_or_from_archive_probability: f64,
    /// Mutations applied to a sampled test before sampling again.
    pub number_of_mutations: usize,
}

impl MioParameters {
    pub fn initial() -> Self {
        Self {
            number_of_tests_per_target: 10,
            random_test_or_from_archive_probability: 0.5,
            number_of_mutations: 1,
        }
    }

    pub fn focused() -> Self {
        Self {
            number_of_tests_per_target: 1,
            random_test_or_from_archive_probability: 0.0,
            number_of_mutations: 10,
        }
    }
}

/// MOSA configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosaConfig {
    /// Number of test cases kept per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Crossover probability (0.0-1.0).
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Mutation passes applied to each offspring.
    #[serde(default = "default_number_of_mutations")]
    pub number_of_mutations: usize,
    /// Parent selection.
    #[serde(default)]
    pub selection: SelectionMethod,
}

impl Default for MosaConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            crossover_rate: default_crossover_rate(),
            number_of_mutations: default_number_of_mutations(),
            selection: SelectionMethod::default(),
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_crossover_rate() -> f64 {
    0.75
}
fn default_number_of_mutations() -> usize {
    1
}

/// Parent selection over a ranked population.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum SelectionMethod {
    /// Best of `size` uniformly drawn members.
    Tournament {
        #[serde(default = "default_tournament_size")]
        size: usize,
    },
    /// Linear ranking with the given bias (1.0 < bias <= 2.0).
    RankBased {
        #[serde(default = "default_rank_bias")]
        bias: f64,
    },
}

impl Default for SelectionMethod {
    fn default() -> Self {
        Self::Tournament {
            size: default_tournament_size(),
        }
    }
}

fn default_tournament_size() -> usize {
    5
}
fn default_rank_bias() -> f64 {
    1.7
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Probability {name} must be within [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("{0} must be at least 1")]
    ZeroSize(&'static str),
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Exploitation threshold must be within (0, 1], got {0}")]
    InvalidExploitationThreshold(f64),
    #[error("Rank bias must be within (1, 2], got {0}")]
    InvalidRankBias(f64),
    #[error("{name} must not be negative, got {value}")]
    NegativeBound { name: &'static str, value: i64 },
    #[error("At least one budget limit must be set")]
    UnboundedBudget,
    #[error("Chromosome length {chromosome_length} exceeds maximum test case length {max_length}")]
    InvalidLength {
        chromosome_length: usize,
        max_length: usize,
    },
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

fn check_bound(name: &'static str, value: i64) -> Result<(), ConfigError> {
    if value < 0 {
        Err(ConfigError::NegativeBound { name, value })
    } else {
        Ok(())
    }
}

fn check_size(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroSize(name))
    } else {
        Ok(())
    }
}

impl SearchConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: SearchConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let budget = &self.budget;
        if budget.max_iterations.is_none()
            && budget.max_evaluations.is_none()
            && budget.max_search_time_secs.is_none()
        {
            return Err(ConfigError::UnboundedBudget);
        }

        let tc = &self.test_case;
        check_size("chromosome_length", tc.chromosome_length)?;
        check_size("max_suite_size", tc.max_suite_size)?;
        check_size("max_generation_attempts", tc.max_generation_attempts)?;
        if tc.chromosome_length > tc.max_length_test_case {
            return Err(ConfigError::InvalidLength {
                chromosome_length: tc.chromosome_length,
                max_length: tc.max_length_test_case,
            });
        }
        check_probability("test_delete_probability", tc.test_delete_probability)?;
        check_probability("test_change_probability", tc.test_change_probability)?;
        check_probability("test_insert_probability", tc.test_insert_probability)?;
        check_probability(
            "statement_insertion_probability",
            tc.statement_insertion_probability,
        )?;
        check_probability("test_insertion_probability", tc.test_insertion_probability)?;

        let st = &self.statement;
        check_bound("max_int", st.max_int)?;
        check_bound("max_delta", st.max_delta)?;
        check_probability("random_perturbation", st.random_perturbation)?;
        check_probability(
            "change_parameter_probability",
            st.change_parameter_probability,
        )?;
        check_probability(
            "skip_optional_parameter_probability",
            st.skip_optional_parameter_probability,
        )?;
        check_probability("object_reuse_probability", st.object_reuse_probability)?;
        check_probability("none_probability", st.none_probability)?;
        check_size(
            "max_primitive_mutation_attempts",
            st.max_primitive_mutation_attempts,
        )?;

        match &self.algorithm {
            SearchAlgorithm::Mio(mio) => mio.validate()?,
            SearchAlgorithm::Mosa(mosa) => mosa.validate()?,
        }
        Ok(())
    }
}

impl MioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let t = self.exploitation_starts_at_percent;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigError::InvalidExploitationThreshold(t));
        }
        for params in [&self.initial, &self.focused] {
            check_size("number_of_tests_per_target", params.number_of_tests_per_target)?;
            check_size("number_of_mutations", params.number_of_mutations)?;
            check_probability(
                "random_test_or_from_archive_probability",
                params.random_test_or_from_archive_probability,
            )?;
        }
        Ok(())
    }
}

impl MosaConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        check_probability("crossover_rate", self.crossover_rate)?;
        check_size("number_of_mutations", self.number_of_mutations)?;
        match self.selection {
            SelectionMethod::Tournament { size } => check_size("tournament size", size)?,
            SelectionMethod::RankBased { bias } => {
                if !(bias > 1.0 && bias <= 2.0) {
                    return Err(ConfigError::InvalidRankBias(bias));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SearchConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = SearchConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.test_case.chromosome_length,
            config.test_case.chromosome_length
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "algorithm": { "type": "Mio", "exploitation_starts_at_percent": 0.4 },
            "random_seed": 42
        }"#;
        let config: SearchConfig = serde_json::from_str(json).unwrap();
        match &config.algorithm {
            SearchAlgorithm::Mio(mio) => {
                assert_eq!(mio.exploitation_starts_at_percent, 0.4);
                assert_eq!(mio.initial, MioParameters::initial());
                assert_eq!(mio.focused.number_of_tests_per_target, 1);
            }
            other => panic!("unexpected algorithm {:?}", other),
        }
        assert_eq!(config.budget.max_iterations, Some(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let mut config = SearchConfig::default();
        config.statement.random_perturbation = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProbability {
                name: "random_perturbation",
                ..
            })
        ));
    }

    #[test]
    fn test_negative_integer_bounds_rejected() {
        let mut config = SearchConfig::default();
        config.statement.max_int = -1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeBound {
                name: "max_int",
                value: -1
            })
        ));

        let mut config = SearchConfig::default();
        config.statement.max_delta = -5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NegativeBound {
                name: "max_delta",
                ..
            })
        ));

        config.statement.max_delta = 0;
        config.statement.max_int = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unbounded_budget_rejected() {
        let mut config = SearchConfig::default();
        config.budget.max_iterations = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnboundedBudget)
        ));
    }

    #[test]
    fn test_mio_capacity_must_be_positive() {
        let mut mio = MioConfig::default();
        mio.focused.number_of_tests_per_target = 0;
        let config = SearchConfig {
            algorithm: SearchAlgorithm::Mio(mio),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSize(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");

        let config = SearchConfig {
            random_seed: Some(7),
            algorithm: SearchAlgorithm::Mosa(MosaConfig {
                population_size: 12,
                selection: SelectionMethod::RankBased { bias: 1.5 },
                ..Default::default()
            }),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = SearchConfig::load(&path).unwrap();
        assert_eq!(loaded.random_seed, Some(7));
        match loaded.algorithm {
            SearchAlgorithm::Mosa(mosa) => {
                assert_eq!(mosa.population_size, 12);
                assert!(matches!(mosa.selection, SelectionMethod::RankBased { .. }));
            }
            other => panic!("unexpected algorithm {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SearchConfig::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
