//! Solver configuration.
//!
//! Sections map onto the dotted option names used by experiment files:
//! `[dcop] iterations = 100` is `dcop.iterations`, `[dsa] probability` is
//! `dsa.probability`, and so on. Every field has a default, so a partial
//! file (or none at all) yields a runnable configuration.

use crate::agent::SolverKind;
use crate::error::ConfigError;
use crate::utility::UtilityFunctionKind;
use serde::Deserialize;
use std::path::Path;

/// Complete solver configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub dcop: DcopConfig,
    #[serde(default)]
    pub dsa: DsaConfig,
    #[serde(default)]
    pub maxsum: MaxSumConfig,
    #[serde(default)]
    pub problem: ProblemConfig,
}

/// Round controller settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DcopConfig {
    /// Which agent strategy to instantiate.
    #[serde(default)]
    pub algorithm: SolverKind,
    /// Maximum number of rounds per timestep.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Report the best assignment seen in any round instead of the last one.
    #[serde(default = "default_anytime")]
    pub anytime: bool,
    /// Run the sequential greedy repair pass after the rounds.
    #[serde(default = "default_greedy_correction")]
    pub greedy_correction: bool,
    /// Wall-clock budget per timestep, polled once per completed round.
    /// Zero disables the budget.
    #[serde(default)]
    pub time_budget_ms: u64,
    /// Base seed for every agent's random generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_iterations() -> u32 {
    100
}

fn default_anytime() -> bool {
    true
}

fn default_greedy_correction() -> bool {
    true
}

fn default_seed() -> u64 {
    0x5eed
}

impl Default for DcopConfig {
    fn default() -> Self {
        Self {
            algorithm: SolverKind::default(),
            iterations: default_iterations(),
            anytime: default_anytime(),
            greedy_correction: default_greedy_correction(),
            time_budget_ms: 0,
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DsaConfig {
    /// Probability of switching to a strictly better target (0..=1).
    #[serde(default = "default_dsa_probability")]
    pub probability: f64,
}

fn default_dsa_probability() -> f64 {
    0.6
}

impl Default for DsaConfig {
    fn default() -> Self {
        Self {
            probability: default_dsa_probability(),
        }
    }
}

/// Binary max-sum settings.
///
/// `neighbors` bounds the degree of every node of the factor graph. It is
/// the dominant cost driver of the whole solver: each cardinality factor
/// sends `neighbors` messages per round and each of them scans the other
/// linked agents, so keep it small (3 or 4 in typical experiments).
#[derive(Debug, Clone, Deserialize)]
pub struct MaxSumConfig {
    #[serde(default = "default_maxsum_neighbors")]
    pub neighbors: usize,
    /// Messages that move less than this are considered converged.
    #[serde(default = "default_maxsum_epsilon")]
    pub epsilon: f64,
    /// Weight of the previous message when smoothing (0 = no damping).
    #[serde(default)]
    pub damping: f64,
    /// Cap on evictions while building the factor graph.
    #[serde(default = "default_max_rehome_attempts")]
    pub max_rehome_attempts: usize,
}

fn default_maxsum_neighbors() -> usize {
    4
}

fn default_maxsum_epsilon() -> f64 {
    1e-5
}

fn default_max_rehome_attempts() -> usize {
    10_000
}

impl Default for MaxSumConfig {
    fn default() -> Self {
        Self {
            neighbors: default_maxsum_neighbors(),
            epsilon: default_maxsum_epsilon(),
            damping: 0.0,
            max_rehome_attempts: default_max_rehome_attempts(),
        }
    }
}

/// Utility matrix construction settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemConfig {
    #[serde(default)]
    pub utility_function: UtilityFunctionKind,
    /// Over-assignment penalty coefficient.
    #[serde(default = "default_k")]
    pub k: f64,
    /// Over-assignment penalty exponent.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Multiplier applied to the utility of an agent's previous target.
    /// 1.0 disables hysteresis.
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    /// Cost of heading to a fire whose route is blocked by an unattended
    /// blockade.
    #[serde(default = "default_blocked_fire_penalty")]
    pub blocked_fire_penalty: f64,
    /// Bake `blocked_fire_penalty` into the matrix for solvers without
    /// team coordination.
    #[serde(default = "default_blockade_adjustment")]
    pub blockade_adjustment: bool,
    /// Targets farther than this are not candidates. `None` means unbounded.
    #[serde(default)]
    pub max_distance: Option<f64>,
    /// Fire volume a single brigade can handle, used for required counts.
    #[serde(default = "default_agent_power")]
    pub agent_power: f64,
    /// Distance at which the distance term halves.
    #[serde(default = "default_distance_unit")]
    pub distance_unit: f64,
}

fn default_k() -> f64 {
    2.0
}

fn default_alpha() -> f64 {
    2.0
}

fn default_hysteresis() -> f64 {
    1.2
}

fn default_blocked_fire_penalty() -> f64 {
    100.0
}

fn default_blockade_adjustment() -> bool {
    true
}

fn default_agent_power() -> f64 {
    1000.0
}

fn default_distance_unit() -> f64 {
    1000.0
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            utility_function: UtilityFunctionKind::default(),
            k: default_k(),
            alpha: default_alpha(),
            hysteresis: default_hysteresis(),
            blocked_fire_penalty: default_blocked_fire_penalty(),
            blockade_adjustment: default_blockade_adjustment(),
            max_distance: None,
            agent_power: default_agent_power(),
            distance_unit: default_distance_unit(),
        }
    }
}

impl SolverConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: SolverConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the solver cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> ConfigError {
            ConfigError::InvalidValue {
                field,
                value: value.to_string(),
                reason,
            }
        }

        if !(0.0..=1.0).contains(&self.dsa.probability) {
            return Err(invalid("dsa.probability", self.dsa.probability, "must be within 0..=1"));
        }
        if self.maxsum.neighbors == 0 {
            return Err(invalid("maxsum.neighbors", 0, "must be at least 1"));
        }
        if !(self.maxsum.epsilon >= 0.0) {
            return Err(invalid("maxsum.epsilon", self.maxsum.epsilon, "must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.maxsum.damping) {
            return Err(invalid("maxsum.damping", self.maxsum.damping, "must be within 0..1"));
        }
        if !(self.problem.k >= 0.0) {
            return Err(invalid("problem.k", self.problem.k, "must be non-negative"));
        }
        if !(self.problem.alpha >= 0.0) {
            return Err(invalid("problem.alpha", self.problem.alpha, "must be non-negative"));
        }
        if !(self.problem.hysteresis > 0.0) {
            return Err(invalid("problem.hysteresis", self.problem.hysteresis, "must be positive"));
        }
        if !(self.problem.agent_power > 0.0) {
            return Err(invalid("problem.agent_power", self.problem.agent_power, "must be positive"));
        }
        if !(self.problem.distance_unit > 0.0) {
            return Err(invalid(
                "problem.distance_unit",
                self.problem.distance_unit,
                "must be positive",
            ));
        }
        if let Some(max) = self.problem.max_distance {
            if !(max >= 0.0) {
                return Err(invalid("problem.max_distance", max, "must be non-negative"));
            }
        }
        Ok(())
    }
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<SolverConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    SolverConfig::from_toml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolverConfig::default();
        assert_eq!(config.dcop.algorithm, SolverKind::Dsa);
        assert_eq!(config.dcop.iterations, 100);
        assert!(config.dcop.anytime);
        assert!(config.dcop.greedy_correction);
        assert_eq!(config.dsa.probability, 0.6);
        assert_eq!(config.maxsum.neighbors, 4);
        assert_eq!(config.problem.k, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [dcop]
            algorithm = "max_sum"
            iterations = 25
            anytime = false
            greedy_correction = false
            time_budget_ms = 500

            [dsa]
            probability = 0.3

            [maxsum]
            neighbors = 3

            [problem]
            utility_function = "distance"
            k = 5.0
            alpha = 1.5
            hysteresis = 1.0
            max_distance = 2500.0
        "#;

        let config = SolverConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.dcop.algorithm, SolverKind::MaxSum);
        assert_eq!(config.dcop.iterations, 25);
        assert!(!config.dcop.anytime);
        assert!(!config.dcop.greedy_correction);
        assert_eq!(config.dcop.time_budget_ms, 500);
        assert_eq!(config.dsa.probability, 0.3);
        assert_eq!(config.maxsum.neighbors, 3);
        assert_eq!(config.problem.utility_function, UtilityFunctionKind::Distance);
        assert_eq!(config.problem.alpha, 1.5);
        assert_eq!(config.problem.max_distance, Some(2500.0));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [dsa]
            probability = 0.9
        "#;

        let config = SolverConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.dsa.probability, 0.9);
        assert_eq!(config.dcop.iterations, 100); // Default
        assert_eq!(config.maxsum.neighbors, 4); // Default
    }

    #[test]
    fn test_rejects_out_of_range_probability() {
        let err = SolverConfig::from_toml_str("[dsa]\nprobability = 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "dsa.probability",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_degree_bound() {
        let err = SolverConfig::from_toml_str("[maxsum]\nneighbors = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "maxsum.neighbors",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_solver_is_a_parse_error() {
        let err = SolverConfig::from_toml_str("[dcop]\nalgorithm = \"simplex\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
