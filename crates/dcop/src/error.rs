use crate::ids::{EntityId, Role};
use thiserror::Error;

/// Errors raised while building a problem or solving one timestep.
///
/// Every variant is fatal for the timestep that produced it. Recoverable
/// local gaps (an agent with nothing reachable) never surface here; they
/// degrade to an unassigned agent instead.
#[derive(Debug, Error)]
pub enum DcopError {
    #[error("Unknown agent {agent}: not part of any utility matrix")]
    UnknownAgent { agent: EntityId },

    #[error("Unknown target {target}: not part of any utility matrix")]
    UnknownTarget { target: EntityId },

    #[error("Entity {id} is not indexed by the {role} utility matrix")]
    NotInMatrix { role: Role, id: EntityId },

    #[error("Entity {id} appears more than once in the world snapshot")]
    DuplicateEntity { id: EntityId },

    #[error("Utility matrix for {role} agents is malformed: {reason}")]
    MalformedMatrix { role: Role, reason: String },

    #[error("Agent {agent} has no location in the world snapshot")]
    MissingLocation { agent: EntityId },

    #[error("Solver {solver} does not support {role} agents: {reason}")]
    UnsupportedRole {
        solver: String,
        role: Role,
        reason: String,
    },

    #[error("Non-finite value {value} at {location}")]
    NumericalAnomaly { location: String, value: f64 },

    #[error("Greedy repair lowered total utility from {before} to {after}")]
    RepairRegression { before: f64, after: f64 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Unknown solver '{0}' (expected one of: greedy, random, dsa, max_sum, team)")]
    UnknownSolver(String),

    #[error("Unknown utility function '{0}' (expected distance or severity_distance)")]
    UnknownUtilityFunction(String),
}

pub type Result<T> = std::result::Result<T, DcopError>;

/// Rejects NaN and infinities, naming where the value came from.
pub(crate) fn ensure_finite(value: f64, location: impl FnOnce() -> String) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DcopError::NumericalAnomaly {
            location: location(),
            value,
        })
    }
}
