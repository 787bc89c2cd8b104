//! Round-based DCOP solvers for assigning fire brigades to fires and police
//! forces to blockades.
//!
//! - `problem` turns a [`WorldSnapshot`] into per-role utility matrices.
//! - `agent` holds the strategies (greedy, random, DSA, binary max-sum and
//!   the fire/police team variant) behind one [`DcopAgent`] trait.
//! - `solver` runs synchronous send/receive/improve rounds through an
//!   in-memory mailbox and picks the assignment to report.
//!
//! Everything here is synchronous and single-threaded; a solve owns all of
//! its state and shares nothing with the next timestep except the
//! assignment it returns.

pub mod agent;
pub mod assignment;
pub mod comm;
pub mod config;
pub mod error;
pub mod factor_graph;
pub mod ids;
pub mod message;
pub mod problem;
pub mod repair;
pub mod scoring;
pub mod solver;
pub mod stats;
pub mod utility;
pub mod world;

pub use agent::{AgentContext, DcopAgent, SolverKind};
pub use assignment::Assignment;
pub use config::{load_config, SolverConfig};
pub use error::{ConfigError, DcopError, Result};
pub use ids::{EntityId, Role};
pub use problem::{PenaltyParams, ProblemDefinition, UtilityMatrix};
pub use solver::{DcopSolver, OutputPolicy};
pub use stats::{RoundTrace, SolveOutcome, SolveStats};
pub use world::{AgentState, BlockadeState, BlockedRoute, FireState, Location, WorldSnapshot};
