//! Agent strategies.
//!
//! Every strategy implements [`DcopAgent`]: a local view of the problem,
//! messages in and out once per round, and a local improvement step. The
//! round controller only talks to agents through this trait.

mod dsa;
mod greedy;
mod max_sum;
mod random;
mod team;

pub use dsa::DsaAgent;
pub use greedy::GreedyAgent;
pub use max_sum::MaxSumAgent;
pub use random::RandomAgent;
pub use team::TeamAgent;

use crate::comm::{Outbox, Payload};
use crate::config::SolverConfig;
use crate::error::{ConfigError, Result};
use crate::factor_graph::MaxSumSession;
use crate::ids::EntityId;
use crate::problem::ProblemDefinition;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Shared, read-only state every agent of one solve is initialised with.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub problem: Arc<ProblemDefinition>,
    pub config: Arc<SolverConfig>,
    /// Present only for max-sum solves.
    pub session: Option<Arc<MaxSumSession>>,
}

impl AgentContext {
    pub fn new(problem: Arc<ProblemDefinition>, config: Arc<SolverConfig>) -> Self {
        Self {
            problem,
            config,
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<MaxSumSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Per-agent generator, reproducible from `dcop.seed`.
    pub(crate) fn rng_for(&self, agent: EntityId) -> StdRng {
        let salt = u64::from(agent.raw()).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.config.dcop.seed ^ salt)
    }
}

/// Contract between the round controller and an agent strategy.
pub trait DcopAgent: Sized {
    /// The only message kind this strategy sends and receives.
    type Message: Payload;

    /// One-time setup for a solve: pick a default target, learn neighbours.
    fn initialize(context: &AgentContext, id: EntityId) -> Result<Self>;

    fn id(&self) -> EntityId;

    /// Called once per round, before any agent receives anything.
    fn send_messages(&mut self, outbox: &mut Outbox<Self::Message>);

    /// Buffers this round's messages for the next improvement step.
    fn receive_messages(&mut self, messages: Vec<Self::Message>);

    /// Consumes buffered messages and updates the target. Returns `true`
    /// while this agent still sees room for improvement.
    fn improve_assignment(&mut self) -> Result<bool>;

    fn target(&self) -> Option<EntityId>;

    /// Score evaluations performed during the last round.
    fn constraint_checks(&self) -> u64;
}

/// Registered solver strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Greedy,
    Random,
    #[default]
    Dsa,
    MaxSum,
    Team,
}

impl SolverKind {
    pub const ALL: [SolverKind; 5] = [
        SolverKind::Greedy,
        SolverKind::Random,
        SolverKind::Dsa,
        SolverKind::MaxSum,
        SolverKind::Team,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SolverKind::Greedy => "greedy",
            SolverKind::Random => "random",
            SolverKind::Dsa => "dsa",
            SolverKind::MaxSum => "max_sum",
            SolverKind::Team => "team",
        }
    }

    /// Whether the objective charges blocked routes against the live police
    /// assignment.
    pub fn team_coordination(self) -> bool {
        matches!(self, SolverKind::Team)
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SolverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SolverKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownSolver(s.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ids::Role;
    use crate::problem::{PenaltyParams, UtilityMatrix};

    pub fn id(raw: u32) -> EntityId {
        EntityId(raw)
    }

    /// Fire-only problem from a row-major utility table.
    pub fn fire_problem(utilities: &[&[f64]], required: &[u32], penalty: PenaltyParams) -> ProblemDefinition {
        let agents: Vec<_> = (0..utilities.len() as u32).map(|a| id(a + 1)).collect();
        let targets: Vec<_> = (0..required.len() as u32).map(|t| id(100 + t)).collect();
        let values = utilities.iter().flat_map(|row| row.iter().copied()).collect();
        let fire = UtilityMatrix::new(Role::Fire, agents, targets, values, required.to_vec()).unwrap();
        let police = UtilityMatrix::new(Role::Police, vec![], vec![], vec![], vec![]).unwrap();
        ProblemDefinition::new(fire, police, penalty).unwrap()
    }

    pub fn context(problem: ProblemDefinition, config: SolverConfig) -> AgentContext {
        AgentContext::new(Arc::new(problem), Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_kind_round_trips_through_names() {
        for kind in SolverKind::ALL {
            assert_eq!(kind.name().parse::<SolverKind>().unwrap(), kind);
        }
        assert!(matches!(
            "simplex".parse::<SolverKind>(),
            Err(ConfigError::UnknownSolver(_))
        ));
    }

    #[test]
    fn test_only_team_solver_coordinates() {
        assert!(SolverKind::Team.team_coordination());
        assert!(!SolverKind::Dsa.team_coordination());
    }
}
