use super::{AgentContext, DcopAgent};
use crate::comm::Outbox;
use crate::error::Result;
use crate::ids::EntityId;
use crate::message::AssignmentMessage;
use crate::problem::ProblemDefinition;
use crate::scoring::{best_response, scoring_for, ScoringContext, TargetScores, TeamView};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;

/// Distributed Stochastic Search.
///
/// Each round the agent rebuilds the occupancy of every target from its
/// neighbours' announced picks, finds its best-scoring candidate and, if that
/// differs from the current target, switches with probability
/// `dsa.probability`. Staying unassigned counts as an option worth 0, so an
/// agent on a target where it only adds penalty can step back.
///
/// `improve_assignment` reports `true` whenever a strictly better target
/// exists, even when the coin flip kept the agent where it was. This keeps
/// the round loop alive so neighbours get to react, at the price of runs
/// that can last the full round budget with nobody moving.
#[derive(Debug)]
pub struct DsaAgent {
    id: EntityId,
    problem: Arc<ProblemDefinition>,
    candidates: Vec<EntityId>,
    neighbors: Vec<EntityId>,
    target: Option<EntityId>,
    probability: f64,
    rng: StdRng,
    scores: TargetScores,
    inbox: Vec<AssignmentMessage>,
    checks: u64,
}

impl DsaAgent {
    pub fn neighbors(&self) -> &[EntityId] {
        &self.neighbors
    }

    pub(crate) fn announcement(&self) -> AssignmentMessage {
        AssignmentMessage {
            agent: self.id,
            target: self.target,
        }
    }

    /// Replays the buffered picks into fresh target counts, one check each.
    fn register_picks(&mut self) {
        self.scores.reset();
        for pick in self.inbox.drain(..) {
            if pick.agent == self.id {
                continue;
            }
            if let Some(target) = pick.target {
                self.scores.increase(target);
            }
            self.checks += 1;
        }
    }

    /// One DSA decision. `team` carries the other role's picks for the
    /// team-aware variant.
    pub(crate) fn decide(&mut self, team: Option<&TeamView>) -> Result<bool> {
        self.checks = 0;
        self.register_picks();

        let context = ScoringContext {
            problem: &self.problem,
            scores: &self.scores,
            team,
        };
        let scoring = scoring_for(&self.problem);
        let response =
            best_response(scoring, self.id, self.target, &self.candidates, &context, true)?;
        self.checks += response.checks;

        let improvable = response.improves(self.target);
        if improvable && self.rng.gen_bool(self.probability) {
            tracing::trace!(
                agent = %self.id,
                from = ?self.target,
                to = ?response.target,
                score = response.score,
                "DSA switch"
            );
            self.target = response.target;
        }
        Ok(improvable)
    }
}

impl DcopAgent for DsaAgent {
    type Message = AssignmentMessage;

    fn initialize(context: &AgentContext, id: EntityId) -> Result<Self> {
        let problem = Arc::clone(&context.problem);
        let matrix = problem.matrix(problem.agent_role(id)?);
        let candidates = matrix.candidates(id)?.to_vec();
        let neighbors = matrix.agent_neighbors(id)?;
        let target = matrix.best_target(id)?;
        if target.is_none() {
            tracing::warn!(agent = %id, "No reachable targets; agent stays unassigned");
        }
        Ok(Self {
            id,
            problem,
            candidates,
            neighbors,
            target,
            probability: context.config.dsa.probability,
            rng: context.rng_for(id),
            scores: TargetScores::new(),
            inbox: Vec::new(),
            checks: 0,
        })
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn send_messages(&mut self, outbox: &mut Outbox<AssignmentMessage>) {
        let pick = self.announcement();
        for neighbor in &self.neighbors {
            outbox.send(*neighbor, pick);
        }
    }

    fn receive_messages(&mut self, messages: Vec<AssignmentMessage>) {
        self.inbox.extend(messages);
    }

    fn improve_assignment(&mut self) -> Result<bool> {
        self.decide(None)
    }

    fn target(&self) -> Option<EntityId> {
        self.target
    }

    fn constraint_checks(&self) -> u64 {
        self.checks
    }
}
