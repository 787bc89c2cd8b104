use super::{AgentContext, DcopAgent};
use crate::comm::Outbox;
use crate::error::Result;
use crate::ids::EntityId;
use crate::message::AssignmentMessage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Picks uniformly among its candidates every round.
///
/// Never scores anything, so it performs no constraint checks.
#[derive(Debug)]
pub struct RandomAgent {
    id: EntityId,
    candidates: Vec<EntityId>,
    target: Option<EntityId>,
    rng: StdRng,
}

impl RandomAgent {
    fn draw(&mut self) -> Option<EntityId> {
        self.candidates.choose(&mut self.rng).copied()
    }
}

impl DcopAgent for RandomAgent {
    type Message = AssignmentMessage;

    fn initialize(context: &AgentContext, id: EntityId) -> Result<Self> {
        let problem = &context.problem;
        let candidates = problem.matrix(problem.agent_role(id)?).candidates(id)?.to_vec();
        if candidates.is_empty() {
            tracing::warn!(agent = %id, "No reachable targets; agent stays unassigned");
        }
        let mut agent = Self {
            id,
            candidates,
            target: None,
            rng: context.rng_for(id),
        };
        agent.target = agent.draw();
        Ok(agent)
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn send_messages(&mut self, _outbox: &mut Outbox<AssignmentMessage>) {}

    fn receive_messages(&mut self, _messages: Vec<AssignmentMessage>) {}

    fn improve_assignment(&mut self) -> Result<bool> {
        let previous = self.target;
        self.target = self.draw();
        Ok(self.target != previous)
    }

    fn target(&self) -> Option<EntityId> {
        self.target
    }

    fn constraint_checks(&self) -> u64 {
        0
    }
}
