use super::{AgentContext, DcopAgent};
use crate::comm::Outbox;
use crate::error::Result;
use crate::ids::EntityId;
use crate::message::AssignmentMessage;

/// Takes its best individual target and never reconsiders.
///
/// Useful as a baseline and as a seed for the controller's greedy repair,
/// which is where any coordination happens.
#[derive(Debug)]
pub struct GreedyAgent {
    id: EntityId,
    target: Option<EntityId>,
    checks: u64,
}

impl DcopAgent for GreedyAgent {
    type Message = AssignmentMessage;

    fn initialize(context: &AgentContext, id: EntityId) -> Result<Self> {
        let problem = &context.problem;
        let matrix = problem.matrix(problem.agent_role(id)?);
        let candidates = matrix.candidates(id)?.len() as u64;
        let target = matrix.best_target(id)?;
        if target.is_none() {
            tracing::warn!(agent = %id, "No reachable targets; agent stays unassigned");
        }
        Ok(Self {
            id,
            target,
            checks: candidates,
        })
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn send_messages(&mut self, _outbox: &mut Outbox<AssignmentMessage>) {}

    fn receive_messages(&mut self, _messages: Vec<AssignmentMessage>) {}

    fn improve_assignment(&mut self) -> Result<bool> {
        // The initial pick is the only work this agent ever does.
        self.checks = 0;
        Ok(false)
    }

    fn target(&self) -> Option<EntityId> {
        self.target
    }

    fn constraint_checks(&self) -> u64 {
        self.checks
    }
}
