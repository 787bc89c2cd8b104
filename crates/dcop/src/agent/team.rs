use super::{AgentContext, DcopAgent, DsaAgent};
use crate::comm::Outbox;
use crate::error::Result;
use crate::ids::{EntityId, Role};
use crate::message::{AssignmentMessage, TeamMessage};
use crate::scoring::TeamView;

/// DSA agent that also tracks what the other role is doing.
///
/// Picks go to same-role neighbours as usual and, as cross-team traffic, to
/// every agent of the other role. Fire brigades learn which blockades have
/// police on them; police forces learn which fire every brigade is heading
/// to, and which blockades their neighbours hold. The scoring then charges
/// or credits blocked routes against that live picture instead of the
/// static matrix adjustment.
#[derive(Debug)]
pub struct TeamAgent {
    core: DsaAgent,
    role: Role,
    other_team: Vec<EntityId>,
    teammates: Vec<AssignmentMessage>,
    cross_team: Vec<AssignmentMessage>,
    view: TeamView,
    cross_checks: u64,
}

impl TeamAgent {
    pub fn role(&self) -> Role {
        self.role
    }

    fn rebuild_view(&mut self) {
        self.view.police_on.reset();
        self.view.fire_choices.clear();
        self.cross_checks = 0;
        for pick in self.cross_team.drain(..) {
            self.cross_checks += 1;
            let Some(target) = pick.target else {
                continue;
            };
            match self.role {
                Role::Fire => self.view.police_on.increase(target),
                Role::Police => {
                    self.view.fire_choices.insert(pick.agent, target);
                }
            }
        }
        if self.role == Role::Police {
            // Routes crossing several blockades open only when all are held.
            for pick in &self.teammates {
                if let Some(target) = pick.target {
                    self.view.police_on.increase(target);
                }
            }
        }
    }
}

impl DcopAgent for TeamAgent {
    type Message = TeamMessage;

    fn initialize(context: &AgentContext, id: EntityId) -> Result<Self> {
        let role = context.problem.agent_role(id)?;
        let other_team = context.problem.matrix(role.other()).agents().to_vec();
        Ok(Self {
            core: DsaAgent::initialize(context, id)?,
            role,
            other_team,
            teammates: Vec::new(),
            cross_team: Vec::new(),
            view: TeamView::default(),
            cross_checks: 0,
        })
    }

    fn id(&self) -> EntityId {
        self.core.id()
    }

    fn send_messages(&mut self, outbox: &mut Outbox<TeamMessage>) {
        let pick = self.core.announcement();
        for neighbor in self.core.neighbors() {
            outbox.send(*neighbor, TeamMessage::Teammate(pick));
        }
        for agent in &self.other_team {
            outbox.send(*agent, TeamMessage::CrossTeam { role: self.role, pick });
        }
    }

    fn receive_messages(&mut self, messages: Vec<TeamMessage>) {
        for message in messages {
            match message {
                TeamMessage::Teammate(pick) => self.teammates.push(pick),
                TeamMessage::CrossTeam { role, pick } if role != self.role => {
                    self.cross_team.push(pick)
                }
                TeamMessage::CrossTeam { role, pick } => {
                    tracing::debug!(agent = %self.id(), %role, from = %pick.agent, "Ignoring cross-team pick from own role");
                }
            }
        }
    }

    fn improve_assignment(&mut self) -> Result<bool> {
        self.rebuild_view();
        self.core.receive_messages(std::mem::take(&mut self.teammates));
        self.core.decide(Some(&self.view))
    }

    fn target(&self) -> Option<EntityId> {
        self.core.target()
    }

    fn constraint_checks(&self) -> u64 {
        self.core.constraint_checks() + self.cross_checks
    }
}
