//! Binary max-sum.
//!
//! Every edge of the factor graph carries one binary variable `x(a, t)`:
//! "agent `a` goes to target `t`". Messages are scalars `m(1) − m(0)`.
//!
//! * The selector factor of agent `a` allows at most one of its linked
//!   variables to be 1 and adds the unary utility `u(a, t)`. Choosing none
//!   of them is worth 0, since the agent can still land on an unlinked
//!   candidate. Its message to `t` is
//!   `u(a,t) − max(0, max_{t'≠t} u(a,t') + r(t'))`.
//! * The cardinality factor of target `t` scores the number `k` of linked
//!   agents set to 1 with `φ(k) = −penalty(t, k)`. Since `φ` depends on `k`
//!   only, the best subset of any size is the top-`k` incoming values, so
//!   the message to `a` is an exact maximisation over sorted prefixes of
//!   the other agents' `q` values in `O(d log d)` for degree `d`.
//!
//! Outgoing messages for round `r + 1` are computed at the end of round
//! `r`, so that numerical anomalies surface as errors from
//! `improve_assignment`.

use super::{AgentContext, DcopAgent};
use crate::comm::Outbox;
use crate::error::{ensure_finite, DcopError, Result};
use crate::factor_graph::{FactorId, MaxSumSession};
use crate::ids::{EntityId, Role};
use crate::message::BinaryMaxSumMessage;
use crate::utility::clamp_utility;
use std::collections::HashMap;
use std::sync::Arc;

/// Cardinality factor of a target this agent hosts.
#[derive(Debug)]
struct CardinalityFactor {
    target: EntityId,
    agents: Vec<EntityId>,
    /// `φ(k)` for `k = 0..=agents.len()`.
    potential: Vec<f64>,
    q_in: HashMap<EntityId, f64>,
    r_out: HashMap<EntityId, f64>,
}

#[derive(Debug)]
pub struct MaxSumAgent {
    id: EntityId,
    role: Role,
    linked: Vec<(EntityId, f64)>,
    r_in: HashMap<EntityId, f64>,
    q_out: HashMap<EntityId, f64>,
    factors: Vec<CardinalityFactor>,
    session: Arc<MaxSumSession>,
    last_received: HashMap<(FactorId, FactorId), f64>,
    changed: bool,
    pending: Vec<(EntityId, BinaryMaxSumMessage)>,
    fallback: Option<EntityId>,
    target: Option<EntityId>,
    damping: f64,
    epsilon: f64,
    checks: u64,
}

impl MaxSumAgent {
    fn damp(&self, previous: Option<f64>, value: f64) -> f64 {
        match previous {
            Some(old) if self.damping > 0.0 => self.damping * old + (1.0 - self.damping) * value,
            _ => value,
        }
    }

    fn selector_messages(&mut self) -> Result<()> {
        let selector = FactorId::Selector(self.id);
        let mut outgoing = Vec::with_capacity(self.linked.len());
        for (target, utility) in &self.linked {
            let mut alternative = 0.0_f64;
            for (other, other_utility) in &self.linked {
                if other == target {
                    continue;
                }
                let r = self.r_in.get(other).copied().unwrap_or(0.0);
                alternative = alternative.max(other_utility + r);
                self.checks += 1;
            }
            let value = self.damp(self.q_out.get(target).copied(), utility - alternative);
            let value = clamp_utility(ensure_finite(value, || {
                format!("max-sum message {selector} -> cardinality({target})")
            })?);
            outgoing.push((*target, value));
        }

        let graph = self.session.graph(self.role);
        for (target, value) in outgoing {
            self.q_out.insert(target, value);
            let to = FactorId::Cardinality(target);
            let Some(host) = graph.host_of(target) else {
                tracing::debug!(agent = %self.id, %target, "No host for cardinality factor");
                continue;
            };
            self.pending.push((
                host,
                BinaryMaxSumMessage {
                    from: selector,
                    to,
                    value,
                },
            ));
        }
        Ok(())
    }

    fn cardinality_messages(&mut self) -> Result<()> {
        let damping = self.damping;
        for factor in &mut self.factors {
            let from = FactorId::Cardinality(factor.target);
            for agent in &factor.agents {
                let others: Vec<f64> = factor
                    .agents
                    .iter()
                    .filter(|other| *other != agent)
                    .map(|other| factor.q_in.get(other).copied().unwrap_or(0.0))
                    .collect();
                let (value, checks) = cardinality_message(&factor.potential, others);
                self.checks += checks;

                let value = match factor.r_out.get(agent) {
                    Some(old) if damping > 0.0 => damping * old + (1.0 - damping) * value,
                    _ => value,
                };
                let value = clamp_utility(ensure_finite(value, || {
                    format!("max-sum message {from} -> selector({agent})")
                })?);
                factor.r_out.insert(*agent, value);
                self.pending.push((
                    *agent,
                    BinaryMaxSumMessage {
                        from,
                        to: FactorId::Selector(*agent),
                        value,
                    },
                ));
            }
        }
        Ok(())
    }

    /// Arg-max of `u + r` over linked targets, or the best unary target
    /// before any `r` has arrived. The selector's empty state is worth 0, so
    /// a negative best belief leaves the agent unassigned.
    fn extract(&mut self) -> Option<EntityId> {
        if self.r_in.is_empty() {
            return self.fallback;
        }
        let mut best: Option<(EntityId, f64)> = None;
        for (target, utility) in &self.linked {
            let belief = utility + self.r_in.get(target).copied().unwrap_or(0.0);
            self.checks += 1;
            if best.map_or(true, |(_, b)| belief > b) {
                best = Some((*target, belief));
            }
        }
        match best {
            Some((_, belief)) if belief < 0.0 => None,
            Some((target, _)) => Some(target),
            None => self.fallback,
        }
    }

    fn prepare_round(&mut self) -> Result<()> {
        self.pending.clear();
        self.selector_messages()?;
        self.cardinality_messages()
    }
}

/// `max_k φ(k+1) + P_k − max_k φ(k) + P_k` where `P_k` is the sum of the
/// `k` largest values in `others`. Returns the message and the number of
/// potential evaluations.
fn cardinality_message(potential: &[f64], mut others: Vec<f64>) -> (f64, u64) {
    others.sort_by(|a, b| b.total_cmp(a));
    let mut with_agent = f64::NEG_INFINITY;
    let mut without_agent = f64::NEG_INFINITY;
    let mut prefix = 0.0;
    let mut checks = 0;
    for k in 0..=others.len() {
        if k > 0 {
            prefix += others[k - 1];
        }
        if let Some(phi) = potential.get(k + 1) {
            with_agent = with_agent.max(phi + prefix);
            checks += 1;
        }
        if let Some(phi) = potential.get(k) {
            without_agent = without_agent.max(phi + prefix);
            checks += 1;
        }
    }
    (with_agent - without_agent, checks)
}

impl DcopAgent for MaxSumAgent {
    type Message = BinaryMaxSumMessage;

    fn initialize(context: &AgentContext, id: EntityId) -> Result<Self> {
        let problem = &context.problem;
        let role = problem.agent_role(id)?;
        let session = context
            .session
            .clone()
            .ok_or_else(|| DcopError::UnsupportedRole {
                solver: "max_sum".into(),
                role,
                reason: "no factor graph session was built for this solve".into(),
            })?;
        let graph = session.graph(role);
        let matrix = problem.matrix(role);

        let mut linked = Vec::new();
        for target in graph.linked_targets(id) {
            linked.push((*target, matrix.utility(id, *target)?));
        }

        let mut factors = Vec::new();
        for target in graph.owned_targets(id) {
            let agents = graph.linked_agents(target).to_vec();
            let mut potential = Vec::with_capacity(agents.len() + 1);
            for k in 0..=agents.len() as u32 {
                potential.push(-problem.utility_penalty(target, k)?);
            }
            factors.push(CardinalityFactor {
                target,
                agents,
                potential,
                q_in: HashMap::new(),
                r_out: HashMap::new(),
            });
        }

        let fallback = matrix.best_target(id)?;
        if fallback.is_none() {
            tracing::warn!(agent = %id, "No reachable targets; agent stays unassigned");
        }

        let mut agent = Self {
            id,
            role,
            linked,
            r_in: HashMap::new(),
            q_out: HashMap::new(),
            factors,
            session,
            last_received: HashMap::new(),
            changed: false,
            pending: Vec::new(),
            fallback,
            target: fallback,
            damping: context.config.maxsum.damping,
            epsilon: context.config.maxsum.epsilon,
            checks: 0,
        };
        agent.prepare_round()?;
        agent.checks = 0;
        Ok(agent)
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn send_messages(&mut self, outbox: &mut Outbox<BinaryMaxSumMessage>) {
        for (recipient, message) in self.pending.drain(..) {
            outbox.send(recipient, message);
        }
    }

    fn receive_messages(&mut self, messages: Vec<BinaryMaxSumMessage>) {
        for message in messages {
            let previous = self.last_received.insert((message.from, message.to), message.value);
            if previous.map_or(true, |old| (old - message.value).abs() > self.epsilon) {
                self.changed = true;
            }

            match (message.from, message.to) {
                (FactorId::Cardinality(target), FactorId::Selector(agent)) if agent == self.id => {
                    self.r_in.insert(target, message.value);
                }
                (FactorId::Selector(agent), FactorId::Cardinality(target)) => {
                    match self.factors.iter_mut().find(|f| f.target == target) {
                        Some(factor) => {
                            factor.q_in.insert(agent, message.value);
                        }
                        None => tracing::debug!(
                            agent = %self.id,
                            to = %message.to,
                            "Dropping max-sum message for a factor hosted elsewhere"
                        ),
                    }
                }
                _ => tracing::debug!(
                    agent = %self.id,
                    from = %message.from,
                    to = %message.to,
                    "Dropping misrouted max-sum message"
                ),
            }
        }
    }

    fn improve_assignment(&mut self) -> Result<bool> {
        self.checks = 0;
        let changed = std::mem::take(&mut self.changed);
        self.target = self.extract();
        self.prepare_round()?;
        Ok(changed)
    }

    fn target(&self) -> Option<EntityId> {
        self.target
    }

    fn constraint_checks(&self) -> u64 {
        self.checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::{context, fire_problem, id};
    use crate::comm::Mailbox;
    use crate::config::SolverConfig;
    use crate::problem::PenaltyParams;

    fn agents_for(
        utilities: &[&[f64]],
        required: &[u32],
        penalty: PenaltyParams,
        config: SolverConfig,
    ) -> Vec<MaxSumAgent> {
        let problem = fire_problem(utilities, required, penalty);
        let session = MaxSumSession::build(&problem, &config.maxsum).unwrap();
        let ctx = context(problem, config).with_session(Arc::new(session));
        (1..=utilities.len() as u32)
            .map(|a| MaxSumAgent::initialize(&ctx, id(a)).unwrap())
            .collect()
    }

    fn run(agents: &mut [MaxSumAgent], rounds: usize) -> bool {
        let mut mailbox = Mailbox::new();
        for _ in 0..rounds {
            for agent in agents.iter_mut() {
                agent.send_messages(mailbox.outbox());
            }
            mailbox.flush();
            for agent in agents.iter_mut() {
                let inbox = mailbox.take(agent.id());
                agent.receive_messages(inbox);
            }
            let mut any = false;
            for agent in agents.iter_mut() {
                any |= agent.improve_assignment().unwrap();
            }
            if !any {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_cardinality_message_prefers_free_slots() {
        // required 1, k = 20, alpha = 1
        let potential = [0.0, 0.0, -20.0];
        assert_eq!(cardinality_message(&potential, vec![7.0]).0, -7.0);
        assert_eq!(cardinality_message(&potential, vec![-3.0]).0, 0.0);
        // another agent so keen that joining it costs the full penalty
        assert_eq!(cardinality_message(&potential, vec![50.0]).0, -20.0);
    }

    #[test]
    fn test_cardinality_message_uses_best_subset() {
        // required 2 of 3 agents; penalty k * (n - 2)^2 with k = 2
        let potential = [0.0, 0.0, 0.0, -2.0];
        // the best other agent fills the second slot for free
        let (value, checks) = cardinality_message(&potential, vec![1.0, 4.0]);
        assert_eq!(value, -1.0);
        assert_eq!(checks, 6);
    }

    #[test]
    fn test_two_agents_split_two_fires() {
        let mut agents = agents_for(
            &[&[10.0, 1.0], &[9.0, 2.0]],
            &[1, 1],
            PenaltyParams { k: 20.0, alpha: 1.0 },
            SolverConfig::default(),
        );
        // before any message both fall back to their best fire
        assert_eq!(agents[1].target(), Some(id(100)));
        assert!(run(&mut agents, 20));
        assert_eq!(agents[0].target(), Some(id(100)));
        assert_eq!(agents[1].target(), Some(id(101)));
    }

    #[test]
    fn test_damping_still_converges() {
        let mut config = SolverConfig::default();
        config.maxsum.damping = 0.5;
        config.maxsum.epsilon = 1e-3;
        let mut agents = agents_for(
            &[&[10.0, 1.0], &[9.0, 2.0]],
            &[1, 1],
            PenaltyParams { k: 20.0, alpha: 1.0 },
            config,
        );
        assert!(run(&mut agents, 200));
        assert_eq!(agents[0].target(), Some(id(100)));
        assert_eq!(agents[1].target(), Some(id(101)));
    }

    #[test]
    fn test_weaker_agent_stays_out_of_a_full_fire() {
        let mut agents = agents_for(
            &[&[5.0], &[3.0]],
            &[1],
            PenaltyParams { k: 20.0, alpha: 1.0 },
            SolverConfig::default(),
        );
        run(&mut agents, 20);
        // 3 - 5: the second agent would only push the first one out
        assert_eq!(agents[0].target(), Some(id(100)));
        assert_eq!(agents[1].target(), None);
    }

    #[test]
    fn test_unlinked_agent_falls_back_to_best_utility() {
        let mut config = SolverConfig::default();
        config.maxsum.neighbors = 1;
        let mut agents = agents_for(
            &[&[5.0], &[4.0], &[3.0]],
            &[1],
            PenaltyParams::default(),
            config,
        );
        assert!(agents[2].linked.is_empty());
        run(&mut agents, 5);
        assert_eq!(agents[2].target(), Some(id(100)));
    }

    #[test]
    fn test_requires_a_session() {
        let problem = fire_problem(&[&[1.0]], &[1], PenaltyParams::default());
        let ctx = context(problem, SolverConfig::default());
        assert!(matches!(
            MaxSumAgent::initialize(&ctx, id(1)),
            Err(DcopError::UnsupportedRole { .. })
        ));
    }
}
