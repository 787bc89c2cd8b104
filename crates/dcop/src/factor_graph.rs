//! Bounded-degree factor graph for binary max-sum.
//!
//! Every agent contributes one selector factor (its "pick exactly one
//! target" variable fused with its unary utilities) and every target one
//! cardinality factor. An edge links agent `a` and target `t` when `a`
//! considers `t`. Both sides are capped at `maxsum.neighbors` edges.
//!
//! Edges are chosen greedily: each cardinality factor walks its candidate
//! agents from best to worst utility. A candidate with spare capacity is
//! linked directly. A full candidate drops its locally worst link, but only
//! if the new target is strictly better for it, and the dropped target goes
//! back on the worklist to try its next unconsidered candidate. Each target
//! only ever moves forward through its candidate list, so the build ends
//! after at most `targets × agents` steps; `maxsum.max_rehome_attempts`
//! bounds the number of evictions on top of that. The result is a local
//! exchange optimum, not a globally best graph.

use crate::config::MaxSumConfig;
use crate::error::Result;
use crate::ids::{EntityId, Role};
use crate::problem::{ProblemDefinition, UtilityMatrix};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// Node of the factor graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactorId {
    /// Selector factor of an agent.
    Selector(EntityId),
    /// Cardinality factor of a target.
    Cardinality(EntityId),
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorId::Selector(agent) => write!(f, "selector({agent})"),
            FactorId::Cardinality(target) => write!(f, "cardinality({target})"),
        }
    }
}

/// Factor graph of one role.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    role: Role,
    max_degree: usize,
    function_links: BTreeMap<EntityId, Vec<EntityId>>,
    variable_links: BTreeMap<EntityId, Vec<EntityId>>,
    hosts: HashMap<EntityId, EntityId>,
    evictions: usize,
    cap_reached: bool,
}

impl FactorGraph {
    pub fn build(matrix: &UtilityMatrix, max_degree: usize, max_rehome_attempts: usize) -> Result<Self> {
        let agents = matrix.agents();
        let targets = matrix.targets();

        let mut graph = Self {
            role: matrix.role(),
            max_degree,
            function_links: targets.iter().map(|t| (*t, Vec::new())).collect(),
            variable_links: agents.iter().map(|a| (*a, Vec::new())).collect(),
            hosts: HashMap::with_capacity(targets.len()),
            evictions: 0,
            cap_reached: false,
        };
        if agents.is_empty() {
            return Ok(graph);
        }

        // Round-robin ownership: target j lives on agent j mod n.
        for (j, target) in targets.iter().enumerate() {
            graph.hosts.insert(*target, agents[j % agents.len()]);
        }

        let mut ranked: HashMap<EntityId, Vec<(EntityId, f64)>> = HashMap::with_capacity(targets.len());
        for target in targets {
            let mut candidates = Vec::new();
            for agent in matrix.responders(*target)? {
                candidates.push((*agent, matrix.utility(*agent, *target)?));
            }
            // stable: equal utilities keep matrix order
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.insert(*target, candidates);
        }
        let mut cursor: HashMap<EntityId, usize> = targets.iter().map(|t| (*t, 0)).collect();

        // Each agent seeds the worklist with the targets it owns.
        let mut worklist = VecDeque::with_capacity(targets.len());
        for owner in 0..agents.len() {
            worklist.extend(targets.iter().skip(owner).step_by(agents.len()).copied());
        }

        while let Some(target) = worklist.pop_front() {
            let candidates = &ranked[&target];
            loop {
                let next = cursor[&target];
                if graph.function_links[&target].len() >= max_degree || next >= candidates.len() {
                    break;
                }
                cursor.insert(target, next + 1);
                let (agent, utility) = candidates[next];

                if graph.variable_links[&agent].len() < max_degree {
                    graph.link(target, agent);
                    continue;
                }

                let Some((worst, worst_utility)) = graph.worst_link(matrix, agent)? else {
                    continue;
                };
                if utility <= worst_utility {
                    continue;
                }
                if graph.evictions >= max_rehome_attempts {
                    if !graph.cap_reached {
                        tracing::warn!(
                            role = %graph.role,
                            evictions = graph.evictions,
                            "Factor graph re-homing cap reached; keeping current links"
                        );
                    }
                    graph.cap_reached = true;
                    continue;
                }
                graph.unlink(worst, agent);
                graph.link(target, agent);
                graph.evictions += 1;
                worklist.push_back(worst);
            }
        }

        tracing::debug!(
            role = %graph.role,
            edges = graph.edge_count(),
            evictions = graph.evictions,
            "Built factor graph"
        );
        Ok(graph)
    }

    fn link(&mut self, target: EntityId, agent: EntityId) {
        if let Some(agents) = self.function_links.get_mut(&target) {
            agents.push(agent);
        }
        if let Some(targets) = self.variable_links.get_mut(&agent) {
            targets.push(target);
        }
    }

    fn unlink(&mut self, target: EntityId, agent: EntityId) {
        if let Some(agents) = self.function_links.get_mut(&target) {
            agents.retain(|a| *a != agent);
        }
        if let Some(targets) = self.variable_links.get_mut(&agent) {
            targets.retain(|t| *t != target);
        }
    }

    fn worst_link(&self, matrix: &UtilityMatrix, agent: EntityId) -> Result<Option<(EntityId, f64)>> {
        let mut worst: Option<(EntityId, f64)> = None;
        for target in &self.variable_links[&agent] {
            let u = matrix.utility(agent, *target)?;
            if worst.map_or(true, |(_, w)| u < w) {
                worst = Some((*target, u));
            }
        }
        Ok(worst)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Agents linked to a target's cardinality factor.
    pub fn linked_agents(&self, target: EntityId) -> &[EntityId] {
        self.function_links.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets linked to an agent's selector factor.
    pub fn linked_targets(&self, agent: EntityId) -> &[EntityId] {
        self.variable_links.get(&agent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets whose cardinality factor runs on `agent`.
    pub fn owned_targets(&self, agent: EntityId) -> Vec<EntityId> {
        self.function_links
            .keys()
            .filter(|t| self.hosts.get(t) == Some(&agent))
            .copied()
            .collect()
    }

    /// Agent hosting a target's cardinality factor.
    pub fn host_of(&self, target: EntityId) -> Option<EntityId> {
        self.hosts.get(&target).copied()
    }

    pub fn edge_count(&self) -> usize {
        self.function_links.values().map(Vec::len).sum()
    }

    pub fn max_function_degree(&self) -> usize {
        self.function_links.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn max_variable_degree(&self) -> usize {
        self.variable_links.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn evictions(&self) -> usize {
        self.evictions
    }

    pub fn cap_reached(&self) -> bool {
        self.cap_reached
    }
}

/// Factor graphs and factor locations for one solve.
///
/// Built once per timestep and shared by reference with every max-sum
/// agent; dropped with the solve.
#[derive(Debug, Clone)]
pub struct MaxSumSession {
    fire: FactorGraph,
    police: FactorGraph,
}

impl MaxSumSession {
    pub fn build(problem: &ProblemDefinition, config: &MaxSumConfig) -> Result<Self> {
        Ok(Self {
            fire: FactorGraph::build(
                problem.matrix(Role::Fire),
                config.neighbors,
                config.max_rehome_attempts,
            )?,
            police: FactorGraph::build(
                problem.matrix(Role::Police),
                config.neighbors,
                config.max_rehome_attempts,
            )?,
        })
    }

    pub fn graph(&self, role: Role) -> &FactorGraph {
        match role {
            Role::Fire => &self.fire,
            Role::Police => &self.police,
        }
    }

    /// Agent that runs `factor`.
    pub fn host(&self, factor: FactorId) -> Option<EntityId> {
        match factor {
            FactorId::Selector(agent) => Some(agent),
            FactorId::Cardinality(target) => self
                .fire
                .host_of(target)
                .or_else(|| self.police.host_of(target)),
        }
    }
}
