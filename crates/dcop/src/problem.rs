//! Immutable per-timestep problem model.
//!
//! A [`ProblemDefinition`] owns one dense utility matrix per role (fire
//! brigades × fires, police forces × blockades), the required agent count of
//! every target and the over-assignment penalty. It is built once per
//! timestep from a [`WorldSnapshot`] and shared read-only by every agent.

use crate::assignment::Assignment;
use crate::config::ProblemConfig;
use crate::error::{ensure_finite, DcopError, Result};
use crate::ids::{EntityId, Role};
use crate::utility::{clamp_utility, UTILITY_SENTINEL};
use crate::world::{BlockedRoute, WorldSnapshot};
use std::collections::{HashMap, HashSet};

/// Over-assignment penalty `k · (n − required)^alpha`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyParams {
    pub k: f64,
    pub alpha: f64,
}

impl Default for PenaltyParams {
    fn default() -> Self {
        Self { k: 2.0, alpha: 2.0 }
    }
}

impl PenaltyParams {
    pub fn penalty(&self, required: u32, n_agents: u32) -> f64 {
        if n_agents <= required {
            0.0
        } else {
            self.k * f64::from(n_agents - required).powf(self.alpha)
        }
    }
}

/// Dense agent × target utility matrix for one role.
///
/// Row/column indices are fixed at construction and stay valid for the
/// matrix's lifetime. A pair at `-UTILITY_SENTINEL` is unreachable and is
/// left out of the candidate lists.
#[derive(Debug, Clone)]
pub struct UtilityMatrix {
    role: Role,
    agents: Vec<EntityId>,
    targets: Vec<EntityId>,
    agent_index: HashMap<EntityId, usize>,
    target_index: HashMap<EntityId, usize>,
    values: Vec<f64>,
    required: Vec<u32>,
    candidates: Vec<Vec<EntityId>>,
    responders: Vec<Vec<EntityId>>,
}

impl UtilityMatrix {
    /// Builds a matrix from row-major `values` (`agents.len()` rows of
    /// `targets.len()` utilities).
    pub fn new(
        role: Role,
        agents: Vec<EntityId>,
        targets: Vec<EntityId>,
        values: Vec<f64>,
        required: Vec<u32>,
    ) -> Result<Self> {
        let malformed = |reason: String| DcopError::MalformedMatrix { role, reason };
        if values.len() != agents.len() * targets.len() {
            return Err(malformed(format!(
                "expected {} values for {} agents x {} targets, got {}",
                agents.len() * targets.len(),
                agents.len(),
                targets.len(),
                values.len()
            )));
        }
        if required.len() != targets.len() {
            return Err(malformed(format!(
                "expected {} required counts, got {}",
                targets.len(),
                required.len()
            )));
        }

        let mut agent_index = HashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if agent_index.insert(*agent, i).is_some() {
                return Err(DcopError::DuplicateEntity { id: *agent });
            }
        }
        let mut target_index = HashMap::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            if target_index.insert(*target, i).is_some() {
                return Err(DcopError::DuplicateEntity { id: *target });
            }
        }

        let mut values = values;
        for (i, agent) in agents.iter().enumerate() {
            for (j, target) in targets.iter().enumerate() {
                let cell = &mut values[i * targets.len() + j];
                *cell = clamp_utility(ensure_finite(*cell, || {
                    format!("{role} utility[{i}][{j}] (agent {agent}, target {target})")
                })?);
            }
        }

        let mut candidates = vec![Vec::new(); agents.len()];
        let mut responders = vec![Vec::new(); targets.len()];
        for (i, agent) in agents.iter().enumerate() {
            for (j, target) in targets.iter().enumerate() {
                if values[i * targets.len() + j] > -UTILITY_SENTINEL {
                    candidates[i].push(*target);
                    responders[j].push(*agent);
                }
            }
        }

        Ok(Self {
            role,
            agents,
            targets,
            agent_index,
            target_index,
            values,
            required,
            candidates,
            responders,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn agents(&self) -> &[EntityId] {
        &self.agents
    }

    pub fn targets(&self) -> &[EntityId] {
        &self.targets
    }

    pub fn agent_index(&self, agent: EntityId) -> Result<usize> {
        self.agent_index.get(&agent).copied().ok_or(DcopError::NotInMatrix {
            role: self.role,
            id: agent,
        })
    }

    pub fn target_index(&self, target: EntityId) -> Result<usize> {
        self.target_index.get(&target).copied().ok_or(DcopError::NotInMatrix {
            role: self.role,
            id: target,
        })
    }

    pub fn contains_agent(&self, agent: EntityId) -> bool {
        self.agent_index.contains_key(&agent)
    }

    pub fn contains_target(&self, target: EntityId) -> bool {
        self.target_index.contains_key(&target)
    }

    pub fn utility(&self, agent: EntityId, target: EntityId) -> Result<f64> {
        let i = self.agent_index(agent)?;
        let j = self.target_index(target)?;
        Ok(self.values[i * self.targets.len() + j])
    }

    pub fn required(&self, target: EntityId) -> Result<u32> {
        Ok(self.required[self.target_index(target)?])
    }

    /// Reachable targets of `agent`, in matrix column order.
    pub fn candidates(&self, agent: EntityId) -> Result<&[EntityId]> {
        Ok(&self.candidates[self.agent_index(agent)?])
    }

    /// Agents that can reach `target`, in matrix row order.
    pub fn responders(&self, target: EntityId) -> Result<&[EntityId]> {
        Ok(&self.responders[self.target_index(target)?])
    }

    /// Highest-utility reachable target; ties go to the first column.
    pub fn best_target(&self, agent: EntityId) -> Result<Option<EntityId>> {
        let mut best: Option<(EntityId, f64)> = None;
        for target in self.candidates(agent)? {
            let u = self.utility(agent, *target)?;
            if best.map_or(true, |(_, b)| u > b) {
                best = Some((*target, u));
            }
        }
        Ok(best.map(|(t, _)| t))
    }

    /// Same-role agents sharing at least one candidate target with `agent`.
    pub fn agent_neighbors(&self, agent: EntityId) -> Result<Vec<EntityId>> {
        let mut seen = HashSet::new();
        for target in self.candidates(agent)? {
            for other in self.responders(*target)? {
                if *other != agent {
                    seen.insert(*other);
                }
            }
        }
        let mut neighbors: Vec<EntityId> = seen.into_iter().collect();
        neighbors.sort_unstable();
        Ok(neighbors)
    }
}

/// Everything the solvers need to know about one timestep.
#[derive(Debug, Clone)]
pub struct ProblemDefinition {
    fire: UtilityMatrix,
    police: UtilityMatrix,
    penalty: PenaltyParams,
    blocked_fire_penalty: f64,
    team_coordination: bool,
    // (fire agent, fire) -> blockades on the route, sorted
    blocked: HashMap<(EntityId, EntityId), Vec<EntityId>>,
    // blockade -> (fire agent, fire) routes it cuts
    routes_through: HashMap<EntityId, Vec<(EntityId, EntityId)>>,
}

impl ProblemDefinition {
    pub fn new(fire: UtilityMatrix, police: UtilityMatrix, penalty: PenaltyParams) -> Result<Self> {
        if fire.role != Role::Fire || police.role != Role::Police {
            return Err(DcopError::MalformedMatrix {
                role: fire.role,
                reason: "matrices passed in the wrong order".into(),
            });
        }
        let fire_ids = fire.agents.iter().chain(fire.targets.iter());
        let police_ids: HashSet<EntityId> =
            police.agents.iter().chain(police.targets.iter()).copied().collect();
        let mut seen = HashSet::new();
        for id in fire_ids {
            if police_ids.contains(id) || !seen.insert(*id) {
                return Err(DcopError::DuplicateEntity { id: *id });
            }
        }
        Ok(Self {
            fire,
            police,
            penalty,
            blocked_fire_penalty: 0.0,
            team_coordination: false,
            blocked: HashMap::new(),
            routes_through: HashMap::new(),
        })
    }

    /// Registers blocked routes and how much an unattended one costs. Only
    /// routes between known entities are kept.
    pub fn with_blocked_routes(mut self, routes: &[BlockedRoute], penalty: f64) -> Self {
        self.blocked_fire_penalty = penalty;
        self.blocked.clear();
        self.routes_through.clear();
        for route in routes {
            if self.fire.contains_agent(route.agent)
                && self.fire.contains_target(route.fire)
                && self.police.contains_target(route.blockade)
            {
                self.blocked
                    .entry((route.agent, route.fire))
                    .or_default()
                    .push(route.blockade);
                self.routes_through
                    .entry(route.blockade)
                    .or_default()
                    .push((route.agent, route.fire));
            }
        }
        for blockades in self.blocked.values_mut() {
            blockades.sort_unstable();
            blockades.dedup();
        }
        for routes in self.routes_through.values_mut() {
            routes.sort_unstable();
            routes.dedup();
        }
        self
    }

    /// Makes the objective charge blocked routes dynamically, as the team
    /// solver scores them.
    pub fn with_team_coordination(mut self, enabled: bool) -> Self {
        self.team_coordination = enabled;
        self
    }

    /// Builds the matrices from a world snapshot.
    ///
    /// `previous` feeds hysteresis. With `team_coordination` the blocked
    /// route penalty is left out of the matrix because the team scoring
    /// charges it against the live police assignment instead.
    pub fn build(
        world: &WorldSnapshot,
        previous: &Assignment,
        config: &ProblemConfig,
        team_coordination: bool,
    ) -> Result<Self> {
        let utility_fn = config.utility_function.build(config.distance_unit);

        let mut fires: Vec<_> = world.fires.iter().collect();
        fires.sort_by_key(|f| f.id);
        let mut blockades: Vec<_> = world.blockades.iter().collect();
        blockades.sort_by_key(|b| b.id);

        let mut blocked_count: HashMap<EntityId, usize> = HashMap::new();
        let mut blocked_pairs = HashSet::new();
        let mut seen_routes = HashSet::new();
        for route in &world.blocked_routes {
            blocked_pairs.insert((route.agent, route.fire));
            if seen_routes.insert((route.agent, route.fire, route.blockade)) {
                *blocked_count.entry(route.blockade).or_insert(0) += 1;
            }
        }

        let reachable = |d: f64| config.max_distance.map_or(true, |max| d <= max);
        let with_hysteresis = |agent: EntityId, target: EntityId, u: f64| {
            if previous.target(agent) != Some(target) {
                u
            } else if u >= 0.0 {
                u * config.hysteresis
            } else {
                u / config.hysteresis
            }
        };

        let mut matrices = Vec::with_capacity(2);
        for role in Role::ALL {
            let mut agents: Vec<_> = world.agents_with_role(role).collect();
            agents.sort_by_key(|a| a.id);

            let (targets, required): (Vec<EntityId>, Vec<u32>) = match role {
                Role::Fire => fires
                    .iter()
                    .map(|f| {
                        let volume = f.intensity.max(0.0) * f.area.max(0.0);
                        (f.id, ((volume / config.agent_power).ceil() as u32).max(1))
                    })
                    .unzip(),
                Role::Police => blockades.iter().map(|b| (b.id, 1)).unzip(),
            };

            let mut values = Vec::with_capacity(agents.len() * targets.len());
            for agent in &agents {
                let location = agent
                    .location
                    .ok_or(DcopError::MissingLocation { agent: agent.id })?;
                match role {
                    Role::Fire => {
                        for fire in &fires {
                            if !reachable(location.distance(&fire.location)) {
                                values.push(-UTILITY_SENTINEL);
                                continue;
                            }
                            let mut u = utility_fn.fire_utility(location, fire);
                            if !team_coordination
                                && config.blockade_adjustment
                                && blocked_pairs.contains(&(agent.id, fire.id))
                            {
                                u -= config.blocked_fire_penalty;
                            }
                            values.push(with_hysteresis(agent.id, fire.id, u));
                        }
                    }
                    Role::Police => {
                        for blockade in &blockades {
                            if !reachable(location.distance(&blockade.location)) {
                                values.push(-UTILITY_SENTINEL);
                                continue;
                            }
                            let blocked = blocked_count.get(&blockade.id).copied().unwrap_or(0);
                            let u = utility_fn.blockade_utility(location, blockade, blocked);
                            values.push(with_hysteresis(agent.id, blockade.id, u));
                        }
                    }
                }
            }

            let agent_ids = agents.iter().map(|a| a.id).collect();
            matrices.push(UtilityMatrix::new(role, agent_ids, targets, values, required)?);
        }

        let police = matrices.pop().ok_or_else(|| DcopError::MalformedMatrix {
            role: Role::Police,
            reason: "matrix was not built".into(),
        })?;
        let fire = matrices.pop().ok_or_else(|| DcopError::MalformedMatrix {
            role: Role::Fire,
            reason: "matrix was not built".into(),
        })?;

        let penalty = PenaltyParams {
            k: config.k,
            alpha: config.alpha,
        };
        let problem = Self::new(fire, police, penalty)?
            .with_blocked_routes(&world.blocked_routes, config.blocked_fire_penalty)
            .with_team_coordination(team_coordination);

        tracing::debug!(
            fire_agents = problem.fire.agents.len(),
            fires = problem.fire.targets.len(),
            police_agents = problem.police.agents.len(),
            blockades = problem.police.targets.len(),
            blocked_routes = problem.blocked.len(),
            "Built problem definition"
        );
        Ok(problem)
    }

    pub fn matrix(&self, role: Role) -> &UtilityMatrix {
        match role {
            Role::Fire => &self.fire,
            Role::Police => &self.police,
        }
    }

    pub fn penalty_params(&self) -> PenaltyParams {
        self.penalty
    }

    pub fn blocked_fire_penalty(&self) -> f64 {
        self.blocked_fire_penalty
    }

    pub fn team_coordination(&self) -> bool {
        self.team_coordination
    }

    pub fn fire_agents(&self) -> &[EntityId] {
        &self.fire.agents
    }

    pub fn fires(&self) -> &[EntityId] {
        &self.fire.targets
    }

    pub fn police_agents(&self) -> &[EntityId] {
        &self.police.agents
    }

    pub fn blockades(&self) -> &[EntityId] {
        &self.police.targets
    }

    /// Role of an agent, or an error if it is not part of either matrix.
    pub fn agent_role(&self, agent: EntityId) -> Result<Role> {
        if self.fire.contains_agent(agent) {
            Ok(Role::Fire)
        } else if self.police.contains_agent(agent) {
            Ok(Role::Police)
        } else {
            Err(DcopError::UnknownAgent { agent })
        }
    }

    fn target_role(&self, target: EntityId) -> Result<Role> {
        if self.fire.contains_target(target) {
            Ok(Role::Fire)
        } else if self.police.contains_target(target) {
            Ok(Role::Police)
        } else {
            Err(DcopError::UnknownTarget { target })
        }
    }

    pub fn utility(&self, agent: EntityId, target: EntityId) -> Result<f64> {
        self.matrix(self.agent_role(agent)?).utility(agent, target)
    }

    pub fn required_agent_count(&self, target: EntityId) -> Result<u32> {
        self.matrix(self.target_role(target)?).required(target)
    }

    /// Zero while `n_agents` does not exceed the required count.
    pub fn utility_penalty(&self, target: EntityId, n_agents: u32) -> Result<f64> {
        let penalty = self.penalty.penalty(self.required_agent_count(target)?, n_agents);
        ensure_finite(penalty, || format!("penalty of {target} with {n_agents} agents"))
    }

    pub fn fire_agent_neighbors(&self, fire: EntityId) -> Result<&[EntityId]> {
        self.fire.responders(fire)
    }

    pub fn fire_neighbors(&self, agent: EntityId) -> Result<&[EntityId]> {
        self.fire.candidates(agent)
    }

    pub fn police_agent_neighbors(&self, blockade: EntityId) -> Result<&[EntityId]> {
        self.police.responders(blockade)
    }

    pub fn blockade_neighbors(&self, agent: EntityId) -> Result<&[EntityId]> {
        self.police.candidates(agent)
    }

    /// Blockades on the route from a fire brigade to a fire. The route is
    /// open only once every one of them has police on it.
    pub fn blocking_blockades(&self, agent: EntityId, fire: EntityId) -> &[EntityId] {
        self.blocked
            .get(&(agent, fire))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `(fire agent, fire)` routes cut by `blockade`.
    pub fn routes_through(&self, blockade: EntityId) -> &[(EntityId, EntityId)] {
        self.routes_through
            .get(&blockade)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Global objective of an assignment: summed utilities minus
    /// over-assignment penalties and, under team coordination, the cost of
    /// every fire brigade heading through an unattended blockade.
    pub fn total_utility(&self, assignment: &Assignment) -> Result<f64> {
        let mut total = 0.0;
        for (agent, target) in assignment.iter() {
            total += self.utility(agent, target)?;
        }
        let counts = assignment.target_counts();
        for (target, count) in &counts {
            total -= self.utility_penalty(*target, *count)?;
        }
        if self.team_coordination {
            for (agent, fire) in assignment.iter() {
                let unattended = self
                    .blocking_blockades(agent, fire)
                    .iter()
                    .any(|blockade| counts.get(blockade).copied().unwrap_or(0) == 0);
                if unattended {
                    total -= self.blocked_fire_penalty;
                }
            }
        }
        Ok(total)
    }

    /// Sum of `|selected − required|` over every target somebody picked.
    pub fn violations(&self, assignment: &Assignment) -> Result<u32> {
        let mut violations = 0;
        for (target, count) in assignment.target_counts() {
            let required = self.required_agent_count(target)?;
            violations += count.abs_diff(required);
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{AgentState, BlockadeState, FireState, Location};

    fn id(raw: u32) -> EntityId {
        EntityId(raw)
    }

    fn world() -> WorldSnapshot {
        WorldSnapshot {
            time: 1,
            agents: vec![
                AgentState {
                    id: id(1),
                    role: Role::Fire,
                    location: Some(Location::new(0.0, 0.0)),
                },
                AgentState {
                    id: id(2),
                    role: Role::Fire,
                    location: Some(Location::new(5000.0, 0.0)),
                },
                AgentState {
                    id: id(3),
                    role: Role::Police,
                    location: Some(Location::new(100.0, 0.0)),
                },
            ],
            fires: vec![
                FireState {
                    id: id(10),
                    location: Location::new(200.0, 0.0),
                    intensity: 0.5,
                    area: 4000.0,
                },
                FireState {
                    id: id(11),
                    location: Location::new(4800.0, 0.0),
                    intensity: 0.4,
                    area: 300.0,
                },
            ],
            blockades: vec![BlockadeState {
                id: id(20),
                location: Location::new(150.0, 0.0),
                repair_cost: 30.0,
            }],
            blocked_routes: vec![BlockedRoute {
                agent: id(2),
                fire: id(10),
                blockade: id(20),
            }],
        }
    }

    #[test]
    fn test_build_indexes_both_roles() {
        let problem =
            ProblemDefinition::build(&world(), &Assignment::new(), &ProblemConfig::default(), false)
                .unwrap();
        assert_eq!(problem.fire_agents(), &[id(1), id(2)]);
        assert_eq!(problem.fires(), &[id(10), id(11)]);
        assert_eq!(problem.police_agents(), &[id(3)]);
        assert_eq!(problem.blockades(), &[id(20)]);
        assert_eq!(problem.agent_role(id(3)).unwrap(), Role::Police);
    }

    #[test]
    fn test_required_counts() {
        let problem =
            ProblemDefinition::build(&world(), &Assignment::new(), &ProblemConfig::default(), false)
                .unwrap();
        // 0.5 * 4000 / 1000 = 2
        assert_eq!(problem.required_agent_count(id(10)).unwrap(), 2);
        // small fires still need somebody
        assert_eq!(problem.required_agent_count(id(11)).unwrap(), 1);
        assert_eq!(problem.required_agent_count(id(20)).unwrap(), 1);
    }

    #[test]
    fn test_penalty_zero_below_capacity() {
        let problem =
            ProblemDefinition::build(&world(), &Assignment::new(), &ProblemConfig::default(), false)
                .unwrap();
        assert_eq!(problem.utility_penalty(id(10), 0).unwrap(), 0.0);
        assert_eq!(problem.utility_penalty(id(10), 2).unwrap(), 0.0);
        // k * (3 - 2)^2
        assert_eq!(problem.utility_penalty(id(10), 3).unwrap(), 2.0);
        assert_eq!(problem.utility_penalty(id(10), 4).unwrap(), 8.0);
    }

    #[test]
    fn test_unknown_ids_are_errors_not_zero() {
        let problem =
            ProblemDefinition::build(&world(), &Assignment::new(), &ProblemConfig::default(), false)
                .unwrap();
        assert!(matches!(
            problem.utility(id(99), id(10)),
            Err(DcopError::UnknownAgent { .. })
        ));
        assert!(matches!(
            problem.utility(id(1), id(20)),
            Err(DcopError::NotInMatrix { .. })
        ));
        assert!(matches!(
            problem.required_agent_count(id(98)),
            Err(DcopError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_missing_location_is_fatal() {
        let mut w = world();
        w.agents[0].location = None;
        let err = ProblemDefinition::build(&w, &Assignment::new(), &ProblemConfig::default(), false)
            .unwrap_err();
        assert!(matches!(err, DcopError::MissingLocation { agent } if agent == id(1)));
    }

    #[test]
    fn test_hysteresis_boosts_previous_target() {
        let config = ProblemConfig::default();
        let plain = ProblemDefinition::build(&world(), &Assignment::new(), &config, false).unwrap();
        let mut previous = Assignment::new();
        previous.assign(id(1), Some(id(11)));
        let sticky = ProblemDefinition::build(&world(), &previous, &config, false).unwrap();

        let before = plain.utility(id(1), id(11)).unwrap();
        let after = sticky.utility(id(1), id(11)).unwrap();
        assert!((after - before * config.hysteresis).abs() < 1e-9);
        assert_eq!(
            plain.utility(id(1), id(10)).unwrap(),
            sticky.utility(id(1), id(10)).unwrap()
        );
    }

    #[test]
    fn test_static_blockade_adjustment_only_without_team() {
        let config = ProblemConfig::default();
        let plain = ProblemDefinition::build(&world(), &Assignment::new(), &config, false).unwrap();
        let team = ProblemDefinition::build(&world(), &Assignment::new(), &config, true).unwrap();
        let diff = team.utility(id(2), id(10)).unwrap() - plain.utility(id(2), id(10)).unwrap();
        assert!((diff - config.blocked_fire_penalty).abs() < 1e-9);
        assert_eq!(team.blocking_blockades(id(2), id(10)), &[id(20)]);
        assert_eq!(team.routes_through(id(20)), &[(id(2), id(10))]);
    }

    #[test]
    fn test_max_distance_limits_candidates() {
        let config = ProblemConfig {
            max_distance: Some(1000.0),
            ..ProblemConfig::default()
        };
        let problem = ProblemDefinition::build(&world(), &Assignment::new(), &config, false).unwrap();
        assert_eq!(problem.fire_neighbors(id(1)).unwrap(), &[id(10)]);
        assert_eq!(problem.fire_neighbors(id(2)).unwrap(), &[id(11)]);
        assert_eq!(problem.fire_agent_neighbors(id(10)).unwrap(), &[id(1)]);
        assert_eq!(problem.utility(id(1), id(11)).unwrap(), -UTILITY_SENTINEL);
    }

    #[test]
    fn test_total_utility_and_violations() {
        let fire = UtilityMatrix::new(
            Role::Fire,
            vec![id(1), id(2), id(3)],
            vec![id(10)],
            vec![5.0, 5.0, 5.0],
            vec![2],
        )
        .unwrap();
        let police = UtilityMatrix::new(Role::Police, vec![], vec![], vec![], vec![]).unwrap();
        let problem = ProblemDefinition::new(fire, police, PenaltyParams::default()).unwrap();

        let assignment: Assignment = [(id(1), id(10)), (id(2), id(10)), (id(3), id(10))]
            .into_iter()
            .collect();
        // 15 - 2 * (3 - 2)^2
        assert_eq!(problem.total_utility(&assignment).unwrap(), 13.0);
        assert_eq!(problem.violations(&assignment).unwrap(), 1);
    }

    #[test]
    fn test_team_objective_charges_unattended_blockades() {
        let config = ProblemConfig::default();
        let problem = ProblemDefinition::build(&world(), &Assignment::new(), &config, true).unwrap();
        let mut assignment = Assignment::new();
        assignment.assign(id(2), Some(id(10)));
        let unattended = problem.total_utility(&assignment).unwrap();
        assignment.assign(id(3), Some(id(20)));
        let attended = problem.total_utility(&assignment).unwrap();
        let police_u = problem.utility(id(3), id(20)).unwrap();
        assert!((attended - unattended - police_u - config.blocked_fire_penalty).abs() < 1e-9);
    }

    #[test]
    fn test_matrix_rejects_wrong_shape_and_nan() {
        assert!(matches!(
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(2)], vec![], vec![1]),
            Err(DcopError::MalformedMatrix { .. })
        ));
        assert!(matches!(
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(2)], vec![f64::NAN], vec![1]),
            Err(DcopError::NumericalAnomaly { .. })
        ));
        assert!(matches!(
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(2)], vec![f64::INFINITY], vec![1]),
            Err(DcopError::NumericalAnomaly { .. })
        ));
        // finite values beyond the sentinel are clamped, not rejected
        let matrix =
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(2)], vec![-1e300], vec![1]).unwrap();
        assert_eq!(matrix.utility(id(1), id(2)).unwrap(), -UTILITY_SENTINEL);
    }

    #[test]
    fn test_overflowing_penalty_is_rejected() {
        let fire = UtilityMatrix::new(
            Role::Fire,
            (1..=5).map(id).collect(),
            vec![id(10)],
            vec![1.0; 5],
            vec![1],
        )
        .unwrap();
        let police = UtilityMatrix::new(Role::Police, vec![], vec![], vec![], vec![]).unwrap();
        let problem =
            ProblemDefinition::new(fire, police, PenaltyParams { k: 20.0, alpha: 1000.0 }).unwrap();

        // 2^1000 still fits in an f64, 4^1000 does not
        assert!(problem.utility_penalty(id(10), 3).unwrap().is_finite());
        assert!(matches!(
            problem.utility_penalty(id(10), 5),
            Err(DcopError::NumericalAnomaly { .. })
        ));
        let everyone: Assignment = (1..=5).map(|a| (id(a), id(10))).collect();
        assert!(matches!(
            problem.total_utility(&everyone),
            Err(DcopError::NumericalAnomaly { .. })
        ));
    }

    #[test]
    fn test_route_behind_several_blockades_is_charged_until_all_are_attended() {
        let fire =
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(10)], vec![10.0], vec![1]).unwrap();
        let police = UtilityMatrix::new(
            Role::Police,
            vec![id(3), id(4)],
            vec![id(20), id(21)],
            vec![5.0, 4.0, 5.0, 4.0],
            vec![1, 1],
        )
        .unwrap();
        let route = |blockade| BlockedRoute {
            agent: id(1),
            fire: id(10),
            blockade: id(blockade),
        };
        let problem = ProblemDefinition::new(fire, police, PenaltyParams::default())
            .unwrap()
            .with_blocked_routes(&[route(21), route(20), route(21)], 100.0)
            .with_team_coordination(true);
        assert_eq!(problem.blocking_blockades(id(1), id(10)), &[id(20), id(21)]);
        assert_eq!(problem.routes_through(id(21)), &[(id(1), id(10))]);

        let mut assignment: Assignment = [(id(1), id(10)), (id(3), id(21))].into_iter().collect();
        assert_eq!(problem.total_utility(&assignment).unwrap(), 10.0 + 4.0 - 100.0);
        assignment.assign(id(4), Some(id(20)));
        assert_eq!(problem.total_utility(&assignment).unwrap(), 10.0 + 4.0 + 5.0);
    }

    #[test]
    fn test_duplicate_ids_across_roles_rejected() {
        let fire =
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(2)], vec![1.0], vec![1]).unwrap();
        let police =
            UtilityMatrix::new(Role::Police, vec![id(1)], vec![id(3)], vec![1.0], vec![1]).unwrap();
        assert!(matches!(
            ProblemDefinition::new(fire, police, PenaltyParams::default()),
            Err(DcopError::DuplicateEntity { .. })
        ));
    }
}
