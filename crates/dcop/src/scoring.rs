//! Marginal scoring of a candidate target given the picks of other agents.
//!
//! The protocol is: reset [`TargetScores`], register every *other* agent's
//! current pick with [`TargetScores::increase`], then call
//! [`ScoringFunction::score`] for each candidate. Scoring before the other
//! picks are registered gives meaningless results.

use crate::error::Result;
use crate::ids::{EntityId, Role};
use crate::problem::ProblemDefinition;
use std::collections::HashMap;

/// Per-evaluation count of other agents already claiming each target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetScores {
    counts: HashMap<EntityId, u32>,
}

impl TargetScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    pub fn increase(&mut self, target: EntityId) {
        *self.counts.entry(target).or_insert(0) += 1;
    }

    pub fn decrease(&mut self, target: EntityId) {
        if let Some(count) = self.counts.get_mut(&target) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(&target);
            }
        }
    }

    pub fn count(&self, target: EntityId) -> u32 {
        self.counts.get(&target).copied().unwrap_or(0)
    }
}

/// What an agent knows about the other team.
#[derive(Debug, Clone, Default)]
pub struct TeamView {
    /// Police agents per blockade.
    pub police_on: TargetScores,
    /// Current fire of every fire brigade.
    pub fire_choices: HashMap<EntityId, EntityId>,
}

/// Inputs of a score evaluation besides the agent and target themselves.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub problem: &'a ProblemDefinition,
    /// Other same-role agents' picks.
    pub scores: &'a TargetScores,
    /// Cross-team knowledge; only the team-aware functions read it.
    pub team: Option<&'a TeamView>,
}

/// Marginal value of `agent` picking `target` when `n_agents` others already
/// did.
pub trait ScoringFunction {
    fn score(
        &self,
        agent: EntityId,
        target: EntityId,
        context: &ScoringContext<'_>,
        n_agents: u32,
    ) -> Result<f64>;
}

/// `u(agent, target) − [penalty(target, n+1) − penalty(target, n)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PenaltyScoring;

impl ScoringFunction for PenaltyScoring {
    fn score(
        &self,
        agent: EntityId,
        target: EntityId,
        context: &ScoringContext<'_>,
        n_agents: u32,
    ) -> Result<f64> {
        let problem = context.problem;
        let utility = problem.utility(agent, target)?;
        let marginal =
            problem.utility_penalty(target, n_agents + 1)? - problem.utility_penalty(target, n_agents)?;
        Ok(utility - marginal)
    }
}

/// Penalty scoring plus the fire/police coordination terms.
///
/// A fire brigade pays the blocked-route penalty when its route to the fire
/// crosses any blockade nobody from the police attends. A police agent that
/// would be first on a blockade earns that penalty back for every brigade
/// heading through it whose route has no other unattended blockade left.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamScoring;

impl ScoringFunction for TeamScoring {
    fn score(
        &self,
        agent: EntityId,
        target: EntityId,
        context: &ScoringContext<'_>,
        n_agents: u32,
    ) -> Result<f64> {
        let base = PenaltyScoring.score(agent, target, context, n_agents)?;
        let Some(team) = context.team else {
            return Ok(base);
        };
        let problem = context.problem;
        let penalty = problem.blocked_fire_penalty();

        match problem.agent_role(agent)? {
            Role::Fire => {
                let blocked = problem
                    .blocking_blockades(agent, target)
                    .iter()
                    .any(|blockade| team.police_on.count(*blockade) == 0);
                Ok(if blocked { base - penalty } else { base })
            }
            Role::Police => {
                if n_agents > 0 {
                    return Ok(base);
                }
                let opened = problem
                    .routes_through(target)
                    .iter()
                    .filter(|(brigade, fire)| team.fire_choices.get(brigade) == Some(fire))
                    .filter(|(brigade, fire)| {
                        problem
                            .blocking_blockades(*brigade, *fire)
                            .iter()
                            .all(|other| *other == target || team.police_on.count(*other) > 0)
                    })
                    .count();
                Ok(base + penalty * opened as f64)
            }
        }
    }
}

/// Scoring function matching the problem's objective.
pub fn scoring_for(problem: &ProblemDefinition) -> &'static (dyn ScoringFunction + Sync) {
    if problem.team_coordination() {
        &TeamScoring
    } else {
        &PenaltyScoring
    }
}

/// Outcome of scanning an agent's candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestResponse {
    pub target: Option<EntityId>,
    pub score: f64,
    /// Score of the incumbent target, if the agent had one among its
    /// candidates.
    pub incumbent_score: Option<f64>,
    /// Score evaluations performed.
    pub checks: u64,
}

impl BestResponse {
    /// The best option differs from the incumbent, so it scores strictly
    /// better.
    pub fn improves(&self, incumbent: Option<EntityId>) -> bool {
        self.target != incumbent
    }
}

/// Scores every candidate and keeps the best. The incumbent wins ties, and
/// among equal challengers the first candidate wins.
///
/// With `allow_unassigned` staying unassigned is one more option worth 0.
/// It is weighed after the candidates, so an assigned agent only drops its
/// target when every candidate scores below 0.
pub fn best_response(
    scoring: &dyn ScoringFunction,
    agent: EntityId,
    incumbent: Option<EntityId>,
    candidates: &[EntityId],
    context: &ScoringContext<'_>,
    allow_unassigned: bool,
) -> Result<BestResponse> {
    let mut checks = 0;
    let mut best: Option<(Option<EntityId>, f64)> = None;
    let mut incumbent_score = None;

    match incumbent {
        Some(current) if candidates.contains(&current) => {
            let s = scoring.score(agent, current, context, context.scores.count(current))?;
            checks += 1;
            best = Some((Some(current), s));
            incumbent_score = Some(s);
        }
        None if allow_unassigned => best = Some((None, 0.0)),
        _ => {}
    }
    for target in candidates {
        if Some(*target) == incumbent {
            continue;
        }
        let s = scoring.score(agent, *target, context, context.scores.count(*target))?;
        checks += 1;
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((Some(*target), s));
        }
    }
    if allow_unassigned && incumbent.is_some() && best.map_or(true, |(_, b)| 0.0 > b) {
        best = Some((None, 0.0));
    }

    Ok(BestResponse {
        target: best.and_then(|(t, _)| t),
        score: best.map_or(f64::NEG_INFINITY, |(_, s)| s),
        incumbent_score,
        checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{PenaltyParams, UtilityMatrix};
    use crate::world::BlockedRoute;

    fn id(raw: u32) -> EntityId {
        EntityId(raw)
    }

    fn two_by_two() -> ProblemDefinition {
        let fire = UtilityMatrix::new(
            Role::Fire,
            vec![id(1), id(2)],
            vec![id(10), id(11)],
            vec![10.0, 1.0, 9.0, 2.0],
            vec![1, 1],
        )
        .unwrap();
        let police = UtilityMatrix::new(Role::Police, vec![id(3)], vec![id(20)], vec![4.0], vec![1])
            .unwrap();
        ProblemDefinition::new(fire, police, PenaltyParams { k: 20.0, alpha: 1.0 }).unwrap()
    }

    #[test]
    fn test_target_scores_protocol() {
        let mut scores = TargetScores::new();
        scores.increase(id(10));
        scores.increase(id(10));
        assert_eq!(scores.count(id(10)), 2);
        scores.decrease(id(10));
        assert_eq!(scores.count(id(10)), 1);
        scores.reset();
        assert_eq!(scores.count(id(10)), 0);
        scores.decrease(id(10));
        assert_eq!(scores.count(id(10)), 0);
    }

    #[test]
    fn test_penalty_scoring_is_marginal() {
        let problem = two_by_two();
        let scores = TargetScores::new();
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: None,
        };
        assert_eq!(PenaltyScoring.score(id(2), id(10), &ctx, 0).unwrap(), 9.0);
        // second agent on a single-agent target pays k * 1
        assert_eq!(PenaltyScoring.score(id(2), id(10), &ctx, 1).unwrap(), 9.0 - 20.0);
    }

    #[test]
    fn test_best_response_keeps_incumbent_on_tie() {
        let fire = UtilityMatrix::new(
            Role::Fire,
            vec![id(1)],
            vec![id(10), id(11)],
            vec![5.0, 5.0],
            vec![1, 1],
        )
        .unwrap();
        let police = UtilityMatrix::new(Role::Police, vec![], vec![], vec![], vec![]).unwrap();
        let problem = ProblemDefinition::new(fire, police, PenaltyParams::default()).unwrap();
        let scores = TargetScores::new();
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: None,
        };
        let candidates = [id(10), id(11)];
        let response =
            best_response(&PenaltyScoring, id(1), Some(id(11)), &candidates, &ctx, true).unwrap();
        assert_eq!(response.target, Some(id(11)));
        assert!(!response.improves(Some(id(11))));
        assert_eq!(response.checks, 2);
    }

    #[test]
    fn test_best_response_moves_away_from_crowded_target() {
        let problem = two_by_two();
        let mut scores = TargetScores::new();
        scores.increase(id(10));
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: None,
        };
        let candidates = problem.fire_neighbors(id(2)).unwrap().to_vec();
        let response =
            best_response(&PenaltyScoring, id(2), Some(id(10)), &candidates, &ctx, false).unwrap();
        assert_eq!(response.target, Some(id(11)));
        assert!(response.improves(Some(id(10))));
    }

    #[test]
    fn test_team_scoring_terms() {
        let problem = two_by_two()
            .with_blocked_routes(
                &[BlockedRoute {
                    agent: id(1),
                    fire: id(10),
                    blockade: id(20),
                }],
                50.0,
            )
            .with_team_coordination(true);
        let scores = TargetScores::new();
        let mut team = TeamView::default();
        team.fire_choices.insert(id(1), id(10));
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: Some(&team),
        };

        // blocked and unattended
        assert_eq!(TeamScoring.score(id(1), id(10), &ctx, 0).unwrap(), 10.0 - 50.0);
        // police clearing the blockade earns the brigade's penalty back
        assert_eq!(TeamScoring.score(id(3), id(20), &ctx, 0).unwrap(), 4.0 + 50.0);
        // but only the first police agent on it does
        assert_eq!(TeamScoring.score(id(3), id(20), &ctx, 1).unwrap(), 4.0 - 20.0);

        team.police_on.increase(id(20));
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: Some(&team),
        };
        assert_eq!(TeamScoring.score(id(1), id(10), &ctx, 0).unwrap(), 10.0);
    }

    #[test]
    fn test_best_response_drops_target_when_every_option_loses() {
        let problem = two_by_two();
        let mut scores = TargetScores::new();
        scores.increase(id(10));
        scores.increase(id(11));
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: None,
        };
        let candidates = [id(10), id(11)];

        // 9 - 20 on fire 10, 2 - 20 on fire 11
        let response =
            best_response(&PenaltyScoring, id(2), Some(id(10)), &candidates, &ctx, true).unwrap();
        assert_eq!(response.target, None);
        assert_eq!(response.score, 0.0);
        assert_eq!(response.incumbent_score, Some(9.0 - 20.0));
        assert!(response.improves(Some(id(10))));
        assert_eq!(response.checks, 2);

        // without the option the least bad fire wins
        let response =
            best_response(&PenaltyScoring, id(2), Some(id(10)), &candidates, &ctx, false).unwrap();
        assert_eq!(response.target, Some(id(11)));

        // an unassigned agent stays out
        let response = best_response(&PenaltyScoring, id(2), None, &candidates, &ctx, true).unwrap();
        assert_eq!(response.target, None);
        assert!(!response.improves(None));
    }

    #[test]
    fn test_route_through_two_blockades_needs_both_attended() {
        let fire =
            UtilityMatrix::new(Role::Fire, vec![id(1)], vec![id(10)], vec![10.0], vec![1]).unwrap();
        let police = UtilityMatrix::new(
            Role::Police,
            vec![id(3)],
            vec![id(20), id(21)],
            vec![5.0, 4.0],
            vec![1, 1],
        )
        .unwrap();
        let route = |blockade| BlockedRoute {
            agent: id(1),
            fire: id(10),
            blockade: id(blockade),
        };
        let problem = ProblemDefinition::new(fire, police, PenaltyParams { k: 20.0, alpha: 1.0 })
            .unwrap()
            .with_blocked_routes(&[route(20), route(21)], 100.0)
            .with_team_coordination(true);
        let scores = TargetScores::new();
        let mut team = TeamView::default();
        team.fire_choices.insert(id(1), id(10));
        team.police_on.increase(id(21));
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: Some(&team),
        };

        // 21 alone does not open the route
        assert_eq!(TeamScoring.score(id(1), id(10), &ctx, 0).unwrap(), 10.0 - 100.0);
        // the police agent taking 20 completes it
        assert_eq!(TeamScoring.score(id(3), id(20), &ctx, 0).unwrap(), 5.0 + 100.0);

        team.police_on.reset();
        let ctx = ScoringContext {
            problem: &problem,
            scores: &scores,
            team: Some(&team),
        };
        // with 21 unattended, clearing 20 alone earns nothing back
        assert_eq!(TeamScoring.score(id(3), id(20), &ctx, 0).unwrap(), 5.0);
        assert_eq!(TeamScoring.score(id(3), id(21), &ctx, 0).unwrap(), 4.0);
    }
}
