//! Sequential greedy repair.
//!
//! Agents are visited once, fire brigades first and then police forces, in
//! ascending id order. Each one takes its best response to the assignment
//! as it stands at that point, including the choices already revised
//! earlier in the same pass. Staying unassigned is always one of the
//! options. Every score is the exact change in total utility, so a pass can
//! only raise the objective.

use crate::assignment::Assignment;
use crate::error::{DcopError, Result};
use crate::ids::{EntityId, Role};
use crate::problem::ProblemDefinition;
use crate::scoring::{best_response, scoring_for, ScoringContext, TargetScores, TeamView};

/// Tolerance for floating-point noise when comparing before/after totals.
const REGRESSION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub assignment: Assignment,
    pub before: f64,
    pub after: f64,
    /// Agents whose target changed.
    pub changes: usize,
    pub checks: u64,
}

pub fn greedy_repair(problem: &ProblemDefinition, assignment: &Assignment) -> Result<RepairOutcome> {
    let before = problem.total_utility(assignment)?;
    let mut repaired = assignment.clone();
    let scoring = scoring_for(problem);
    let mut changes = 0;
    let mut checks = 0;

    let mut order: Vec<EntityId> = Vec::new();
    for role in Role::ALL {
        let mut agents = problem.matrix(role).agents().to_vec();
        agents.sort_unstable();
        order.extend(agents);
    }

    let mut scores = TargetScores::new();
    let mut team = TeamView::default();
    for agent in order {
        let incumbent = repaired.target(agent);
        scores.reset();
        team.police_on.reset();
        team.fire_choices.clear();
        for (other, target) in repaired.iter() {
            if other != agent {
                scores.increase(target);
            }
            match problem.agent_role(other)? {
                Role::Fire => {
                    team.fire_choices.insert(other, target);
                }
                Role::Police if other != agent => team.police_on.increase(target),
                Role::Police => {}
            }
        }

        let context = ScoringContext {
            problem,
            scores: &scores,
            team: Some(&team),
        };
        let candidates = problem.matrix(problem.agent_role(agent)?).candidates(agent)?;
        let response = best_response(scoring, agent, incumbent, candidates, &context, true)?;
        checks += response.checks;

        if response.improves(incumbent) {
            tracing::trace!(%agent, from = ?incumbent, to = ?response.target, "Repair move");
            repaired.assign(agent, response.target);
            changes += 1;
        }
    }

    let after = problem.total_utility(&repaired)?;
    if after < before - REGRESSION_TOLERANCE * before.abs().max(1.0) {
        tracing::error!(before, after, "Greedy repair lowered total utility");
        return Err(DcopError::RepairRegression { before, after });
    }
    tracing::debug!(before, after, changes, "Greedy repair finished");

    Ok(RepairOutcome {
        assignment: repaired,
        before,
        after,
        changes,
        checks,
    })
}
