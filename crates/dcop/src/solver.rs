//! Round controller.
//!
//! One call to [`DcopSolver::solve`] handles one simulation timestep: build
//! the problem, create an agent per entity (fire brigades first, then police
//! forces), run synchronous rounds until nobody reports room for
//! improvement, the round budget is spent or the wall-clock budget runs
//! out, and finally pick what to report.

use crate::agent::{
    AgentContext, DcopAgent, DsaAgent, GreedyAgent, MaxSumAgent, RandomAgent, SolverKind, TeamAgent,
};
use crate::assignment::Assignment;
use crate::comm::Mailbox;
use crate::config::SolverConfig;
use crate::error::Result;
use crate::factor_graph::MaxSumSession;
use crate::problem::ProblemDefinition;
use crate::repair::greedy_repair;
use crate::stats::{RoundTrace, SolveOutcome, SolveStats};
use crate::world::WorldSnapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What to report once the rounds are over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Best assignment seen, then repaired.
    AnytimeGreedy,
    /// Best assignment seen.
    Anytime,
    /// Last assignment, then repaired.
    Greedy,
    /// Last assignment.
    Plain,
}

impl OutputPolicy {
    pub fn from_flags(anytime: bool, greedy_correction: bool) -> Self {
        match (anytime, greedy_correction) {
            (true, true) => OutputPolicy::AnytimeGreedy,
            (true, false) => OutputPolicy::Anytime,
            (false, true) => OutputPolicy::Greedy,
            (false, false) => OutputPolicy::Plain,
        }
    }

    fn anytime(self) -> bool {
        matches!(self, OutputPolicy::AnytimeGreedy | OutputPolicy::Anytime)
    }

    fn repairs(self) -> bool {
        matches!(self, OutputPolicy::AnytimeGreedy | OutputPolicy::Greedy)
    }
}

#[derive(Debug, Clone)]
pub struct DcopSolver {
    config: Arc<SolverConfig>,
}

impl DcopSolver {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn kind(&self) -> SolverKind {
        self.config.dcop.algorithm
    }

    /// Builds the problem for `world` and solves it. `previous` is last
    /// timestep's assignment, used for hysteresis.
    pub fn solve(&self, world: &WorldSnapshot, previous: &Assignment) -> Result<SolveOutcome> {
        let problem = ProblemDefinition::build(
            world,
            previous,
            &self.config.problem,
            self.kind().team_coordination(),
        )?;
        self.solve_problem(problem)
    }

    pub fn solve_problem(&self, problem: ProblemDefinition) -> Result<SolveOutcome> {
        let context = AgentContext::new(Arc::new(problem), Arc::clone(&self.config));
        match self.kind() {
            SolverKind::Greedy => self.run::<GreedyAgent>(context),
            SolverKind::Random => self.run::<RandomAgent>(context),
            SolverKind::Dsa => self.run::<DsaAgent>(context),
            SolverKind::Team => self.run::<TeamAgent>(context),
            SolverKind::MaxSum => {
                let session = MaxSumSession::build(&context.problem, &self.config.maxsum)?;
                self.run::<MaxSumAgent>(context.with_session(Arc::new(session)))
            }
        }
    }

    fn run<A: DcopAgent>(&self, context: AgentContext) -> Result<SolveOutcome> {
        let started = Instant::now();
        let dcop = &self.config.dcop;
        let policy = OutputPolicy::from_flags(dcop.anytime, dcop.greedy_correction);
        let budget = (dcop.time_budget_ms > 0).then(|| Duration::from_millis(dcop.time_budget_ms));
        let problem = Arc::clone(&context.problem);

        let ids: Vec<_> = problem
            .fire_agents()
            .iter()
            .chain(problem.police_agents())
            .copied()
            .collect();
        let mut agents = ids
            .iter()
            .map(|id| A::initialize(&context, *id))
            .collect::<Result<Vec<A>>>()?;

        let mut stats = SolveStats::new(self.kind(), agents.len());
        let mut current = collect(&agents);
        let mut best_utility = problem.total_utility(&current)?;
        let mut best = current.clone();
        let mut mailbox = Mailbox::<A::Message>::new();

        for round in 0..dcop.iterations {
            for agent in agents.iter_mut() {
                agent.send_messages(mailbox.outbox());
            }
            let traffic = mailbox.flush();
            for agent in agents.iter_mut() {
                let inbox = mailbox.take(agent.id());
                agent.receive_messages(inbox);
            }

            let mut improvable = false;
            let mut nccc = 0;
            let mut checks = 0;
            for agent in agents.iter_mut() {
                improvable |= agent.improve_assignment()?;
                nccc = nccc.max(agent.constraint_checks());
                checks += agent.constraint_checks();
            }

            current = collect(&agents);
            let utility = problem.total_utility(&current)?;
            if utility > best_utility {
                best_utility = utility;
                best = current.clone();
            }
            stats.record_round(RoundTrace {
                round,
                utility,
                nccc,
                checks,
                traffic,
            });
            tracing::debug!(
                round,
                utility,
                nccc,
                messages = traffic.total_messages(),
                bytes = traffic.total_bytes(),
                improvable,
                "Round finished"
            );

            if !improvable {
                stats.converged = true;
                break;
            }
            if budget.is_some_and(|budget| started.elapsed() >= budget) {
                stats.timed_out = true;
                tracing::warn!(
                    round,
                    budget_ms = dcop.time_budget_ms,
                    "Time budget exhausted; stopping without repair"
                );
                break;
            }
        }

        stats.final_utility = problem.total_utility(&current)?;
        stats.best_utility = best_utility;

        let mut reported = if policy.anytime() { best } else { current };
        if policy.repairs() && !stats.timed_out {
            let repair = greedy_repair(&problem, &reported)?;
            stats.repaired_utility = Some(repair.after);
            stats.total_checks += repair.checks;
            reported = repair.assignment;
        }
        stats.reported_utility = problem.total_utility(&reported)?;
        stats.violations = problem.violations(&reported)?;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            solver = stats.solver,
            agents = stats.agents,
            iterations = stats.iterations,
            nccc = stats.nccc,
            messages = stats.traffic.total_messages(),
            bytes = stats.traffic.total_bytes(),
            final_utility = stats.final_utility,
            best_utility = stats.best_utility,
            repaired_utility = ?stats.repaired_utility,
            violations = stats.violations,
            converged = stats.converged,
            timed_out = stats.timed_out,
            "Solved timestep"
        );

        Ok(SolveOutcome {
            assignment: reported,
            stats,
        })
    }
}

fn collect<A: DcopAgent>(agents: &[A]) -> Assignment {
    let mut assignment = Assignment::new();
    for agent in agents {
        assignment.assign(agent.id(), agent.target());
    }
    assignment
}
