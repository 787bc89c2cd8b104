//! Per-timestep solver statistics.

use crate::agent::SolverKind;
use crate::assignment::Assignment;
use crate::comm::TrafficReport;
use serde::Serialize;

/// One completed round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoundTrace {
    pub round: u32,
    /// Total utility of the agents' picks at the end of the round.
    pub utility: f64,
    /// Maximum constraint checks of any single agent this round.
    pub nccc: u64,
    /// Sum of constraint checks over all agents this round.
    pub checks: u64,
    pub traffic: TrafficReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolveStats {
    pub solver: &'static str,
    pub agents: usize,
    pub iterations: u32,
    /// Sum over rounds of the per-round maximum.
    pub nccc: u64,
    pub total_checks: u64,
    pub traffic: TrafficReport,
    /// Utility of the agents' picks after the last round.
    pub final_utility: f64,
    /// Best utility seen at the end of any round (or at initialisation).
    pub best_utility: f64,
    /// Utility after greedy repair, when it ran.
    pub repaired_utility: Option<f64>,
    /// Utility of the reported assignment.
    pub reported_utility: f64,
    pub violations: u32,
    pub converged: bool,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub rounds: Vec<RoundTrace>,
}

impl SolveStats {
    pub(crate) fn new(solver: SolverKind, agents: usize) -> Self {
        Self {
            solver: solver.name(),
            agents,
            iterations: 0,
            nccc: 0,
            total_checks: 0,
            traffic: TrafficReport::default(),
            final_utility: 0.0,
            best_utility: f64::NEG_INFINITY,
            repaired_utility: None,
            reported_utility: 0.0,
            violations: 0,
            converged: false,
            timed_out: false,
            elapsed_ms: 0,
            rounds: Vec::new(),
        }
    }

    pub(crate) fn record_round(&mut self, trace: RoundTrace) {
        self.iterations += 1;
        self.nccc += trace.nccc;
        self.total_checks += trace.checks;
        self.traffic.merge(&trace.traffic);
        self.rounds.push(trace);
    }

    /// Constraint checks per agent per round.
    pub fn average_checks(&self) -> f64 {
        let samples = self.agents as u64 * u64::from(self.iterations);
        if samples == 0 {
            0.0
        } else {
            self.total_checks as f64 / samples as f64
        }
    }
}

/// Result of solving one timestep.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub assignment: Assignment,
    pub stats: SolveStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_accumulate() {
        let mut stats = SolveStats::new(SolverKind::Dsa, 2);
        let mut traffic = TrafficReport::default();
        traffic.record(crate::comm::MessageCategory::Algorithm, 8);
        for round in 0..3 {
            stats.record_round(RoundTrace {
                round,
                utility: 1.0,
                nccc: 4,
                checks: 6,
                traffic,
            });
        }
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.nccc, 12);
        assert_eq!(stats.traffic.algorithm_bytes, 24);
        assert_eq!(stats.average_checks(), 3.0);
    }

    #[test]
    fn test_average_without_rounds_is_zero() {
        assert_eq!(SolveStats::new(SolverKind::Greedy, 0).average_checks(), 0.0);
    }
}
