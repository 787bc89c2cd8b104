use bytes::Bytes;
use chrono::{DateTime, Utc};
use dcop::{SolveStats, SolverKind};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// What the status endpoint reports about the most recent timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestepSummary {
    pub time: u32,
    pub assigned: usize,
    pub iterations: u32,
    pub nccc: u64,
    /// Constraint checks per agent per round.
    pub average_checks: f64,
    pub final_utility: f64,
    pub best_utility: f64,
    pub repaired_utility: Option<f64>,
    pub reported_utility: f64,
    pub violations: u32,
    pub converged: bool,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl TimestepSummary {
    pub fn new(time: u32, assigned: usize, stats: &SolveStats) -> Self {
        Self {
            time,
            assigned,
            iterations: stats.iterations,
            nccc: stats.nccc,
            average_checks: stats.average_checks(),
            final_utility: stats.final_utility,
            best_utility: stats.best_utility,
            repaired_utility: stats.repaired_utility,
            reported_utility: stats.reported_utility,
            violations: stats.violations,
            converged: stats.converged,
            timed_out: stats.timed_out,
            elapsed_ms: stats.elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub timesteps: u32,
    pub solve_errors: u32,
    pub cumulative_utility: f64,
    pub nccc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub run_id: String,
    pub solver: &'static str,
    pub started_at: String,
    pub finished: bool,
    pub totals: RunTotals,
    pub latest: Option<TimestepSummary>,
}

/// State shared between the simulation loop and the status server.
pub struct SimulationState {
    pub run_id: Uuid,
    pub solver: SolverKind,
    pub started_at: DateTime<Utc>,
    latest: RwLock<Option<TimestepSummary>>,
    totals: RwLock<RunTotals>,
    last_frame: RwLock<Bytes>,
    finished: RwLock<bool>,
}

impl SimulationState {
    pub fn new(run_id: Uuid, solver: SolverKind) -> Self {
        Self {
            run_id,
            solver,
            started_at: Utc::now(),
            latest: RwLock::new(None),
            totals: RwLock::new(RunTotals::default()),
            last_frame: RwLock::new(Bytes::new()),
            finished: RwLock::new(false),
        }
    }

    /// Stores the outcome of a solved timestep and the frame sent for it.
    pub fn record(&self, summary: TimestepSummary, frame: Bytes) {
        {
            let mut totals = self.totals.write();
            totals.timesteps += 1;
            totals.cumulative_utility += summary.reported_utility;
            totals.nccc += summary.nccc;
        }
        *self.latest.write() = Some(summary);
        *self.last_frame.write() = frame;
    }

    /// Counts a timestep whose solve failed. The previous frame stays current.
    pub fn record_failure(&self) {
        let mut totals = self.totals.write();
        totals.timesteps += 1;
        totals.solve_errors += 1;
    }

    pub fn finish(&self) {
        *self.finished.write() = true;
    }

    pub fn last_frame(&self) -> Bytes {
        self.last_frame.read().clone()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            run_id: self.run_id.to_string(),
            solver: self.solver.name(),
            started_at: self.started_at.to_rfc3339(),
            finished: *self.finished.read(),
            totals: self.totals.read().clone(),
            latest: self.latest.read().clone(),
        }
    }
}
