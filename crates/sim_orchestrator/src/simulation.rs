use crate::advance::advance;
use crate::kernel::encode_assignment;
use crate::metrics::Metrics;
use crate::state::{SimulationState, TimestepSummary};
use anyhow::Context;
use dcop::{Assignment, DcopSolver, WorldSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Drives the solver over consecutive timesteps of one scenario.
pub struct Simulation {
    pub solver: Arc<DcopSolver>,
    pub world: WorldSnapshot,
    pub metrics: Arc<Metrics>,
    pub state: Arc<SimulationState>,
    pub timesteps: u32,
    pub step_delay: Duration,
}

impl Simulation {
    /// Runs until the last timestep, until the world has nothing left to
    /// assign, or until shutdown is signalled. Returns the final assignment.
    ///
    /// A failed solve is logged and counted; the previous assignment stays
    /// in force for that timestep.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) -> anyhow::Result<Assignment> {
        let Simulation {
            solver,
            mut world,
            metrics,
            state,
            timesteps,
            step_delay,
        } = self;
        let agent_power = solver.config().problem.agent_power;
        let mut assignment = Assignment::new();
        metrics.update_world(world.fires.len(), world.blockades.len());

        for _ in 0..timesteps {
            // Dropping the sender also counts as shutdown.
            if shutdown.has_changed().unwrap_or(true) {
                tracing::info!(time = world.time, "Shutdown requested, stopping simulation");
                break;
            }
            if world.fires.is_empty() && world.blockades.is_empty() {
                tracing::info!(time = world.time, "No targets left, stopping simulation");
                break;
            }

            let time = world.time;
            let snapshot = world.clone();
            let previous = assignment.clone();
            let task_solver = solver.clone();
            let result = tokio::task::spawn_blocking(move || task_solver.solve(&snapshot, &previous))
                .await
                .context("Solver task panicked")?;

            match result {
                Ok(outcome) => {
                    metrics.record_solve(&outcome.stats);
                    let frame = encode_assignment(time, &outcome.assignment);
                    metrics.kernel_bytes_total.inc_by(frame.len() as u64);
                    tracing::info!(
                        time,
                        solver = outcome.stats.solver,
                        assigned = outcome.assignment.len(),
                        iterations = outcome.stats.iterations,
                        utility = outcome.stats.reported_utility,
                        violations = outcome.stats.violations,
                        frame_bytes = frame.len(),
                        "Timestep solved"
                    );
                    state.record(
                        TimestepSummary::new(time, outcome.assignment.len(), &outcome.stats),
                        frame,
                    );
                    assignment = outcome.assignment;
                }
                Err(e) => {
                    tracing::error!(time, error = %e, "Solve failed, keeping previous assignment");
                    metrics.solve_errors_total.inc();
                    state.record_failure();
                }
            }
            metrics.timesteps_total.inc();

            let report = advance(&mut world, &assignment, agent_power);
            metrics.fires_extinguished_total.inc_by(report.extinguished as u64);
            metrics.blockades_cleared_total.inc_by(report.cleared as u64);
            metrics.update_world(world.fires.len(), world.blockades.len());

            if !step_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(step_delay) => {}
                    _ = shutdown.changed() => {
                        tracing::info!(time = world.time, "Shutdown requested during step delay");
                        break;
                    }
                }
            }
        }

        state.finish();
        let status = state.status();
        tracing::info!(
            timesteps = status.totals.timesteps,
            solve_errors = status.totals.solve_errors,
            cumulative_utility = status.totals.cumulative_utility,
            nccc = status.totals.nccc,
            "Simulation finished"
        );
        Ok(assignment)
    }
}
