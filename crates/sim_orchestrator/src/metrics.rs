use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use dcop::SolveStats;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

/// A container for all Prometheus metric collectors for the sim_orchestrator.
///
/// Wrapped in an `Arc` and shared between the simulation loop and the
/// metrics server.
pub struct Metrics {
    pub registry: Registry,
    /// Timesteps the simulation has completed.
    pub timesteps_total: IntCounter,
    /// Synchronous rounds run over all timesteps.
    pub rounds_total: IntCounter,
    /// Non-concurrent constraint checks over all timesteps.
    pub nccc_total: IntCounter,
    pub constraint_checks_total: IntCounter,
    pub algorithm_messages_total: IntCounter,
    pub algorithm_bytes_total: IntCounter,
    pub other_messages_total: IntCounter,
    pub other_bytes_total: IntCounter,
    /// Timesteps whose solve returned an error.
    pub solve_errors_total: IntCounter,
    /// Timesteps whose solve ran out of its time budget.
    pub solve_timeouts_total: IntCounter,
    /// Bytes of assignment frames encoded for the kernel.
    pub kernel_bytes_total: IntCounter,
    pub final_utility: Gauge,
    pub best_utility: Gauge,
    pub repaired_utility: Gauge,
    pub reported_utility: Gauge,
    pub violations: IntGauge,
    pub iterations: IntGauge,
    /// Constraint checks per agent per round in the latest solve.
    pub average_checks: Gauge,
    pub solve_duration_seconds: Gauge,
    pub fires_extinguished_total: IntCounter,
    pub blockades_cleared_total: IntCounter,
    pub fires_active: IntGauge,
    pub blockades_active: IntGauge,
}

impl Metrics {
    /// Creates a new `Metrics` struct, initializing and registering all collectors.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("sim_orchestrator".into()), None)?;

        // Create, register and return a collector.
        macro_rules! reg {
            ($metric:expr) => {{
                let collector = $metric?;
                registry.register(Box::new(collector.clone()))?;
                collector
            }};
        }

        Ok(Self {
            timesteps_total: reg!(IntCounter::new("timesteps_total", "Timesteps simulated")),
            rounds_total: reg!(IntCounter::new("rounds_total", "Solver rounds run")),
            nccc_total: reg!(IntCounter::new(
                "nccc_total",
                "Non-concurrent constraint checks over all timesteps"
            )),
            constraint_checks_total: reg!(IntCounter::new(
                "constraint_checks_total",
                "Constraint checks summed over all agents"
            )),
            algorithm_messages_total: reg!(IntCounter::new(
                "algorithm_messages_total",
                "Messages exchanged by the DCOP algorithm"
            )),
            algorithm_bytes_total: reg!(IntCounter::new(
                "algorithm_bytes_total",
                "Bytes exchanged by the DCOP algorithm"
            )),
            other_messages_total: reg!(IntCounter::new(
                "other_messages_total",
                "Cross-team messages"
            )),
            other_bytes_total: reg!(IntCounter::new("other_bytes_total", "Cross-team bytes")),
            solve_errors_total: reg!(IntCounter::new(
                "solve_errors_total",
                "Timesteps whose solve failed"
            )),
            solve_timeouts_total: reg!(IntCounter::new(
                "solve_timeouts_total",
                "Timesteps whose solve hit the time budget"
            )),
            kernel_bytes_total: reg!(IntCounter::new(
                "kernel_bytes_total",
                "Bytes of assignment frames sent to the kernel"
            )),
            final_utility: reg!(Gauge::new(
                "final_utility",
                "Utility after the last round of the latest solve"
            )),
            best_utility: reg!(Gauge::new(
                "best_utility",
                "Best utility seen during the latest solve"
            )),
            repaired_utility: reg!(Gauge::new(
                "repaired_utility",
                "Utility after greedy repair in the latest solve"
            )),
            reported_utility: reg!(Gauge::new(
                "reported_utility",
                "Utility of the assignment reported for the latest timestep"
            )),
            violations: reg!(IntGauge::new(
                "violations",
                "Over-subscribed targets in the latest assignment"
            )),
            iterations: reg!(IntGauge::new(
                "iterations",
                "Rounds run by the latest solve"
            )),
            average_checks: reg!(Gauge::new(
                "average_checks",
                "Constraint checks per agent per round in the latest solve"
            )),
            solve_duration_seconds: reg!(Gauge::new(
                "solve_duration_seconds",
                "Wall-clock duration of the latest solve"
            )),
            fires_extinguished_total: reg!(IntCounter::new(
                "fires_extinguished_total",
                "Fires put out by assigned brigades"
            )),
            blockades_cleared_total: reg!(IntCounter::new(
                "blockades_cleared_total",
                "Blockades cleared by assigned police forces"
            )),
            fires_active: reg!(IntGauge::new("fires_active", "Fires still burning")),
            blockades_active: reg!(IntGauge::new("blockades_active", "Blockades not yet cleared")),
            registry,
        })
    }

    /// Creates an `axum::Router` that serves the metrics on the `/metrics` endpoint.
    pub fn router(&self) -> Router {
        let registry = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buffer) {
                        tracing::error!(error = %e, "Failed to encode metrics");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                    match String::from_utf8(buffer) {
                        Ok(body) => body.into_response(),
                        Err(e) => {
                            tracing::error!(error = %e, "Metrics buffer is not valid UTF-8");
                            StatusCode::INTERNAL_SERVER_ERROR.into_response()
                        }
                    }
                }
            }),
        )
    }

    /// Folds the statistics of one solve into the collectors.
    pub fn record_solve(&self, stats: &SolveStats) {
        self.rounds_total.inc_by(u64::from(stats.iterations));
        self.nccc_total.inc_by(stats.nccc);
        self.constraint_checks_total.inc_by(stats.total_checks);
        self.algorithm_messages_total.inc_by(stats.traffic.algorithm_messages);
        self.algorithm_bytes_total.inc_by(stats.traffic.algorithm_bytes);
        self.other_messages_total.inc_by(stats.traffic.other_messages);
        self.other_bytes_total.inc_by(stats.traffic.other_bytes);
        if stats.timed_out {
            self.solve_timeouts_total.inc();
        }

        self.final_utility.set(stats.final_utility);
        self.best_utility.set(stats.best_utility);
        self.repaired_utility
            .set(stats.repaired_utility.unwrap_or(stats.reported_utility));
        self.reported_utility.set(stats.reported_utility);
        self.violations.set(i64::from(stats.violations));
        self.iterations.set(i64::from(stats.iterations));
        self.average_checks.set(stats.average_checks());
        self.solve_duration_seconds.set(stats.elapsed_ms as f64 / 1_000.0);
    }

    /// Sets the gauges describing the world after a timestep.
    pub fn update_world(&self, fires: usize, blockades: usize) {
        self.fires_active.set(fires as i64);
        self.blockades_active.set(blockades as i64);
    }
}
