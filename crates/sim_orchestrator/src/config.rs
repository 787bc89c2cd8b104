use crate::scenario::GeneratorConfig;
use anyhow::Context;
use clap::Parser;
use dcop::{SolverConfig, SolverKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// `sim_orchestrator` - drives a DCOP solver over a simulated rescue scenario.
///
/// Every timestep the orchestrator hands the current world snapshot to the
/// configured solver, encodes the resulting assignment for the kernel,
/// advances the world a little and exports the solver statistics.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML file with the solver configuration (`[dcop]`, `[dsa]`,
    /// `[maxsum]`, `[problem]`). Defaults apply when omitted.
    #[arg(long, env = "DCOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// TOML scenario describing the initial world. A random world is
    /// generated when omitted.
    #[arg(long, env = "SCENARIO_PATH")]
    pub scenario: Option<PathBuf>,

    /// Number of timesteps to simulate.
    #[arg(long, env = "TIMESTEPS", default_value_t = 10)]
    pub timesteps: u32,

    /// Overrides `dcop.algorithm`.
    #[arg(long, env = "DCOP_ALGORITHM")]
    pub algorithm: Option<SolverKind>,

    /// Overrides `dcop.seed` and seeds the scenario generator.
    #[arg(long, env = "SIM_SEED")]
    pub seed: Option<u64>,

    /// The listen address for the Prometheus metrics and status server.
    #[arg(long, env = "ORCHESTRATOR_METRICS_LISTEN_ADDR", default_value = "0.0.0.0:9091")]
    pub metrics_listen_addr: SocketAddr,

    /// Pause between timesteps, in milliseconds.
    #[arg(long, env = "STEP_DELAY_MS", default_value_t = 0)]
    pub step_delay_ms: u64,

    /// Keep serving metrics after the last timestep until a shutdown signal.
    #[arg(long, env = "SERVE_AFTER_RUN")]
    pub serve: bool,

    #[arg(long, default_value_t = 6)]
    pub generate_fire_agents: u32,

    #[arg(long, default_value_t = 3)]
    pub generate_police_agents: u32,

    #[arg(long, default_value_t = 4)]
    pub generate_fires: u32,

    #[arg(long, default_value_t = 3)]
    pub generate_blockades: u32,

    /// Number of (brigade, fire) routes the generator marks as blocked.
    #[arg(long, default_value_t = 3)]
    pub generate_blocked_routes: u32,

    /// Side of the square map the generator places entities on, in millimetres.
    #[arg(long, default_value_t = 100_000.0)]
    pub map_size: f64,
}

impl Cli {
    /// Loads the solver configuration file, if any, and applies the
    /// command-line overrides.
    pub fn solver_config(&self) -> anyhow::Result<SolverConfig> {
        let mut config = match &self.config {
            Some(path) => dcop::load_config(path)
                .with_context(|| format!("Failed to load solver config from {}", path.display()))?,
            None => SolverConfig::default(),
        };
        if let Some(algorithm) = self.algorithm {
            config.dcop.algorithm = algorithm;
        }
        if let Some(seed) = self.seed {
            config.dcop.seed = seed;
        }
        config.validate().context("Invalid solver configuration")?;
        Ok(config)
    }

    pub fn generator(&self) -> GeneratorConfig {
        GeneratorConfig {
            fire_agents: self.generate_fire_agents,
            police_agents: self.generate_police_agents,
            fires: self.generate_fires,
            blockades: self.generate_blockades,
            blocked_routes: self.generate_blocked_routes,
            map_size: self.map_size,
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}
