// crates/sim_orchestrator/src/main.rs
mod advance;
mod config;
mod kernel;
mod metrics;
mod scenario;
mod simulation;
mod state;
mod status;

use crate::config::Cli;
use crate::metrics::Metrics;
use crate::simulation::Simulation;
use crate::state::SimulationState;
use anyhow::Context;
use clap::Parser;
use dcop::DcopSolver;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let solver_config = cli.solver_config()?;
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, cli = ?cli, config = ?solver_config, "Loaded configuration");

    let world = match &cli.scenario {
        Some(path) => scenario::load(path)?,
        None => {
            let seed = cli.seed.unwrap_or(solver_config.dcop.seed);
            tracing::info!(seed, "No scenario given, generating a random world");
            scenario::generate(&cli.generator(), seed)
        }
    };

    let kind = solver_config.dcop.algorithm;
    let solver = Arc::new(DcopSolver::new(solver_config).context("Failed to create solver")?);
    let metrics = Arc::new(Metrics::new().context("Failed to create metrics registry")?);
    let state = Arc::new(SimulationState::new(run_id, kind));

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Spawn the metrics and status server
    let server_handle = {
        let router = metrics.router().merge(status::router(state.clone()));
        let addr = cli.metrics_listen_addr;
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind metrics server to {addr}"))?;
            tracing::info!(%addr, "Metrics server listening");
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await?;
            Ok::<(), anyhow::Error>(())
        })
    };

    let simulation = Simulation {
        solver,
        world,
        metrics,
        state,
        timesteps: cli.timesteps,
        step_delay: cli.step_delay(),
    };
    let mut simulation_handle = tokio::spawn(simulation.run(shutdown_rx));

    let interrupted = tokio::select! {
        res = &mut simulation_handle => {
            report_simulation(res);
            false
        }
        _ = shutdown_signal() => true,
    };

    if interrupted {
        tracing::info!("Shutdown signal received. Stopping simulation...");
        drop(shutdown_tx);
        report_simulation(simulation_handle.await);
    } else {
        if cli.serve {
            tracing::info!("Simulation done. Serving metrics until a shutdown signal...");
            shutdown_signal().await;
        }
        drop(shutdown_tx);
    }

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Metrics server failed."),
        Err(e) => tracing::error!(error = %e, "Metrics server task failed."),
    }

    tracing::info!("Orchestrator shut down gracefully.");
    Ok(())
}

fn report_simulation(
    res: Result<anyhow::Result<dcop::Assignment>, tokio::task::JoinError>,
) {
    match res {
        Ok(Ok(assignment)) => {
            tracing::info!(assigned = assignment.len(), "Simulation task completed.")
        }
        Ok(Err(e)) => tracing::error!(error = %e, "Simulation failed."),
        Err(e) => tracing::error!(error = %e, "Simulation task failed."),
    }
}

/// Listens for OS shutdown signals (SIGINT, SIGTERM) and resolves when one is received.
///
/// If a handler cannot be installed the corresponding branch never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
