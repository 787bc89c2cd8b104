use crate::kernel::decode_assignment;
use crate::state::{SimulationState, StatusReport};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// `/status` reports the run as JSON. `/assignment` returns the latest
/// kernel frame as `application/octet-stream`, `/assignment/pairs` the same
/// frame decoded.
pub fn router(state: Arc<SimulationState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/assignment", get(assignment))
        .route("/assignment/pairs", get(assignment_pairs))
        .with_state(state)
}

async fn status(State(state): State<Arc<SimulationState>>) -> Json<StatusReport> {
    Json(state.status())
}

async fn assignment(State(state): State<Arc<SimulationState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        state.last_frame(),
    )
}

#[derive(Debug, Serialize)]
struct FramePairs {
    time: u32,
    pairs: Vec<(u32, u32)>,
}

async fn assignment_pairs(State(state): State<Arc<SimulationState>>) -> Response {
    let frame = state.last_frame();
    if frame.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    match decode_assignment(frame) {
        Ok((time, assignment)) => Json(FramePairs {
            time,
            pairs: assignment
                .iter()
                .map(|(agent, target)| (agent.raw(), target.raw()))
                .collect(),
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Stored assignment frame is corrupt");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::encode_assignment;
    use crate::state::TimestepSummary;
    use dcop::{Assignment, EntityId, SolverKind};
    use uuid::Uuid;

    fn summary() -> TimestepSummary {
        TimestepSummary {
            time: 2,
            assigned: 1,
            iterations: 3,
            nccc: 6,
            average_checks: 1.5,
            final_utility: 1.0,
            best_utility: 1.0,
            repaired_utility: Some(1.5),
            reported_utility: 1.5,
            violations: 0,
            converged: true,
            timed_out: false,
            elapsed_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_pairs_are_empty_before_the_first_timestep() {
        let state = Arc::new(SimulationState::new(Uuid::new_v4(), SolverKind::Greedy));
        let response = assignment_pairs(State(state)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_status_and_pairs_follow_the_latest_timestep() {
        let state = Arc::new(SimulationState::new(Uuid::new_v4(), SolverKind::Team));
        let assignment: Assignment = [(EntityId(4), EntityId(1000))].into_iter().collect();
        state.record(summary(), encode_assignment(2, &assignment));

        let Json(report) = status(State(state.clone())).await;
        assert_eq!(report.solver, "team");
        assert_eq!(report.latest.map(|l| l.reported_utility), Some(1.5));

        let response = assignment_pairs(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
