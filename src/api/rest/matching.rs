use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;

use crate::engine::matching::dispatch;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/internal/matching", post(run_cycle))
        .route("/assignments", get(list_assignments))
}

/// Scheduler trigger. Answers 204 whether or not anything was assigned.
async fn run_cycle(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    tokio::task::spawn_blocking(move || dispatch(&state))
        .await
        .map_err(|err| AppError::Internal(format!("matching task failed: {err}")))??;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by(|a, b| {
        a.assigned_at
            .cmp(&b.assigned_at)
            .then(a.ride_id.cmp(&b.ride_id))
    });

    Json(assignments)
}
