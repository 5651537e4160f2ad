pub mod matching;
pub mod owners;
pub mod requesters;
pub mod rides;
pub mod session;
pub mod units;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(owners::router())
        .merge(requesters::router())
        .merge(units::router())
        .merge(rides::router())
        .merge(matching::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    owners: usize,
    units: usize,
    rides: usize,
    waiting_rides: usize,
    assignments: usize,
    sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        owners: state.store.owner_count(),
        units: state.store.unit_count(),
        rides: state.store.ride_count(),
        waiting_rides: state.store.waiting_ride_count()?,
        assignments: state.assignments.len(),
        sessions: state.sessions.len(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
