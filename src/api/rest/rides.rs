use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::api::rest::session::{RequesterSession, Session, UnitSession};
use crate::auth::Identity;
use crate::engine::lifecycle::{create_ride, mark_notified, record_transition};
use crate::error::AppError;
use crate::models::position::Coordinate;
use crate::models::ride::Ride;
use crate::models::ride_status::{RideStage, StatusEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(post_ride))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/status", post(post_ride_status))
        .route("/rides/:id/notified", post(post_notified))
        .route("/fares/estimate", post(estimate_fare))
}

#[derive(Deserialize)]
pub struct CreateRideRequest {
    pub pickup: Coordinate,
    pub destination: Coordinate,
}

#[derive(Deserialize)]
pub struct FareRequest {
    pub pickup: Coordinate,
    pub destination: Coordinate,
}

#[derive(Serialize)]
pub struct FareResponse {
    pub fare: u64,
}

/// The reporting unit comes from the session; it must own the ride.
#[derive(Deserialize)]
pub struct RideStatusRequest {
    pub status: RideStage,
}

#[derive(Deserialize)]
pub struct NotifiedRequest {
    pub stage: RideStage,
}

#[derive(Serialize)]
pub struct NotifiedResponse {
    pub stamped: bool,
}

#[derive(Serialize)]
pub struct RideView {
    #[serde(flatten)]
    pub ride: Ride,
    pub stage: Option<RideStage>,
    pub fare: u64,
}

fn ride_view(state: &AppState, ride: Ride) -> Result<RideView, AppError> {
    let stage = state.store.history(ride.id)?.latest_stage();
    let fare = state.fares.fare(&ride.pickup, &ride.destination)?;
    Ok(RideView { ride, stage, fare })
}

fn ensure_assigned(ride: &Ride, unit_id: Uuid) -> Result<(), AppError> {
    if ride.unit_id != Some(unit_id) {
        return Err(AppError::BadRequest(format!(
            "unit {unit_id} is not assigned to ride {}",
            ride.id
        )));
    }
    Ok(())
}

async fn post_ride(
    State(state): State<Arc<AppState>>,
    RequesterSession(requester_id): RequesterSession,
    Json(payload): Json<CreateRideRequest>,
) -> Result<Json<RideView>, AppError> {
    let ride = create_ride(
        &state.store,
        requester_id,
        payload.pickup,
        payload.destination,
        Utc::now(),
    )?;
    state
        .metrics
        .stage_transitions_total
        .with_label_values(&[RideStage::Matching.as_str()])
        .inc();

    Ok(Json(ride_view(&state, ride)?))
}

/// Visible to the requester who opened the ride and to its assigned unit.
async fn get_ride(
    State(state): State<Arc<AppState>>,
    Session(caller): Session,
    Path(id): Path<Uuid>,
) -> Result<Json<RideView>, AppError> {
    let ride = state.store.ride(id)?;
    let visible = match caller {
        Identity::Requester(requester_id) => ride.requester_id == requester_id,
        Identity::Unit(unit_id) => ride.unit_id == Some(unit_id),
        _ => false,
    };
    if !visible {
        return Err(AppError::NotFound(format!("ride {id} not found")));
    }

    Ok(Json(ride_view(&state, ride)?))
}

async fn post_ride_status(
    State(state): State<Arc<AppState>>,
    UnitSession(unit_id): UnitSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<RideStatusRequest>,
) -> Result<Json<StatusEntry>, AppError> {
    ensure_assigned(&state.store.ride(id)?, unit_id)?;

    match record_transition(&state.store, id, payload.status, Utc::now()) {
        Ok(entry) => {
            state
                .metrics
                .stage_transitions_total
                .with_label_values(&[entry.stage.as_str()])
                .inc();
            Ok(Json(entry))
        }
        Err(err) => {
            if matches!(err, AppError::OutOfOrderTransition { .. }) {
                state.metrics.transition_rejections_total.inc();
            } else {
                warn!(ride_id = %id, error = %err, "stage transition failed");
            }
            Err(err)
        }
    }
}

async fn post_notified(
    State(state): State<Arc<AppState>>,
    UnitSession(unit_id): UnitSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotifiedRequest>,
) -> Result<Json<NotifiedResponse>, AppError> {
    ensure_assigned(&state.store.ride(id)?, unit_id)?;
    let stamped = mark_notified(&state.store, id, payload.stage, Utc::now())?;
    Ok(Json(NotifiedResponse { stamped }))
}

async fn estimate_fare(
    State(state): State<Arc<AppState>>,
    _caller: RequesterSession,
    Json(payload): Json<FareRequest>,
) -> Result<Json<FareResponse>, AppError> {
    let fare = state.fares.fare(&payload.pickup, &payload.destination)?;
    Ok(Json(FareResponse { fare }))
}
