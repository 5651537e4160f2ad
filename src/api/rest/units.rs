use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::session::UnitSession;
use crate::auth::{issue_token, Identity};
use crate::engine::distance::total_distance;
use crate::engine::lifecycle::pending_notification;
use crate::engine::position::report_position;
use crate::error::AppError;
use crate::models::position::Coordinate;
use crate::models::ride_status::RideStage;
use crate::models::unit::{DistanceCache, ModelClass, Unit};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/models", post(register_model))
        .route("/units", post(create_unit).get(list_units))
        .route("/unit/activity", patch(update_unit_activity))
        .route("/unit/coordinate", post(post_coordinate))
        .route("/unit/distance", get(get_distance))
        .route("/unit/notification", get(get_notification))
}

#[derive(Deserialize)]
pub struct RegisterModelRequest {
    pub name: String,
    pub speed: u32,
}

/// The owner is identified by the unit register token it was issued.
#[derive(Deserialize)]
pub struct CreateUnitRequest {
    pub unit_register_token: String,
    pub name: String,
    pub model: String,
}

#[derive(Serialize)]
pub struct UnitRegistration {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub access_token: String,
}

#[derive(Deserialize)]
pub struct UpdateActivityRequest {
    pub is_active: bool,
}

#[derive(Serialize)]
pub struct CoordinateResponse {
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reached: Option<RideStage>,
}

#[derive(Serialize)]
pub struct DistanceResponse {
    pub unit_id: Uuid,
    pub total_distance: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

async fn register_model(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterModelRequest>,
) -> Result<Json<ModelClass>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("model name cannot be empty".to_string()));
    }

    let model = ModelClass {
        name: payload.name,
        speed: payload.speed,
    };
    state.store.register_model(model.clone());
    Ok(Json(model))
}

async fn create_unit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUnitRequest>,
) -> Result<Json<UnitRegistration>, AppError> {
    let owner_id = match state.sessions.resolve(&payload.unit_register_token) {
        Some(Identity::UnitEnrollment(owner_id)) => owner_id,
        _ => {
            return Err(AppError::Unauthorized(
                "invalid unit register token".to_string(),
            ))
        }
    };
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.model.trim().is_empty() {
        return Err(AppError::BadRequest("model cannot be empty".to_string()));
    }

    let now = Utc::now();
    let unit = Unit {
        id: Uuid::new_v4(),
        owner_id,
        name: payload.name,
        model: payload.model,
        is_active: false,
        access_token: issue_token(),
        distance: DistanceCache::default(),
        created_at: now,
        updated_at: now,
    };

    state.store.insert_unit(unit.clone())?;
    state
        .sessions
        .insert(&unit.access_token, Identity::Unit(unit.id));

    Ok(Json(UnitRegistration {
        id: unit.id,
        owner_id,
        access_token: unit.access_token,
    }))
}

async fn list_units(State(state): State<Arc<AppState>>) -> Json<Vec<Unit>> {
    Json(state.store.list_units())
}

async fn update_unit_activity(
    State(state): State<Arc<AppState>>,
    UnitSession(id): UnitSession,
    Json(payload): Json<UpdateActivityRequest>,
) -> Result<Json<Unit>, AppError> {
    let unit = state.store.set_unit_active(id, payload.is_active, Utc::now())?;
    Ok(Json(unit))
}

async fn post_coordinate(
    State(state): State<Arc<AppState>>,
    UnitSession(id): UnitSession,
    Json(payload): Json<Coordinate>,
) -> Result<Json<CoordinateResponse>, AppError> {
    let recorded_at = Utc::now();
    let reached =
        report_position(&state.store, id, payload, recorded_at)?.map(|entry| entry.stage);

    if let Some(stage) = reached {
        state
            .metrics
            .stage_transitions_total
            .with_label_values(&[stage.as_str()])
            .inc();
    }

    Ok(Json(CoordinateResponse {
        recorded_at,
        reached,
    }))
}

async fn get_distance(
    State(state): State<Arc<AppState>>,
    UnitSession(id): UnitSession,
) -> Result<Json<DistanceResponse>, AppError> {
    let distance = total_distance(&state.store, id)?;

    Ok(Json(DistanceResponse {
        unit_id: id,
        total_distance: distance.total,
        updated_at: distance.as_of,
    }))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    UnitSession(id): UnitSession,
) -> Result<Response, AppError> {
    let response = match pending_notification(&state.store, id)? {
        Some(entry) => Json(entry).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };

    Ok(response)
}
