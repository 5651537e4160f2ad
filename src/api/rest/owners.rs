use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::session::OwnerSession;
use crate::auth::{issue_token, Identity};
use crate::engine::distance::total_distance;
use crate::engine::sales::{owner_sales, SalesReport};
use crate::error::AppError;
use crate::models::owner::Owner;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/owners", post(create_owner))
        .route("/owner/units", get(list_owner_units))
        .route("/owner/sales", get(get_owner_sales))
}

#[derive(Deserialize)]
pub struct CreateOwnerRequest {
    pub name: String,
}

/// Returned once at registration; the tokens are never shown again.
#[derive(Serialize)]
pub struct OwnerRegistration {
    pub id: Uuid,
    pub name: String,
    pub access_token: String,
    pub unit_register_token: String,
}

#[derive(Serialize)]
pub struct OwnerUnitView {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub active: bool,
    pub registered_at: i64,
    pub total_distance: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_distance_updated_at: Option<i64>,
}

/// Window bounds in epoch milliseconds; both ends inclusive.
#[derive(Deserialize)]
pub struct SalesQuery {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

async fn create_owner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOwnerRequest>,
) -> Result<Json<OwnerRegistration>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let owner = Owner {
        id: Uuid::new_v4(),
        name: payload.name,
        access_token: issue_token(),
        unit_register_token: issue_token(),
        created_at: Utc::now(),
    };

    state.store.insert_owner(owner.clone());
    state
        .sessions
        .insert(&owner.access_token, Identity::Owner(owner.id));
    state
        .sessions
        .insert(&owner.unit_register_token, Identity::UnitEnrollment(owner.id));

    Ok(Json(OwnerRegistration {
        id: owner.id,
        name: owner.name,
        access_token: owner.access_token,
        unit_register_token: owner.unit_register_token,
    }))
}

async fn list_owner_units(
    State(state): State<Arc<AppState>>,
    OwnerSession(id): OwnerSession,
) -> Result<Json<Vec<OwnerUnitView>>, AppError> {
    state.store.owner(id)?;

    let mut views = Vec::new();
    for unit in state.store.units_of_owner(id) {
        let distance = total_distance(&state.store, unit.id)?;
        views.push(OwnerUnitView {
            id: unit.id,
            name: unit.name,
            model: unit.model,
            active: unit.is_active,
            registered_at: unit.created_at.timestamp_millis(),
            total_distance: distance.total,
            total_distance_updated_at: distance.as_of.map(|at| at.timestamp_millis()),
        });
    }

    Ok(Json(views))
}

async fn get_owner_sales(
    State(state): State<Arc<AppState>>,
    OwnerSession(id): OwnerSession,
    Query(query): Query<SalesQuery>,
) -> Result<Json<SalesReport>, AppError> {
    let since = millis_or(query.since, DateTime::<Utc>::UNIX_EPOCH)?;
    let until = millis_or(query.until, DateTime::<Utc>::MAX_UTC)?;
    if since > until {
        return Err(AppError::BadRequest("since must not be after until".to_string()));
    }

    let report = owner_sales(&state.store, &state.fares, id, since, until)?;
    Ok(Json(report))
}

fn millis_or(raw: Option<i64>, default: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    match raw {
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| AppError::BadRequest(format!("timestamp {ms} out of range"))),
        None => Ok(default),
    }
}
