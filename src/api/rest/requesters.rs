use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{issue_token, Identity};
use crate::error::AppError;
use crate::models::requester::Requester;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/requesters", post(create_requester))
}

#[derive(Deserialize)]
pub struct CreateRequesterRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct RequesterRegistration {
    pub id: Uuid,
    pub access_token: String,
}

async fn create_requester(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequesterRequest>,
) -> Result<Json<RequesterRegistration>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let requester = Requester {
        id: Uuid::new_v4(),
        name: payload.name,
        access_token: issue_token(),
        created_at: Utc::now(),
    };

    state.store.insert_requester(requester.clone());
    state
        .sessions
        .insert(&requester.access_token, Identity::Requester(requester.id));

    Ok(Json(RequesterRegistration {
        id: requester.id,
        access_token: requester.access_token,
    }))
}
