use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ride_status::RideStage;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(
        "ride {}: cannot move from {} to {}",
        .ride_id,
        display_stage(.current),
        .requested
    )]
    OutOfOrderTransition {
        ride_id: Uuid,
        current: Option<RideStage>,
        requested: RideStage,
    },

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("retroactive position report: {0}")]
    RetroactiveReport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn display_stage(stage: &Option<RideStage>) -> String {
    match stage {
        Some(stage) => stage.to_string(),
        None => "<none>".to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::OutOfOrderTransition { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
            AppError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RetroactiveReport(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
