//! Extractors resolving the caller from an `Authorization: Bearer` token.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::AppError;
use crate::state::AppState;

/// Any authenticated caller.
pub struct Session(pub Identity);

pub struct RequesterSession(pub Uuid);

pub struct OwnerSession(pub Uuid);

pub struct UnitSession(pub Uuid);

fn bearer_identity(parts: &Parts, state: &AppState) -> Result<Identity, AppError> {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    state
        .sessions
        .resolve(token)
        .ok_or_else(|| AppError::Unauthorized("invalid access token".to_string()))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        bearer_identity(parts, state).map(Session)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequesterSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_identity(parts, state)? {
            Identity::Requester(id) => Ok(RequesterSession(id)),
            _ => Err(AppError::Unauthorized("requester session required".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OwnerSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_identity(parts, state)? {
            Identity::Owner(id) => Ok(OwnerSession(id)),
            _ => Err(AppError::Unauthorized("owner session required".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for UnitSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_identity(parts, state)? {
            Identity::Unit(id) => Ok(UnitSession(id)),
            _ => Err(AppError::Unauthorized("unit session required".to_string())),
        }
    }
}
