use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::Coordinate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelClass {
    pub name: String,
    pub speed: u32,
}

/// Cached result of folding a unit's position stream.
///
/// `folded` counts the reports already summed into `total` and `last` is the
/// final one of them, so the next fold resumes at that index even when
/// several reports share a timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DistanceCache {
    pub total: u64,
    pub as_of: Option<DateTime<Utc>>,
    pub folded: usize,
    pub last: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub model: String,
    pub is_active: bool,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    pub distance: DistanceCache,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
