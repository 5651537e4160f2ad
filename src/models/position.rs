use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub latitude: i64,
    pub longitude: i64,
}

impl Coordinate {
    pub fn new(latitude: i64, longitude: i64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One reading in a unit's append-only position stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionReport {
    pub unit_id: Uuid,
    pub coordinate: Coordinate,
    pub created_at: DateTime<Utc>,
}
