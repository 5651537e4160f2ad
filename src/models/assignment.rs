use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub ride_id: Uuid,
    pub unit_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}
