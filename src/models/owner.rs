use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    /// Presented by a new unit to register itself under this owner.
    #[serde(skip_serializing, default)]
    pub unit_register_token: String,
    pub created_at: DateTime<Utc>,
}
