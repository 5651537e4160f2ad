use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rider account. Rides are requested on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}
