//! User activity log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Activity type for a connection brought back to ACTIVE by recovery
pub const CONNECTION_RECOVERED: &str = "connection_recovered";
/// Activity type for an auto-disabled connection
pub const CONNECTION_DISABLED: &str = "connection_disabled";

/// Append-only record of something that happened to a user's data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_type: String,
    pub detail: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl UserActivity {
    pub fn new(
        user_id: Uuid,
        activity_type: impl Into<String>,
        detail: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            activity_type: activity_type.into(),
            detail: detail.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}
