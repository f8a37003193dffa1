use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Validated event fields, used for both create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
    pub title: String,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
}
