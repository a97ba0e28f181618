use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_NOTIFICATION_TYPE: &str = "system";

/// One persisted notification. `is_read`/`read_at` are the only fields that
/// ever change after insert, and only ever false→true / null→timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub payload: Option<Value>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    /// Maps a `notifications` row selected with the full column list.
    /// Kept here so no query site re-invents the shape.
    pub fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            notification_type: row.get("notification_type"),
            title: row.get("title"),
            message: row.get("message"),
            payload: row.get("payload"),
            is_read: row.get("is_read"),
            read_at: row.get("read_at"),
            created_at: row.get("created_at"),
        }
    }
}

pub const NOTIFICATION_COLUMNS: &str =
    "id, user_id, notification_type, title, message, payload, is_read, read_at, created_at";
