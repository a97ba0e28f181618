use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::users::UserService;
use crate::domain::notification::{Notification, NOTIFICATION_COLUMNS};
use crate::infra::db::Db;
use crate::realtime::events::{NotificationPush, ServerEvent};
use crate::realtime::{inbox_room, RealtimeHub};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MIN_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    SingleUser,
    AllUsers,
}

impl Audience {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single-user" => Some(Self::SingleUser),
            "all-users" => Some(Self::AllUsers),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Read,
    Unread,
}

impl StatusFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "read" => Some(Self::Read),
            "unread" => Some(Self::Unread),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastSummary {
    pub sent_to: usize,
    pub persisted: usize,
}

#[derive(Debug, Clone)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationSummary {
    pub total: i64,
    pub unread: i64,
    pub has_unread: bool,
    pub latest_notification: Option<Notification>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub latest_unread_at: Option<OffsetDateTime>,
}

/// Requested page parameters, normalized: `page` floors at 1, `limit`
/// clamps into [MIN_PAGE_SIZE, MAX_PAGE_SIZE].
pub fn normalize_page(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
    (page, limit)
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + limit - 1) / limit
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db: Db,
    realtime: RealtimeHub,
}

impl NotificationService {
    pub fn new(db: Db, realtime: RealtimeHub) -> Self {
        Self { db, realtime }
    }

    /// Persists one notification for `user_id`, then pushes it to the
    /// recipient's inbox room. Returns `None` when the target does not
    /// exist; nothing is persisted in that case. The push is advisory;
    /// a disconnected client reconciles via `list`.
    pub async fn send_to_user(
        &self,
        user_id: Uuid,
        notification_type: &str,
        title: &str,
        message: &str,
        payload: Option<Value>,
    ) -> Result<Option<Notification>> {
        let users = UserService::new(self.db.clone());
        if !users.exists(user_id).await? {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "INSERT INTO notifications (user_id, notification_type, title, message, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(notification_type)
        .bind(title)
        .bind(message)
        .bind(payload)
        .fetch_one(self.db.pool())
        .await?;

        let notification = Notification::from_row(&row);
        self.push(&notification);
        Ok(Some(notification))
    }

    /// Broadcast to every user holding the member role right now, as a
    /// point-in-time snapshot rather than a subscription.
    pub async fn broadcast_to_members(
        &self,
        notification_type: &str,
        title: &str,
        message: &str,
        payload: Option<Value>,
    ) -> Result<BroadcastSummary> {
        let users = UserService::new(self.db.clone());
        let recipients = users.member_ids().await?;
        self.broadcast(&recipients, notification_type, title, message, payload)
            .await
    }

    /// All rows land in one batch INSERT before any push goes out, so a
    /// client can never see a push for a row that is not durable yet.
    pub async fn broadcast(
        &self,
        recipients: &[Uuid],
        notification_type: &str,
        title: &str,
        message: &str,
        payload: Option<Value>,
    ) -> Result<BroadcastSummary> {
        if recipients.is_empty() {
            return Ok(BroadcastSummary {
                sent_to: 0,
                persisted: 0,
            });
        }

        let rows = sqlx::query(&format!(
            "INSERT INTO notifications (user_id, notification_type, title, message, payload) \
             SELECT recipient, $2, $3, $4, $5 FROM UNNEST($1::uuid[]) AS recipient \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(recipients)
        .bind(notification_type)
        .bind(title)
        .bind(message)
        .bind(payload)
        .fetch_all(self.db.pool())
        .await?;

        let persisted = rows.len();
        for row in &rows {
            self.push(&Notification::from_row(row));
        }

        Ok(BroadcastSummary {
            sent_to: recipients.len(),
            persisted,
        })
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        page: i64,
        limit: i64,
        status: StatusFilter,
    ) -> Result<NotificationPage> {
        let offset = (page - 1) * limit;
        let pool = self.db.pool();

        let items_fut = async {
            match status {
                StatusFilter::All => {
                    sqlx::query(&format!(
                        "SELECT {} FROM notifications \
                         WHERE user_id = $1 \
                         ORDER BY created_at DESC \
                         LIMIT $2 OFFSET $3",
                        NOTIFICATION_COLUMNS
                    ))
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                }
                StatusFilter::Read => {
                    sqlx::query(&format!(
                        "SELECT {} FROM notifications \
                         WHERE user_id = $1 AND is_read \
                         ORDER BY created_at DESC \
                         LIMIT $2 OFFSET $3",
                        NOTIFICATION_COLUMNS
                    ))
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                }
                StatusFilter::Unread => {
                    sqlx::query(&format!(
                        "SELECT {} FROM notifications \
                         WHERE user_id = $1 AND NOT is_read \
                         ORDER BY created_at DESC \
                         LIMIT $2 OFFSET $3",
                        NOTIFICATION_COLUMNS
                    ))
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                }
            }
        };

        let total_fut = async {
            match status {
                StatusFilter::All => {
                    sqlx::query_scalar::<_, i64>(
                        "SELECT COUNT(*) FROM notifications WHERE user_id = $1",
                    )
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
                }
                StatusFilter::Read => {
                    sqlx::query_scalar::<_, i64>(
                        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read",
                    )
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
                }
                StatusFilter::Unread => {
                    sqlx::query_scalar::<_, i64>(
                        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
                    )
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
                }
            }
        };

        // unread count is always against the unfiltered set
        let unread_fut = async {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await
        };

        let (rows, total, unread_count) = tokio::try_join!(items_fut, total_fut, unread_fut)?;

        let items = rows.iter().map(Notification::from_row).collect();
        Ok(NotificationPage {
            items,
            page,
            limit,
            total,
            total_pages: total_pages(total, limit),
            unread_count,
        })
    }

    /// Idempotent: an already-read notification re-confirms success and
    /// keeps its original `read_at`. `None` when the id does not exist or
    /// belongs to another user.
    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "UPDATE notifications \
             SET is_read = TRUE, read_at = COALESCE(read_at, now()) \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| Notification::from_row(&row)))
    }

    /// One UPDATE, one timestamp for the whole batch. Rows arriving while
    /// the statement runs may or may not be included; accepted race.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = TRUE, read_at = now() \
             WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<NotificationSummary> {
        let pool = self.db.pool();

        let total_fut = async {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await
        };
        let unread_fut = async {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await
        };
        let latest_fut = async {
            sqlx::query(&format!(
                "SELECT {} FROM notifications \
                 WHERE user_id = $1 \
                 ORDER BY created_at DESC \
                 LIMIT 1",
                NOTIFICATION_COLUMNS
            ))
            .bind(user_id)
            .fetch_optional(pool)
            .await
        };
        let latest_unread_fut = async {
            sqlx::query_scalar::<_, Option<OffsetDateTime>>(
                "SELECT MAX(created_at) FROM notifications WHERE user_id = $1 AND NOT is_read",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await
        };

        let (total, unread, latest, latest_unread_at) =
            tokio::try_join!(total_fut, unread_fut, latest_fut, latest_unread_fut)?;

        Ok(NotificationSummary {
            total,
            unread,
            has_unread: unread > 0,
            latest_notification: latest.map(|row| Notification::from_row(&row)),
            latest_unread_at,
        })
    }

    fn push(&self, notification: &Notification) {
        let room = inbox_room(notification.user_id);
        let delivered = self
            .realtime
            .emit_to_room(&room, ServerEvent::Notification(NotificationPush::from(notification)));
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            delivered,
            "pushed notification"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_limit_are_normalized() {
        assert_eq!(normalize_page(None, None), (1, 10));
        assert_eq!(normalize_page(Some(0), Some(0)), (1, 5));
        assert_eq!(normalize_page(Some(-3), Some(3)), (1, 5));
        assert_eq!(normalize_page(Some(3), Some(1000)), (3, 100));
        assert_eq!(normalize_page(Some(2), Some(25)), (2, 25));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(25, 10), 3);
    }

    #[test]
    fn audience_parsing() {
        assert_eq!(Audience::parse("single-user"), Some(Audience::SingleUser));
        assert_eq!(Audience::parse("all-users"), Some(Audience::AllUsers));
        assert_eq!(Audience::parse("everyone"), None);
    }

    #[test]
    fn status_filter_parsing() {
        assert_eq!(StatusFilter::parse("all"), Some(StatusFilter::All));
        assert_eq!(StatusFilter::parse("read"), Some(StatusFilter::Read));
        assert_eq!(StatusFilter::parse("unread"), Some(StatusFilter::Unread));
        assert_eq!(StatusFilter::parse("archived"), None);
    }
}
