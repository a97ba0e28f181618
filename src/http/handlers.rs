use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::app::notifications::{
    normalize_page, Audience, BroadcastSummary, NotificationService, NotificationSummary,
    StatusFilter,
};
use crate::app::users::UserService;
use crate::domain::notification::{Notification, DEFAULT_NOTIFICATION_TYPE};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SendRequest {
    pub audience: String,
    pub target_user_id: Option<Uuid>,
    pub notification_type: Option<String>,
    pub title: String,
    pub message: String,
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    pub notification_type: Option<String>,
    pub title: String,
    pub message: String,
    pub payload: Option<Value>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SendResponse {
    Single(Notification),
    Broadcast(BroadcastSummary),
}

fn require_text<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{} is required", field)));
    }
    Ok(trimmed)
}

pub async fn send_notification(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<SendRequest>,
) -> Result<Json<SendResponse>, AppError> {
    let audience = Audience::parse(&payload.audience)
        .ok_or_else(|| AppError::bad_request("audience must be single-user or all-users"))?;
    let title = require_text(&payload.title, "title")?;
    let message = require_text(&payload.message, "message")?;
    let notification_type = payload
        .notification_type
        .as_deref()
        .unwrap_or(DEFAULT_NOTIFICATION_TYPE);

    let service = NotificationService::new(state.db.clone(), state.realtime.clone());

    match audience {
        Audience::SingleUser => {
            let target = payload
                .target_user_id
                .ok_or_else(|| AppError::bad_request("target_user_id is required"))?;
            let created = service
                .send_to_user(target, notification_type, title, message, payload.payload)
                .await
                .map_err(|err| {
                    tracing::error!(error = ?err, target = %target, "failed to send notification");
                    AppError::internal("failed to send notification")
                })?;
            match created {
                Some(notification) => Ok(Json(SendResponse::Single(notification))),
                None => Err(AppError::bad_request("target user not found")),
            }
        }
        Audience::AllUsers => {
            let summary = service
                .broadcast_to_members(notification_type, title, message, payload.payload)
                .await
                .map_err(|err| {
                    tracing::error!(error = ?err, "failed to broadcast notification");
                    AppError::internal("failed to broadcast notification")
                })?;
            Ok(Json(SendResponse::Broadcast(summary)))
        }
    }
}

pub async fn broadcast_notification(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Json<BroadcastSummary>, AppError> {
    let title = require_text(&payload.title, "title")?;
    let message = require_text(&payload.message, "message")?;
    let notification_type = payload
        .notification_type
        .as_deref()
        .unwrap_or(DEFAULT_NOTIFICATION_TYPE);

    let service = NotificationService::new(state.db.clone(), state.realtime.clone());
    let summary = service
        .broadcast_to_members(notification_type, title, message, payload.payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to broadcast notification");
            AppError::internal("failed to broadcast notification")
        })?;

    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Read-state & summary
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct NotificationListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    /// Admin-only override; regular callers always read their own inbox.
    pub user_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub unread_count: i64,
}

#[derive(Serialize)]
pub struct NotificationListResponse {
    pub items: Vec<Notification>,
    pub meta: PageMeta,
}

/// Resolves whose notifications the call operates on. An admin may pass
/// `user_id` to read another user's inbox; that target must exist.
async fn resolve_target_user(
    auth: &AuthUser,
    override_id: Option<Uuid>,
    state: &AppState,
) -> Result<Uuid, AppError> {
    let Some(target) = override_id else {
        return Ok(auth.user_id);
    };
    if target == auth.user_id {
        return Ok(target);
    }
    if !auth.is_admin() {
        return Err(AppError::forbidden("user_id override requires admin role"));
    }
    let users = UserService::new(state.db.clone());
    let exists = users.exists(target).await.map_err(|err| {
        tracing::error!(error = ?err, target = %target, "failed to resolve user");
        AppError::internal("failed to resolve user")
    })?;
    if !exists {
        return Err(AppError::bad_request("unknown user_id"));
    }
    Ok(target)
}

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<NotificationListResponse>, AppError> {
    let status = match query.status.as_deref() {
        None => StatusFilter::All,
        Some(value) => StatusFilter::parse(value)
            .ok_or_else(|| AppError::bad_request("status must be one of all, read, unread"))?,
    };
    let (page, limit) = normalize_page(query.page, query.limit);
    let user_id = resolve_target_user(&auth, query.user_id, &state).await?;

    let service = NotificationService::new(state.db.clone(), state.realtime.clone());
    let page = service
        .list(user_id, page, limit, status)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    Ok(Json(NotificationListResponse {
        meta: PageMeta {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages,
            unread_count: page.unread_count,
        },
        items: page.items,
    }))
}

pub async fn mark_notification_read(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Notification>, AppError> {
    let service = NotificationService::new(state.db.clone(), state.realtime.clone());
    let updated = service
        .mark_read(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, notification_id = %id, user_id = %auth.user_id, "failed to mark notification read");
            AppError::internal("failed to mark notification read")
        })?;

    match updated {
        Some(notification) => Ok(Json(notification)),
        None => Err(AppError::not_found("notification not found")),
    }
}

#[derive(Serialize)]
pub struct MarkAllResponse {
    pub updated: u64,
}

pub async fn mark_all_notifications_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MarkAllResponse>, AppError> {
    let service = NotificationService::new(state.db.clone(), state.realtime.clone());
    let updated = service.mark_all_read(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to mark all notifications read");
        AppError::internal("failed to mark all notifications read")
    })?;

    Ok(Json(MarkAllResponse { updated }))
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub user_id: Option<Uuid>,
}

pub async fn notification_summary(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<NotificationSummary>, AppError> {
    let user_id = resolve_target_user(&auth, query.user_id, &state).await?;

    let service = NotificationService::new(state.db.clone(), state.realtime.clone());
    let summary = service.summary(user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %user_id, "failed to load notification summary");
        AppError::internal("failed to load notification summary")
    })?;

    Ok(Json(summary))
}
