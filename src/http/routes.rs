use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::realtime::session;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/send", post(handlers::send_notification))
        .route(
            "/notifications/broadcast",
            post(handlers::broadcast_notification),
        )
        .route(
            "/notifications/summary",
            get(handlers::notification_summary),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
}

pub fn realtime() -> Router<AppState> {
    Router::new().route("/realtime", get(session::ws_handler))
}
