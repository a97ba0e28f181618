use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::Notification;

/// What a connected client sees when a notification lands in its inbox
/// room. Subset of the persisted record; clients reconcile the rest via
/// the list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPush {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Notification> for NotificationPush {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            payload: notification.payload.clone(),
            created_at: notification.created_at,
        }
    }
}

/// Typing indicator relayed to the rest of a thread room, stamped with the
/// sender's verified identity. Extra fields pass through untouched.
#[derive(Debug, Clone, Serialize)]
pub struct TypingBroadcast {
    pub thread_id: String,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "notification")]
    Notification(NotificationPush),
    #[serde(rename = "friend-chat:ready")]
    Ready { user_id: Uuid },
    #[serde(rename = "auth-error")]
    AuthError { message: String },
    #[serde(rename = "friend-chat:typing")]
    Typing(TypingBroadcast),
    #[serde(rename = "validation-error")]
    ValidationError { message: String },
}

impl ServerEvent {
    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypingPayload {
    pub thread_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "auth")]
    Auth { token: String },
    #[serde(rename = "support-chat:join")]
    SupportJoin { user_id: String },
    #[serde(rename = "support-chat:leave")]
    SupportLeave { user_id: String },
    #[serde(rename = "support-chat:join-admin")]
    SupportJoinAdmin {
        #[serde(default)]
        admin_id: Option<String>,
    },
    #[serde(rename = "friend-chat:join-thread")]
    JoinThread { thread_id: String },
    #[serde(rename = "friend-chat:leave-thread")]
    LeaveThread { thread_id: String },
    #[serde(rename = "friend-chat:typing")]
    Typing(TypingPayload),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_use_wire_names() {
        let ready = serde_json::to_value(ServerEvent::Ready {
            user_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(ready["event"], "friend-chat:ready");
        assert_eq!(
            ready["data"]["user_id"],
            "00000000-0000-0000-0000-000000000000"
        );

        let err = serde_json::to_value(ServerEvent::auth_error("bad token")).unwrap();
        assert_eq!(err["event"], "auth-error");
        assert_eq!(err["data"]["message"], "bad token");
    }

    #[test]
    fn notification_push_skips_empty_payload() {
        let push = NotificationPush {
            id: Uuid::nil(),
            title: "t".into(),
            message: "m".into(),
            payload: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let value = serde_json::to_value(ServerEvent::Notification(push)).unwrap();
        assert_eq!(value["event"], "notification");
        assert!(value["data"].get("payload").is_none());
    }

    #[test]
    fn client_events_parse() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"support-chat:join","data":{"user_id":"u-17"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SupportJoin { user_id } => assert_eq!(user_id, "u-17"),
            other => panic!("unexpected event: {:?}", other),
        }

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"support-chat:join-admin","data":{}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SupportJoinAdmin { admin_id } => assert!(admin_id.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn typing_payload_keeps_extra_fields() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"friend-chat:typing","data":{"thread_id":"t9","is_typing":true}}"#,
        )
        .unwrap();
        let payload = match event {
            ClientEvent::Typing(payload) => payload,
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(payload.thread_id, "t9");
        assert_eq!(payload.extra["is_typing"], true);

        let broadcast = TypingBroadcast {
            thread_id: payload.thread_id,
            user_id: Uuid::nil(),
            extra: payload.extra,
        };
        let value = serde_json::to_value(ServerEvent::Typing(broadcast)).unwrap();
        assert_eq!(value["event"], "friend-chat:typing");
        assert_eq!(value["data"]["is_typing"], true);
        assert_eq!(value["data"]["thread_id"], "t9");
    }

    #[test]
    fn unknown_event_fails_to_parse() {
        let parsed: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"event":"friend-chat:launch-missiles","data":{}}"#);
        assert!(parsed.is_err());
    }
}
