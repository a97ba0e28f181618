use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;

use crate::app::auth::{AuthSession, TokenService};
use crate::realtime::events::{ClientEvent, ServerEvent, TypingBroadcast};
use crate::realtime::{
    inbox_room, support_admin_room, support_user_room, thread_room, ConnId, RealtimeHub,
    SUPPORT_ADMINS_ROOM,
};
use crate::AppState;

const HEARTBEAT_SECONDS: u64 = 30;

#[derive(Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Token source priority at handshake: the connection query parameter,
/// then the `Authorization: Bearer` header. An explicit `auth` client
/// event outranks both and may (re)bind an open connection.
pub fn handshake_token(query_token: Option<String>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query_token {
        if !token.trim().is_empty() {
            return Some(token);
        }
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = handshake_token(params.token, &headers);
    let hub = state.realtime.clone();
    let tokens = TokenService::new(state.paseto_access_key, state.access_ttl_minutes);
    ws.on_upgrade(move |socket| serve_connection(socket, hub, tokens, token))
}

async fn serve_connection(
    socket: WebSocket,
    hub: RealtimeHub,
    tokens: TokenService,
    handshake: Option<String>,
) {
    let (conn, mut rx) = hub.register();
    let mut session = RealtimeSession::new(conn, hub.clone(), tokens);
    session.handle_handshake(handshake);

    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECONDS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::error!(error = ?err, "failed to encode realtime event");
                        continue;
                    }
                };
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => session.handle_frame(&text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }

    hub.unregister(conn);
}

/// Per-connection state: the bound identity (if any) and the room
/// operations the client may perform. Everything here is synchronous; the
/// websocket loop above owns all I/O.
pub struct RealtimeSession {
    conn: ConnId,
    hub: RealtimeHub,
    tokens: TokenService,
    identity: Option<AuthSession>,
}

impl RealtimeSession {
    pub fn new(conn: ConnId, hub: RealtimeHub, tokens: TokenService) -> Self {
        Self {
            conn,
            hub,
            tokens,
            identity: None,
        }
    }

    pub fn identity(&self) -> Option<&AuthSession> {
        self.identity.as_ref()
    }

    /// Absent or unverifiable tokens leave the connection open but
    /// unauthenticated; it may still drive the support-chat events.
    pub fn handle_handshake(&mut self, token: Option<String>) {
        match token {
            Some(token) => self.authenticate(&token),
            None => {
                self.send_self(ServerEvent::auth_error("missing authentication token"));
            }
        }
    }

    pub fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event),
            Err(_) => self.send_self(ServerEvent::validation_error("malformed event")),
        }
    }

    pub fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Auth { token } => self.authenticate(&token),
            ClientEvent::SupportJoin { user_id } => {
                let Some(user_id) = non_empty(&user_id) else {
                    self.send_self(ServerEvent::validation_error("user_id is required"));
                    return;
                };
                // no ownership check; admin consoles join customers'
                // support rooms through this same event
                self.hub.join(self.conn, &support_user_room(user_id));
            }
            ClientEvent::SupportLeave { user_id } => {
                let Some(user_id) = non_empty(&user_id) else {
                    self.send_self(ServerEvent::validation_error("user_id is required"));
                    return;
                };
                self.hub.leave(self.conn, &support_user_room(user_id));
            }
            ClientEvent::SupportJoinAdmin { admin_id } => {
                self.hub.join(self.conn, SUPPORT_ADMINS_ROOM);
                if let Some(admin_id) = admin_id.as_deref().and_then(non_empty) {
                    self.hub.join(self.conn, &support_admin_room(admin_id));
                }
            }
            ClientEvent::JoinThread { thread_id } => {
                if self.identity.is_none() {
                    return;
                }
                let Some(thread_id) = non_empty(&thread_id) else {
                    self.send_self(ServerEvent::validation_error("thread_id is required"));
                    return;
                };
                self.hub.join(self.conn, &thread_room(thread_id));
            }
            ClientEvent::LeaveThread { thread_id } => {
                if self.identity.is_none() {
                    return;
                }
                let Some(thread_id) = non_empty(&thread_id) else {
                    self.send_self(ServerEvent::validation_error("thread_id is required"));
                    return;
                };
                self.hub.leave(self.conn, &thread_room(thread_id));
            }
            ClientEvent::Typing(payload) => {
                let Some(identity) = &self.identity else {
                    return;
                };
                let Some(thread_id) = non_empty(&payload.thread_id) else {
                    self.send_self(ServerEvent::validation_error("thread_id is required"));
                    return;
                };
                let broadcast = TypingBroadcast {
                    thread_id: thread_id.to_string(),
                    user_id: identity.user_id,
                    extra: payload.extra,
                };
                self.hub.emit_to_room_except(
                    &thread_room(thread_id),
                    self.conn,
                    ServerEvent::Typing(broadcast),
                );
            }
        }
    }

    fn authenticate(&mut self, token: &str) {
        let session = match self.tokens.verify_access_token(token) {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(error = ?err, "access token verification failed");
                self.send_self(ServerEvent::auth_error("authentication failed"));
                return;
            }
        };
        let Some(session) = session else {
            self.send_self(ServerEvent::auth_error("invalid authentication token"));
            return;
        };

        if let Some(previous) = self.identity.take() {
            self.hub.leave(self.conn, &inbox_room(previous.user_id));
        }
        self.hub.join(self.conn, &inbox_room(session.user_id));
        self.send_self(ServerEvent::Ready {
            user_id: session.user_id,
        });
        self.identity = Some(session);
    }

    fn send_self(&self, event: ServerEvent) {
        self.hub.send_to(self.conn, event);
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        let token = handshake_token(Some("query-token".into()), &headers);
        assert_eq!(token.as_deref(), Some("query-token"));
    }

    #[test]
    fn bearer_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );
        assert_eq!(
            handshake_token(None, &headers).as_deref(),
            Some("header-token")
        );
        assert_eq!(
            handshake_token(Some("  ".into()), &headers).as_deref(),
            Some("header-token")
        );
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwdw=="),
        );
        assert!(handshake_token(None, &headers).is_none());
        assert!(handshake_token(None, &HeaderMap::new()).is_none());
    }
}
