mod common;

use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use common::{issue_token, token_service};
use verda::realtime::events::{ClientEvent, ServerEvent};
use verda::realtime::session::RealtimeSession;
use verda::realtime::{inbox_room, RealtimeHub, SUPPORT_ADMINS_ROOM};

fn new_session(hub: &RealtimeHub) -> (RealtimeSession, UnboundedReceiver<ServerEvent>) {
    let (conn, rx) = hub.register();
    (RealtimeSession::new(conn, hub.clone(), token_service()), rx)
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn client_event(value: serde_json::Value) -> ClientEvent {
    serde_json::from_value(value).expect("client event should parse")
}

#[tokio::test]
async fn missing_token_emits_auth_error_and_stays_unauthenticated() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);

    session.handle_handshake(None);

    let events = drain(&mut rx);
    assert!(matches!(events.as_slice(), [ServerEvent::AuthError { .. }]));
    assert!(session.identity().is_none());
}

#[tokio::test]
async fn invalid_token_emits_auth_error() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);

    session.handle_handshake(Some("junk".into()));

    assert!(matches!(
        drain(&mut rx).as_slice(),
        [ServerEvent::AuthError { .. }]
    ));
    assert!(session.identity().is_none());
}

#[tokio::test]
async fn verified_handshake_binds_identity_and_inbox() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    let user_id = Uuid::new_v4();

    session.handle_handshake(Some(issue_token(user_id, "member")));

    match drain(&mut rx).as_slice() {
        [ServerEvent::Ready { user_id: ready }] => assert_eq!(*ready, user_id),
        other => panic!("expected ready, got {:?}", other),
    }
    assert_eq!(session.identity().unwrap().user_id, user_id);

    // a push to the inbox room now reaches this connection
    assert_eq!(
        hub.emit_to_room(&inbox_room(user_id), ServerEvent::validation_error("probe")),
        1
    );
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn unauthenticated_connection_never_receives_inbox_pushes() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    session.handle_handshake(None);
    drain(&mut rx);

    let someone = Uuid::new_v4();
    assert_eq!(
        hub.emit_to_room(&inbox_room(someone), ServerEvent::validation_error("probe")),
        0
    );
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn auth_event_authenticates_an_open_connection() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    session.handle_handshake(None);
    drain(&mut rx);

    let user_id = Uuid::new_v4();
    let frame = json!({"event": "auth", "data": {"token": issue_token(user_id, "member")}});
    session.handle_frame(&frame.to_string());

    assert!(matches!(
        drain(&mut rx).as_slice(),
        [ServerEvent::Ready { .. }]
    ));
    assert_eq!(hub.room_size(&inbox_room(user_id)), 1);
}

#[tokio::test]
async fn reauthentication_rebinds_the_inbox_room() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    session.handle_handshake(Some(issue_token(first, "member")));
    session.handle_event(client_event(json!({
        "event": "auth",
        "data": {"token": issue_token(second, "member")}
    })));
    drain(&mut rx);

    assert_eq!(hub.room_size(&inbox_room(first)), 0);
    assert_eq!(hub.room_size(&inbox_room(second)), 1);
}

#[tokio::test]
async fn unauthenticated_thread_events_are_silently_ignored() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    session.handle_handshake(None);
    drain(&mut rx);

    session.handle_event(client_event(json!({
        "event": "friend-chat:join-thread",
        "data": {"thread_id": "t1"}
    })));
    session.handle_event(client_event(json!({
        "event": "friend-chat:typing",
        "data": {"thread_id": "t1"}
    })));

    assert_eq!(hub.room_size("thread:t1"), 0);
    assert!(drain(&mut rx).is_empty(), "no error events either");
}

#[tokio::test]
async fn support_rooms_are_open_to_any_connection() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    session.handle_handshake(None);
    drain(&mut rx);

    session.handle_event(client_event(json!({
        "event": "support-chat:join",
        "data": {"user_id": "u-42"}
    })));
    assert_eq!(hub.room_size("support:user:u-42"), 1);

    session.handle_event(client_event(json!({
        "event": "support-chat:leave",
        "data": {"user_id": "u-42"}
    })));
    assert_eq!(hub.room_size("support:user:u-42"), 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn support_join_validates_shape() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    session.handle_handshake(None);
    drain(&mut rx);

    session.handle_event(client_event(json!({
        "event": "support-chat:join",
        "data": {"user_id": "   "}
    })));

    assert!(matches!(
        drain(&mut rx).as_slice(),
        [ServerEvent::ValidationError { .. }]
    ));
}

#[tokio::test]
async fn admin_join_enters_shared_and_personal_rooms() {
    let hub = RealtimeHub::new();
    let (mut session, _rx) = new_session(&hub);

    session.handle_event(client_event(json!({
        "event": "support-chat:join-admin",
        "data": {"admin_id": "a1"}
    })));
    assert_eq!(hub.room_size(SUPPORT_ADMINS_ROOM), 1);
    assert_eq!(hub.room_size("support:admin:a1"), 1);

    let (mut other, _rx2) = new_session(&hub);
    other.handle_event(client_event(json!({
        "event": "support-chat:join-admin",
        "data": {}
    })));
    assert_eq!(hub.room_size(SUPPORT_ADMINS_ROOM), 2);
    assert_eq!(hub.room_size("support:admin:a1"), 1);
}

#[tokio::test]
async fn typing_is_relayed_to_other_thread_members_only() {
    let hub = RealtimeHub::new();
    let (mut alice, mut rx_alice) = new_session(&hub);
    let (mut bob, mut rx_bob) = new_session(&hub);
    let alice_id = Uuid::new_v4();

    alice.handle_handshake(Some(issue_token(alice_id, "member")));
    bob.handle_handshake(Some(issue_token(Uuid::new_v4(), "member")));
    for session in [&mut alice, &mut bob] {
        session.handle_event(client_event(json!({
            "event": "friend-chat:join-thread",
            "data": {"thread_id": "t1"}
        })));
    }
    drain(&mut rx_alice);
    drain(&mut rx_bob);

    alice.handle_frame(
        &json!({
            "event": "friend-chat:typing",
            "data": {"thread_id": "t1", "is_typing": true}
        })
        .to_string(),
    );

    assert!(drain(&mut rx_alice).is_empty(), "sender gets no echo");
    match drain(&mut rx_bob).as_slice() {
        [ServerEvent::Typing(typing)] => {
            assert_eq!(typing.thread_id, "t1");
            assert_eq!(typing.user_id, alice_id);
            assert_eq!(typing.extra["is_typing"], true);
        }
        other => panic!("expected typing relay, got {:?}", other),
    }
}

#[tokio::test]
async fn leaving_a_thread_stops_the_relay() {
    let hub = RealtimeHub::new();
    let (mut alice, mut rx_alice) = new_session(&hub);
    let (mut bob, mut rx_bob) = new_session(&hub);

    alice.handle_handshake(Some(issue_token(Uuid::new_v4(), "member")));
    bob.handle_handshake(Some(issue_token(Uuid::new_v4(), "member")));
    for session in [&mut alice, &mut bob] {
        session.handle_event(client_event(json!({
            "event": "friend-chat:join-thread",
            "data": {"thread_id": "t1"}
        })));
    }
    bob.handle_event(client_event(json!({
        "event": "friend-chat:leave-thread",
        "data": {"thread_id": "t1"}
    })));
    drain(&mut rx_alice);
    drain(&mut rx_bob);

    alice.handle_event(client_event(json!({
        "event": "friend-chat:typing",
        "data": {"thread_id": "t1"}
    })));
    assert!(drain(&mut rx_bob).is_empty());
}

#[tokio::test]
async fn malformed_frames_report_a_validation_error() {
    let hub = RealtimeHub::new();
    let (mut session, mut rx) = new_session(&hub);
    session.handle_handshake(Some(issue_token(Uuid::new_v4(), "member")));
    drain(&mut rx);

    session.handle_frame("not json at all");

    match drain(&mut rx).as_slice() {
        [ServerEvent::ValidationError { message }] => {
            assert_eq!(message, "malformed event");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}
