//! End-to-end group messaging flow against the real handlers: register
//! users, create a group, exchange messages, kick a member, and reload the
//! snapshot. No HTTP server involved — handlers are called through their
//! axum extractors directly.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use tokio::sync::mpsc;

use chatd::auth::middleware::Claims;
use chatd::chat::handlers::{create_message, CreateMessageRequest};
use chatd::error::ApiError;
use chatd::groups::handlers::{
    add_member, create_group, delete_group, kick_member, AddMemberRequest, CreateGroupRequest,
};
use chatd::state::AppState;
use chatd::store::Store;
use chatd::users::handlers::{register, CredentialsRequest};
use chatd::ws::registry::{ConnectionId, ConnectionRegistry};
use chatd::ws::ConnectionSender;

fn claims_for(user_id: &str, name: &str) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        iat: now,
        exp: now + 3600,
    }
}

fn app_state(data_dir: &str) -> AppState {
    AppState {
        store: Store::open(data_dir).expect("open store"),
        registry: ConnectionRegistry::new(),
        jwt_secret: vec![7u8; 32],
    }
}

async fn register_user(state: &AppState, name: &str) -> String {
    let response = register(
        State(state.clone()),
        Json(CredentialsRequest {
            name: name.into(),
            password: "hunter2".into(),
        }),
    )
    .await
    .expect("register");
    response.0.user.id
}

/// Open a fake device: a registered, identified connection whose outbound
/// frames land in the returned receiver.
fn open_device(
    state: &AppState,
    user_id: &str,
) -> (
    ConnectionId,
    mpsc::UnboundedReceiver<axum::extract::ws::Message>,
) {
    let (tx, rx): (ConnectionSender, _) = mpsc::unbounded_channel();
    let conn = state.registry.register(tx);
    state.registry.identify(conn, user_id);
    (conn, rx)
}

/// Drain every pending frame and return the parsed JSON payloads.
fn drain(rx: &mut mpsc::UnboundedReceiver<axum::extract::ws::Message>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let axum::extract::ws::Message::Text(text) = frame {
            events.push(serde_json::from_str(&text).expect("valid event JSON"));
        }
    }
    events
}

fn types_of(events: &[serde_json::Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn group_lifecycle_with_kick_and_fanout() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path().to_str().unwrap());

    let carol = register_user(&state, "carol").await;
    let alice = register_user(&state, "alice").await;
    let bob = register_user(&state, "bob").await;

    let (carol_conn, mut carol_rx) = open_device(&state, &carol);
    let (alice_conn, mut alice_rx) = open_device(&state, &alice);

    // Carol creates group G with members [carol, alice].
    let group = create_group(
        State(state.clone()),
        claims_for(&carol, "carol"),
        Json(CreateGroupRequest {
            name: "team".into(),
            member_ids: vec![alice.clone()],
        }),
    )
    .await
    .expect("create group")
    .0;
    assert!(group.member_ids.contains(&carol));
    assert!(group.member_ids.contains(&alice));

    // Creator got new_group; the invited member got group_invitation even
    // though neither has joined the live channel.
    assert_eq!(types_of(&drain(&mut carol_rx)), vec!["new_group"]);
    assert_eq!(types_of(&drain(&mut alice_rx)), vec!["group_invitation"]);

    // Both join the live channel.
    state.registry.subscribe(carol_conn, &group.id);
    state.registry.subscribe(alice_conn, &group.id);

    // Alice sends "hi" to the group.
    let message = create_message(
        State(state.clone()),
        claims_for(&alice, "alice"),
        Json(CreateMessageRequest {
            content: "hi".into(),
            receiver_id: None,
            group_id: Some(group.id.clone()),
        }),
    )
    .await
    .expect("member send")
    .0;
    assert_eq!(message.group_id.as_deref(), Some(group.id.as_str()));
    assert_eq!(message.sender_id, alice);
    assert!(message.receiver_id.is_none());

    let carol_events = drain(&mut carol_rx);
    assert_eq!(types_of(&carol_events), vec!["new_message"]);
    assert_eq!(carol_events[0]["message"]["content"], "hi");

    // Bob is not a member: rejected, store unchanged.
    let before = state.store.read(|s| Ok(s.messages.len())).await.unwrap();
    let err = create_message(
        State(state.clone()),
        claims_for(&bob, "bob"),
        Json(CreateMessageRequest {
            content: "let me in".into(),
            receiver_id: None,
            group_id: Some(group.id.clone()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::PermissionDenied(_)));
    let after = state.store.read(|s| Ok(s.messages.len())).await.unwrap();
    assert_eq!(before, after);

    // Carol kicks Alice.
    drain(&mut alice_rx);
    let group_after = kick_member(
        State(state.clone()),
        claims_for(&carol, "carol"),
        Path((group.id.clone(), alice.clone())),
    )
    .await
    .expect("kick")
    .0;
    assert!(!group_after.member_ids.contains(&alice));
    assert!(group_after.member_ids.contains(&carol));

    // member_kicked reached the remaining member and the kicked user.
    assert_eq!(types_of(&drain(&mut carol_rx)), vec!["member_kicked"]);
    assert_eq!(types_of(&drain(&mut alice_rx)), vec!["member_kicked"]);

    // Alice can no longer send; her live subscription was evicted too.
    let err = create_message(
        State(state.clone()),
        claims_for(&alice, "alice"),
        Json(CreateMessageRequest {
            content: "still here?".into(),
            receiver_id: None,
            group_id: Some(group.id.clone()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::PermissionDenied(_)));
    assert_eq!(state.registry.subscribers_of(&group.id).len(), 1);
}

#[tokio::test]
async fn multi_device_direct_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path().to_str().unwrap());

    let carol = register_user(&state, "carol").await;
    let bob = register_user(&state, "bob").await;

    let (_phone, mut phone_rx) = open_device(&state, &carol);
    let (_laptop, mut laptop_rx) = open_device(&state, &carol);

    create_message(
        State(state.clone()),
        claims_for(&bob, "bob"),
        Json(CreateMessageRequest {
            content: "ping".into(),
            receiver_id: Some(carol.clone()),
            group_id: None,
        }),
    )
    .await
    .expect("direct send");

    for rx in [&mut phone_rx, &mut laptop_rx] {
        let events = drain(rx);
        assert_eq!(types_of(&events), vec!["new_message"]);
        assert_eq!(events[0]["message"]["content"], "ping");
    }
}

#[tokio::test]
async fn delete_group_cascades_and_snapshot_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(dir.path().to_str().unwrap());

    let carol = register_user(&state, "carol").await;
    let alice = register_user(&state, "alice").await;

    let group = create_group(
        State(state.clone()),
        claims_for(&carol, "carol"),
        Json(CreateGroupRequest {
            name: "ephemeral".into(),
            member_ids: vec![],
        }),
    )
    .await
    .unwrap()
    .0;

    let updated = add_member(
        State(state.clone()),
        claims_for(&carol, "carol"),
        Path(group.id.clone()),
        Json(AddMemberRequest {
            member_id: alice.clone(),
        }),
    )
    .await
    .unwrap()
    .0;
    assert!(updated.is_member(&alice));

    create_message(
        State(state.clone()),
        claims_for(&alice, "alice"),
        Json(CreateMessageRequest {
            content: "short-lived".into(),
            receiver_id: None,
            group_id: Some(group.id.clone()),
        }),
    )
    .await
    .unwrap();
    create_message(
        State(state.clone()),
        claims_for(&alice, "alice"),
        Json(CreateMessageRequest {
            content: "dm survives".into(),
            receiver_id: Some(carol.clone()),
            group_id: None,
        }),
    )
    .await
    .unwrap();

    let deleted = delete_group(
        State(state.clone()),
        claims_for(&carol, "carol"),
        Path(group.id.clone()),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(deleted["success"], true);

    let gid = group.id.clone();
    let (groups_left, group_messages_left, total_messages) = state
        .store
        .read(move |s| {
            Ok((
                s.groups.len(),
                s.messages
                    .iter()
                    .filter(|m| m.group_id.as_deref() == Some(gid.as_str()))
                    .count(),
                s.messages.len(),
            ))
        })
        .await
        .unwrap();
    assert_eq!(groups_left, 0);
    assert_eq!(group_messages_left, 0);
    // Only the direct message remains (the system announcement was cascaded
    // away with the group).
    assert_eq!(total_messages, 1);

    // Reload from the snapshot: state (modulo the ephemeral registry) is
    // identical.
    let reloaded = Store::open(dir.path().to_str().unwrap()).unwrap();
    let snapshot = reloaded
        .read(|s| Ok(serde_json::to_value(s).expect("serializable state")))
        .await
        .unwrap();
    let live = state
        .store
        .read(|s| Ok(serde_json::to_value(s).expect("serializable state")))
        .await
        .unwrap();
    assert_eq!(snapshot, live);
}
