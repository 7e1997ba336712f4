//! Message pipeline: received -> validated -> persisted -> broadcast.
//!
//! Validation and the append happen in one store mutation, so a rejected
//! message never leaves a partial write, and the snapshot is durable before
//! any broadcast goes out. Rejection is terminal per message; nothing is
//! retried.

use crate::error::ApiError;
use crate::store::models::Message;
use crate::store::{ChatState, Store};
use crate::ws::broadcast::{broadcast_to_group, send_to_principal};
use crate::ws::protocol::ServerEvent;
use crate::ws::registry::ConnectionRegistry;

/// An inbound message intent, from REST or from a WebSocket frame.
#[derive(Debug)]
pub struct NewMessage {
    pub sender_id: String,
    pub content: String,
    /// Direct target. Exactly one of `receiver_id` / `group_id` is set.
    pub receiver_id: Option<String>,
    pub group_id: Option<String>,
}

/// Validate, persist, then fan out. Group messages go to the group's live
/// subscriber set; direct messages go to the receiver's connections,
/// best-effort — an offline receiver just fetches the stored message over
/// REST later, nothing is pushed retroactively.
pub async fn submit(
    store: &Store,
    registry: &ConnectionRegistry,
    input: NewMessage,
) -> Result<Message, ApiError> {
    let message = store.mutate(move |s| validate_and_append(s, input)).await?;

    let event = ServerEvent::NewMessage {
        message: message.clone(),
    };
    if let Some(group_id) = &message.group_id {
        broadcast_to_group(registry, group_id, &event);
    } else if let Some(receiver_id) = &message.receiver_id {
        send_to_principal(registry, receiver_id, &event);
    }

    Ok(message)
}

/// All validation happens before the state is touched.
fn validate_and_append(state: &mut ChatState, input: NewMessage) -> Result<Message, ApiError> {
    let content = input.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("message content must not be empty".into()));
    }
    if state.user(&input.sender_id).is_none() {
        return Err(ApiError::NotFound("user"));
    }

    let message = match (&input.receiver_id, &input.group_id) {
        (Some(receiver_id), None) => {
            if state.user(receiver_id).is_none() {
                return Err(ApiError::NotFound("user"));
            }
            Message::direct(&input.sender_id, receiver_id, content)
        }
        (None, Some(group_id)) => {
            let group = state.group(group_id).ok_or(ApiError::NotFound("group"))?;
            // Authoritative membership check — live subscription is never
            // enough to send into a group.
            if !group.is_member(&input.sender_id) {
                return Err(ApiError::PermissionDenied(
                    "sender is not a member of this group".into(),
                ));
            }
            Message::group(&input.sender_id, group_id, content)
        }
        _ => {
            return Err(ApiError::Validation(
                "exactly one of receiverId or groupId must be set".into(),
            ));
        }
    };

    state.messages.push(message.clone());
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{Group, User};
    use chrono::Utc;

    fn seeded_state() -> (ChatState, String, String, String) {
        let mut state = ChatState::default();
        let carol = User::new("carol", "$argon2id$x");
        let alice = User::new("alice", "$argon2id$x");
        let bob = User::new("bob", "$argon2id$x");
        let (c, a, b) = (carol.id.clone(), alice.id.clone(), bob.id.clone());
        state.groups.push(Group {
            id: "g1".into(),
            name: "team".into(),
            creator_id: c.clone(),
            member_ids: vec![c.clone(), a.clone()],
            created_at: Utc::now(),
        });
        state.users.extend([carol, alice, bob]);
        (state, c, a, b)
    }

    fn intent(sender: &str, group: Option<&str>, receiver: Option<&str>) -> NewMessage {
        NewMessage {
            sender_id: sender.to_string(),
            content: "hi".into(),
            receiver_id: receiver.map(String::from),
            group_id: group.map(String::from),
        }
    }

    #[test]
    fn member_send_is_persisted_with_group_target_only() {
        let (mut state, _c, a, _b) = seeded_state();
        let message = validate_and_append(&mut state, intent(&a, Some("g1"), None)).unwrap();
        assert_eq!(message.group_id.as_deref(), Some("g1"));
        assert_eq!(message.sender_id, a);
        assert!(message.receiver_id.is_none());
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn non_member_send_is_rejected_and_store_unchanged() {
        let (mut state, _c, _a, b) = seeded_state();
        let err = validate_and_append(&mut state, intent(&b, Some("g1"), None)).unwrap_err();
        assert!(matches!(err, ApiError::PermissionDenied(_)));
        assert!(state.messages.is_empty());
    }

    #[test]
    fn empty_content_is_rejected() {
        let (mut state, _c, a, _b) = seeded_state();
        let mut msg = intent(&a, Some("g1"), None);
        msg.content = "   ".into();
        let err = validate_and_append(&mut state, msg).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(state.messages.is_empty());
    }

    #[test]
    fn exactly_one_target_is_required() {
        let (mut state, _c, a, b) = seeded_state();

        let err = validate_and_append(&mut state, intent(&a, None, None)).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut both = intent(&a, Some("g1"), Some(&b));
        both.content = "hi".into();
        let err = validate_and_append(&mut state, both).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn unknown_sender_group_or_receiver_is_not_found() {
        let (mut state, _c, a, _b) = seeded_state();

        let err = validate_and_append(&mut state, intent("ghost", Some("g1"), None)).unwrap_err();
        assert!(matches!(err, ApiError::NotFound("user")));

        let err = validate_and_append(&mut state, intent(&a, Some("g404"), None)).unwrap_err();
        assert!(matches!(err, ApiError::NotFound("group")));

        let err = validate_and_append(&mut state, intent(&a, None, Some("ghost"))).unwrap_err();
        assert!(matches!(err, ApiError::NotFound("user")));
    }

    #[tokio::test]
    async fn submit_broadcasts_to_live_subscribers_only() {
        let (state, _c, a, _b) = seeded_state();
        let (store, _dir) = Store::open_temp();
        store
            .mutate(move |s| {
                *s = state;
                Ok(())
            })
            .await
            .unwrap();

        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = registry.register(tx);
        registry.identify(conn, &a);
        registry.subscribe(conn, "g1");

        submit(&store, &registry, intent(&a, Some("g1"), None))
            .await
            .unwrap();

        let frame = rx.try_recv().unwrap();
        let axum::extract::ws::Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "new_message");
        assert_eq!(json["message"]["groupId"], "g1");
    }

    #[tokio::test]
    async fn direct_message_to_offline_receiver_is_stored_not_pushed() {
        let (state, _c, a, b) = seeded_state();
        let (store, _dir) = Store::open_temp();
        store
            .mutate(move |s| {
                *s = state;
                Ok(())
            })
            .await
            .unwrap();

        let registry = ConnectionRegistry::new();
        let message = submit(&store, &registry, intent(&a, None, Some(&b)))
            .await
            .unwrap();
        assert_eq!(message.receiver_id.as_deref(), Some(b.as_str()));

        let stored = store
            .read(move |s| Ok(s.messages.len()))
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }
}
