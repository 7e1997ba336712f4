//! JSON wire protocol for the WebSocket channel.
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound intents
//! come from the client; outbound events are produced by the broadcast
//! engine. Field names are camelCase to match the REST payloads.

use axum::extract::ws::Message as WsMessage;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::models::{Group, Message, Notification};
use crate::ws::registry::{ConnectionId, ConnectionSender};
use crate::{chat, friends};

/// Client -> server intents.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Re-binds the principal. The binding already happened at handshake
    /// from the URL token; a mismatched identify is rejected.
    Identify { user_id: String },
    /// Join a group's live channel. Membership is not validated here;
    /// sends are validated against the membership authority.
    JoinGroup { group_id: String },
    /// Leave the live channel (subscription only — REST leave mutates
    /// membership).
    LeaveGroup { group_id: String },
    GroupMessage { group_id: String, content: String },
    FriendRequest { to_user_id: String },
    FriendAccepted { request_id: String },
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    NewMessage { message: Message },
    LeaveGroup { group_id: String, user_id: String },
    MemberKicked { group_id: String, user_id: String },
    MemberAdded { group_id: String, user_id: String },
    NewGroup { group: Group },
    GroupInvitation { group: Group },
    GroupDeleted { group_id: String },
    NewNotification { notification: Notification },
    MessageDeleted { message_id: String },
    FriendAccepted { from_user_id: String, to_user_id: String },
    Error { message: String },
}

/// Serialize an event to a WebSocket text frame.
pub fn encode(event: &ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server event");
            None
        }
    }
}

/// Send one event to one connection, best-effort.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = tx.send(msg);
    }
}

fn send_error(tx: &ConnectionSender, message: impl Into<String>) {
    send_event(
        tx,
        &ServerEvent::Error {
            message: message.into(),
        },
    );
}

/// Handle one inbound text frame: parse the intent, dispatch, report
/// failures back on the same connection. Failure is local and terminal per
/// event — nothing is retried.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    conn_id: ConnectionId,
    user_id: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "unparseable client event");
            send_error(tx, "Invalid event payload");
            return;
        }
    };

    if let Err(err) = dispatch(event, state, conn_id, user_id).await {
        send_error(tx, err.to_string());
    }
}

async fn dispatch(
    event: ClientEvent,
    state: &AppState,
    conn_id: ConnectionId,
    user_id: &str,
) -> Result<(), ApiError> {
    match event {
        ClientEvent::Identify { user_id: claimed } => {
            if claimed != user_id {
                return Err(ApiError::PermissionDenied(
                    "identify does not match the authenticated principal".into(),
                ));
            }
            // Idempotent: the handshake already bound the principal.
            state.registry.identify(conn_id, user_id);
        }
        ClientEvent::JoinGroup { group_id } => {
            state.registry.subscribe(conn_id, &group_id);
            tracing::debug!(user_id = %user_id, group_id = %group_id, "joined live channel");
        }
        ClientEvent::LeaveGroup { group_id } => {
            state.registry.unsubscribe(conn_id, &group_id);
            tracing::debug!(user_id = %user_id, group_id = %group_id, "left live channel");
        }
        ClientEvent::GroupMessage { group_id, content } => {
            chat::pipeline::submit(
                &state.store,
                &state.registry,
                chat::pipeline::NewMessage {
                    sender_id: user_id.to_string(),
                    content,
                    receiver_id: None,
                    group_id: Some(group_id),
                },
            )
            .await?;
        }
        ClientEvent::FriendRequest { to_user_id } => {
            friends::send_friend_request(&state.store, &state.registry, user_id, &to_user_id)
                .await?;
        }
        ClientEvent::FriendAccepted { request_id } => {
            friends::accept_friend_request(&state.store, &state.registry, user_id, &request_id)
                .await?;
        }
    }
    Ok(())
}
