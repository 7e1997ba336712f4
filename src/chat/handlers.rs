//! REST endpoints for messages: send, history views, read tracking,
//! deletion. Sending goes through the pipeline so REST and WebSocket
//! messages share the same validate/persist/broadcast path.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::chat::pipeline::{self, NewMessage};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::models::Message;
use crate::ws::broadcast::{broadcast_to_group, send_to_principal};
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub content: String,
    pub receiver_id: Option<String>,
    pub group_id: Option<String>,
}

/// POST /messages — send a direct or group message. The sender is always
/// the authenticated principal, never a body field.
pub async fn create_message(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = pipeline::submit(
        &state.store,
        &state.registry,
        NewMessage {
            sender_id: claims.sub,
            content: body.content,
            receiver_id: body.receiver_id,
            group_id: body.group_id,
        },
    )
    .await?;
    Ok(Json(message))
}

/// GET /messages — full message log.
pub async fn list_messages(
    State(state): State<AppState>,
    _claims: Claims,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.store.read(|s| Ok(s.messages.clone())).await?;
    Ok(Json(messages))
}

/// GET /messages/{user_a}/{user_b} — conversation between two users, both
/// directions, oldest first. The requester must be one of the two.
pub async fn conversation(
    State(state): State<AppState>,
    claims: Claims,
    Path((user_a, user_b)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, ApiError> {
    if claims.sub != user_a && claims.sub != user_b {
        return Err(ApiError::PermissionDenied(
            "cannot read another user's conversation".into(),
        ));
    }
    let messages = state
        .store
        .read(move |s| {
            let mut messages: Vec<Message> = s
                .messages
                .iter()
                .filter(|m| {
                    (m.sender_id == user_a && m.receiver_id.as_deref() == Some(user_b.as_str()))
                        || (m.sender_id == user_b
                            && m.receiver_id.as_deref() == Some(user_a.as_str()))
                })
                .cloned()
                .collect();
            messages.sort_by_key(|m| m.timestamp);
            Ok(messages)
        })
        .await?;
    Ok(Json(messages))
}

/// GET /messages/group/{group_id} — group history, oldest first.
/// Members only (authoritative list, not live subscription).
pub async fn group_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let requester = claims.sub.clone();
    let messages = state
        .store
        .read(move |s| {
            let group = s.group(&group_id).ok_or(ApiError::NotFound("group"))?;
            if !group.is_member(&requester) {
                return Err(ApiError::PermissionDenied(
                    "not a member of this group".into(),
                ));
            }
            let mut messages: Vec<Message> = s
                .messages
                .iter()
                .filter(|m| m.group_id.as_deref() == Some(group_id.as_str()))
                .cloned()
                .collect();
            messages.sort_by_key(|m| m.timestamp);
            Ok(messages)
        })
        .await?;
    Ok(Json(messages))
}

/// GET /messages/pending/{user_id} — unread direct messages. Self only.
pub async fn pending_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    if user_id != claims.sub {
        return Err(ApiError::PermissionDenied(
            "cannot read another user's pending messages".into(),
        ));
    }
    let messages = state
        .store
        .read(move |s| {
            Ok(s.messages
                .iter()
                .filter(|m| m.receiver_id.as_deref() == Some(user_id.as_str()) && !m.is_read)
                .cloned()
                .collect())
        })
        .await?;
    Ok(Json(messages))
}

/// GET /messages/unread-count/{user_id} — unread direct message count.
/// Self only.
pub async fn unread_count(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if user_id != claims.sub {
        return Err(ApiError::PermissionDenied(
            "cannot read another user's unread count".into(),
        ));
    }
    let count = state
        .store
        .read(move |s| {
            Ok(s.messages
                .iter()
                .filter(|m| m.receiver_id.as_deref() == Some(user_id.as_str()) && !m.is_read)
                .count())
        })
        .await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

/// PUT /messages/{id}/read — flip the read flag. Receiver only.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = claims.sub.clone();
    state
        .store
        .mutate(move |s| {
            let message = s
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or(ApiError::NotFound("message"))?;
            if message.receiver_id.as_deref() != Some(requester.as_str()) {
                return Err(ApiError::PermissionDenied(
                    "only the receiver can mark a message read".into(),
                ));
            }
            message.is_read = true;
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// DELETE /messages/{id} — sender-only deletion. The counterparty (direct)
/// or the live subscribers (group) get a message_deleted event.
pub async fn delete_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = claims.sub.clone();
    let mid = message_id.clone();
    let removed = state
        .store
        .mutate(move |s| {
            let idx = s
                .messages
                .iter()
                .position(|m| m.id == mid)
                .ok_or(ApiError::NotFound("message"))?;
            if s.messages[idx].sender_id != requester {
                return Err(ApiError::PermissionDenied(
                    "only the sender can delete a message".into(),
                ));
            }
            Ok(s.messages.remove(idx))
        })
        .await?;

    let event = ServerEvent::MessageDeleted {
        message_id: message_id.clone(),
    };
    if let Some(group_id) = &removed.group_id {
        broadcast_to_group(&state.registry, group_id, &event);
    } else if let Some(receiver_id) = &removed.receiver_id {
        send_to_principal(&state.registry, receiver_id, &event);
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
