//! REST endpoints for friend requests and notifications.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::models::{FriendRequest, Notification};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFriendRequestBody {
    pub to_user_id: String,
}

/// POST /friend-requests — send a friend request from the authenticated
/// user.
pub async fn send_request(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<SendFriendRequestBody>,
) -> Result<Json<FriendRequest>, ApiError> {
    let request = super::send_friend_request(
        &state.store,
        &state.registry,
        &claims.sub,
        &body.to_user_id,
    )
    .await?;
    Ok(Json(request))
}

/// PUT /friend-requests/{request_id}/accept
pub async fn accept_request(
    State(state): State<AppState>,
    claims: Claims,
    Path(request_id): Path<String>,
) -> Result<Json<FriendRequest>, ApiError> {
    let request =
        super::accept_friend_request(&state.store, &state.registry, &claims.sub, &request_id)
            .await?;
    Ok(Json(request))
}

/// PUT /friend-requests/{request_id}/reject
pub async fn reject_request(
    State(state): State<AppState>,
    claims: Claims,
    Path(request_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    super::reject_friend_request(&state.store, &claims.sub, &request_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /notifications/{user_id} — unread notifications. Self only.
pub async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    if user_id != claims.sub {
        return Err(ApiError::PermissionDenied(
            "cannot read another user's notifications".into(),
        ));
    }
    let notifications = state
        .store
        .read(move |s| {
            Ok(s.notifications
                .iter()
                .filter(|n| n.to_user_id == user_id && !n.is_read)
                .cloned()
                .collect())
        })
        .await?;
    Ok(Json(notifications))
}

/// PUT /notifications/{notification_id}/read — recipient only.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = claims.sub.clone();
    state
        .store
        .mutate(move |s| {
            let notification = s
                .notifications
                .iter_mut()
                .find(|n| n.id == notification_id)
                .ok_or(ApiError::NotFound("notification"))?;
            if notification.to_user_id != requester {
                return Err(ApiError::PermissionDenied(
                    "only the recipient can mark a notification read".into(),
                ));
            }
            notification.is_read = true;
            Ok(())
        })
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
