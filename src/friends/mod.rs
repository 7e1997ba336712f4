//! Friend relationships and their notifications.
//!
//! The core operations live here so the REST handlers and the WebSocket
//! intents (`friend_request`, `friend_accepted`) share one code path.

pub mod handlers;

use crate::error::ApiError;
use crate::store::models::{
    FriendRequest, FriendRequestStatus, Notification, NotificationKind,
};
use crate::store::Store;
use crate::ws::broadcast::send_to_principal;
use crate::ws::protocol::ServerEvent;
use crate::ws::registry::ConnectionRegistry;

/// Create a pending friend request and notify the recipient. Sending to an
/// existing pending pair is idempotent and returns the existing request.
pub async fn send_friend_request(
    store: &Store,
    registry: &ConnectionRegistry,
    from_user_id: &str,
    to_user_id: &str,
) -> Result<FriendRequest, ApiError> {
    let from = from_user_id.to_string();
    let to = to_user_id.to_string();

    let (request, notification) = store
        .mutate(move |s| {
            if from == to {
                return Err(ApiError::Validation("cannot befriend yourself".into()));
            }
            if s.user(&from).is_none() || s.user(&to).is_none() {
                return Err(ApiError::NotFound("user"));
            }
            let already_friends = s
                .user(&from)
                .map(|u| u.friend_ids.iter().any(|f| *f == to))
                .unwrap_or(false);
            if already_friends {
                return Err(ApiError::InvalidOperation("already friends".into()));
            }

            if let Some(existing) = s.friend_requests.iter().find(|r| {
                r.from_user_id == from
                    && r.to_user_id == to
                    && r.status == FriendRequestStatus::Pending
            }) {
                return Ok((existing.clone(), None));
            }

            let request = FriendRequest::new(&from, &to);
            let notification = Notification::new(NotificationKind::FriendRequest, &from, &to);
            s.friend_requests.push(request.clone());
            s.notifications.push(notification.clone());
            Ok((request, Some(notification)))
        })
        .await?;

    if let Some(notification) = notification {
        send_to_principal(
            registry,
            to_user_id,
            &ServerEvent::NewNotification { notification },
        );
    }
    Ok(request)
}

/// Accept a pending request. Recipient only. Makes the friendship mutual,
/// swaps the request notification for a friend_accepted one, and tells the
/// original requester on all their devices.
pub async fn accept_friend_request(
    store: &Store,
    registry: &ConnectionRegistry,
    acting_user_id: &str,
    request_id: &str,
) -> Result<FriendRequest, ApiError> {
    let acting = acting_user_id.to_string();
    let rid = request_id.to_string();

    let (request, notification) = store
        .mutate(move |s| {
            let request = s
                .friend_requests
                .iter()
                .find(|r| r.id == rid)
                .cloned()
                .ok_or(ApiError::NotFound("friend request"))?;
            if request.to_user_id != acting {
                return Err(ApiError::PermissionDenied(
                    "only the recipient can accept a friend request".into(),
                ));
            }
            if request.status != FriendRequestStatus::Pending {
                return Err(ApiError::InvalidOperation(
                    "friend request is not pending".into(),
                ));
            }
            if s.user(&request.from_user_id).is_none() {
                return Err(ApiError::NotFound("user"));
            }

            // Validation done; apply everything.
            let (from, to) = (request.from_user_id.clone(), request.to_user_id.clone());
            if let Some(r) = s.friend_requests.iter_mut().find(|r| r.id == rid) {
                r.status = FriendRequestStatus::Accepted;
            }
            if let Some(user) = s.user_mut(&from) {
                if !user.friend_ids.contains(&to) {
                    user.friend_ids.push(to.clone());
                }
            }
            if let Some(user) = s.user_mut(&to) {
                if !user.friend_ids.contains(&from) {
                    user.friend_ids.push(from.clone());
                }
            }

            // The pending-request notification is superseded.
            s.notifications.retain(|n| {
                !(n.kind == NotificationKind::FriendRequest
                    && n.from_user_id == from
                    && n.to_user_id == to)
            });
            let notification = Notification::new(NotificationKind::FriendAccepted, &to, &from);
            s.notifications.push(notification.clone());

            let mut request = request;
            request.status = FriendRequestStatus::Accepted;
            Ok((request, notification))
        })
        .await?;

    send_to_principal(
        registry,
        &request.from_user_id,
        &ServerEvent::FriendAccepted {
            from_user_id: request.to_user_id.clone(),
            to_user_id: request.from_user_id.clone(),
        },
    );
    send_to_principal(
        registry,
        &request.from_user_id,
        &ServerEvent::NewNotification { notification },
    );

    Ok(request)
}

/// Reject a pending request. Recipient only. Clears the related
/// notification; no event reaches the requester.
pub async fn reject_friend_request(
    store: &Store,
    acting_user_id: &str,
    request_id: &str,
) -> Result<(), ApiError> {
    let acting = acting_user_id.to_string();
    let rid = request_id.to_string();

    store
        .mutate(move |s| {
            let request = s
                .friend_requests
                .iter_mut()
                .find(|r| r.id == rid)
                .ok_or(ApiError::NotFound("friend request"))?;
            if request.to_user_id != acting {
                return Err(ApiError::PermissionDenied(
                    "only the recipient can reject a friend request".into(),
                ));
            }
            if request.status != FriendRequestStatus::Pending {
                return Err(ApiError::InvalidOperation(
                    "friend request is not pending".into(),
                ));
            }
            request.status = FriendRequestStatus::Rejected;
            let (from, to) = (request.from_user_id.clone(), request.to_user_id.clone());

            s.notifications.retain(|n| {
                !(n.kind == NotificationKind::FriendRequest
                    && n.from_user_id == from
                    && n.to_user_id == to)
            });
            Ok(())
        })
        .await
}
