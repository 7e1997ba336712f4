//! REST endpoints for group CRUD and membership changes.
//!
//! Each handler applies the mutation through the membership authority
//! (validated, durable) and only then fans events out. Membership-change
//! events go to the authoritative member list; message announcements go to
//! the live subscriber set.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::error::ApiError;
use crate::groups::authority;
use crate::state::AppState;
use crate::store::models::Group;
use crate::ws::broadcast::{broadcast_to_group, broadcast_to_membership, send_to_principal};
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub member_id: String,
}

/// POST /groups — create a group; the requester becomes the creator.
pub async fn create_group(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Json<Group>, ApiError> {
    let creator_id = claims.sub.clone();
    let group = state
        .store
        .mutate(move |s| authority::create_group(s, &body.name, &creator_id, &body.member_ids))
        .await?;

    // Creator sees the new group; invited members get an invitation event
    // whether or not they have joined the live channel.
    send_to_principal(
        &state.registry,
        &claims.sub,
        &ServerEvent::NewGroup {
            group: group.clone(),
        },
    );
    let invited: Vec<String> = group
        .member_ids
        .iter()
        .filter(|m| **m != claims.sub)
        .cloned()
        .collect();
    broadcast_to_membership(
        &state.registry,
        &invited,
        &ServerEvent::GroupInvitation {
            group: group.clone(),
        },
    );

    tracing::info!(group_id = %group.id, creator = %claims.sub, "group created");
    Ok(Json(group))
}

/// GET /groups/user/{user_id} — groups the user belongs to. Self only.
pub async fn list_user_groups(
    State(state): State<AppState>,
    claims: Claims,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Group>>, ApiError> {
    if user_id != claims.sub {
        return Err(ApiError::PermissionDenied(
            "cannot list another user's groups".into(),
        ));
    }
    let groups = state
        .store
        .read(move |s| {
            Ok(s.groups
                .iter()
                .filter(|g| g.is_member(&user_id))
                .cloned()
                .collect())
        })
        .await?;
    Ok(Json(groups))
}

/// POST /groups/{group_id}/members — add a member (creator only).
pub async fn add_member(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<Group>, ApiError> {
    let requester = claims.sub.clone();
    let gid = group_id.clone();
    let member_id = body.member_id.clone();
    let outcome = state
        .store
        .mutate(move |s| authority::add_member(s, &gid, &requester, &member_id))
        .await?;

    // None means the user was already a member: nothing changed, nothing
    // to announce.
    if let Some(announcement) = outcome.announcement {
        broadcast_to_membership(
            &state.registry,
            &outcome.group.member_ids,
            &ServerEvent::MemberAdded {
                group_id: group_id.clone(),
                user_id: body.member_id.clone(),
            },
        );
        send_to_principal(
            &state.registry,
            &body.member_id,
            &ServerEvent::GroupInvitation {
                group: outcome.group.clone(),
            },
        );
        broadcast_to_group(
            &state.registry,
            &group_id,
            &ServerEvent::NewMessage {
                message: announcement,
            },
        );
    }

    Ok(Json(outcome.group))
}

/// DELETE /groups/{group_id}/members/{member_id} — kick (creator only).
pub async fn kick_member(
    State(state): State<AppState>,
    claims: Claims,
    Path((group_id, member_id)): Path<(String, String)>,
) -> Result<Json<Group>, ApiError> {
    let requester = claims.sub.clone();
    let gid = group_id.clone();
    let target = member_id.clone();
    let group = state
        .store
        .mutate(move |s| authority::remove_member(s, &gid, &requester, &target))
        .await?;

    // The live subscriber set is a cache; keep it consistent with the
    // authoritative list.
    state
        .registry
        .evict_principal_from_group(&member_id, &group_id);

    let event = ServerEvent::MemberKicked {
        group_id: group_id.clone(),
        user_id: member_id.clone(),
    };
    broadcast_to_membership(&state.registry, &group.member_ids, &event);
    // The kicked user learns about it too, on all their devices.
    send_to_principal(&state.registry, &member_id, &event);

    tracing::info!(group_id = %group_id, user_id = %member_id, "member kicked");
    Ok(Json(group))
}

/// POST /groups/{group_id}/leave — the requester leaves the group.
pub async fn leave_group(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
) -> Result<Json<Group>, ApiError> {
    let user_id = claims.sub.clone();
    let gid = group_id.clone();
    let (group, announcement) = state
        .store
        .mutate(move |s| authority::leave_group(s, &gid, &user_id))
        .await?;

    state
        .registry
        .evict_principal_from_group(&claims.sub, &group_id);

    broadcast_to_membership(
        &state.registry,
        &group.member_ids,
        &ServerEvent::LeaveGroup {
            group_id: group_id.clone(),
            user_id: claims.sub.clone(),
        },
    );
    broadcast_to_group(
        &state.registry,
        &group_id,
        &ServerEvent::NewMessage {
            message: announcement,
        },
    );

    Ok(Json(group))
}

/// DELETE /groups/{group_id} — delete the group (creator only). Cascades
/// to the group's messages; every former member is notified.
pub async fn delete_group(
    State(state): State<AppState>,
    claims: Claims,
    Path(group_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requester = claims.sub.clone();
    let gid = group_id.clone();
    let group = state
        .store
        .mutate(move |s| authority::delete_group(s, &gid, &requester))
        .await?;

    broadcast_to_membership(
        &state.registry,
        &group.member_ids,
        &ServerEvent::GroupDeleted {
            group_id: group_id.clone(),
        },
    );
    state.registry.drop_group(&group_id);

    tracing::info!(group_id = %group_id, "group deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}
