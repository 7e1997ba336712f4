//! Membership authority: the single source of truth for "who is in this
//! group", independent of who is currently connected.
//!
//! Every operation validates first and applies atomically to the locked
//! state; callers run these inside `Store::mutate` so a successful return
//! is durable before any broadcast goes out.

use crate::error::ApiError;
use crate::store::models::{Group, Message};
use crate::store::ChatState;
use chrono::Utc;
use uuid::Uuid;

/// Result of `add_member`: `announcement` is `None` when the user was
/// already a member (a no-op, not an error).
#[derive(Debug)]
pub struct AddMemberOutcome {
    pub group: Group,
    pub announcement: Option<Message>,
}

/// Create a group. The creator is unconditionally a member, even when
/// omitted from `initial_member_ids`. Duplicate group names are not
/// enforced.
pub fn create_group(
    state: &mut ChatState,
    name: &str,
    creator_id: &str,
    initial_member_ids: &[String],
) -> Result<Group, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("group name must not be empty".into()));
    }
    if state.user(creator_id).is_none() {
        return Err(ApiError::NotFound("user"));
    }
    for member_id in initial_member_ids {
        if state.user(member_id).is_none() {
            return Err(ApiError::NotFound("user"));
        }
    }

    let mut member_ids = vec![creator_id.to_string()];
    for member_id in initial_member_ids {
        if !member_ids.contains(member_id) {
            member_ids.push(member_id.clone());
        }
    }

    let group = Group {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        creator_id: creator_id.to_string(),
        member_ids,
        created_at: Utc::now(),
    };
    state.groups.push(group.clone());
    Ok(group)
}

/// Add a member. Creator-only. Already-a-member is a no-op.
/// Emits a synthetic system message announcing the addition.
pub fn add_member(
    state: &mut ChatState,
    group_id: &str,
    requester_id: &str,
    new_member_id: &str,
) -> Result<AddMemberOutcome, ApiError> {
    let member_name = state
        .user(new_member_id)
        .map(|u| u.name.clone())
        .ok_or(ApiError::NotFound("user"))?;

    let group = state.group_mut(group_id).ok_or(ApiError::NotFound("group"))?;
    if group.creator_id != requester_id {
        return Err(ApiError::PermissionDenied(
            "only the group creator can add members".into(),
        ));
    }
    if group.is_member(new_member_id) {
        return Ok(AddMemberOutcome {
            group: group.clone(),
            announcement: None,
        });
    }

    group.member_ids.push(new_member_id.to_string());
    let group = group.clone();

    let announcement =
        Message::system_announcement(group_id, format!("{} joined the group", member_name));
    state.messages.push(announcement.clone());

    Ok(AddMemberOutcome {
        group,
        announcement: Some(announcement),
    })
}

/// Remove a member ("kick"). Creator-only; the creator can never be the
/// target.
pub fn remove_member(
    state: &mut ChatState,
    group_id: &str,
    requester_id: &str,
    target_id: &str,
) -> Result<Group, ApiError> {
    let group = state.group_mut(group_id).ok_or(ApiError::NotFound("group"))?;
    if group.creator_id != requester_id {
        return Err(ApiError::PermissionDenied(
            "only the group creator can remove members".into(),
        ));
    }
    if target_id == group.creator_id {
        return Err(ApiError::InvalidOperation(
            "the group creator cannot be removed".into(),
        ));
    }
    if !group.is_member(target_id) {
        return Err(ApiError::NotFound("member"));
    }

    group.member_ids.retain(|m| m != target_id);
    Ok(group.clone())
}

/// Leave a group. The creator cannot leave their own group (they must
/// delete it instead). Emits a synthetic system message.
pub fn leave_group(
    state: &mut ChatState,
    group_id: &str,
    user_id: &str,
) -> Result<(Group, Message), ApiError> {
    let user_name = state
        .user(user_id)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| user_id.to_string());

    let group = state.group_mut(group_id).ok_or(ApiError::NotFound("group"))?;
    if group.creator_id == user_id {
        return Err(ApiError::InvalidOperation(
            "the creator cannot leave their own group; delete it instead".into(),
        ));
    }
    if !group.is_member(user_id) {
        return Err(ApiError::InvalidOperation("not a member of this group".into()));
    }

    group.member_ids.retain(|m| m != user_id);
    let group = group.clone();

    let announcement =
        Message::system_announcement(group_id, format!("{} left the group", user_name));
    state.messages.push(announcement.clone());

    Ok((group, announcement))
}

/// Delete a group. Creator-only. Cascades: every message with this group id
/// is deleted first, then the group itself.
pub fn delete_group(
    state: &mut ChatState,
    group_id: &str,
    requester_id: &str,
) -> Result<Group, ApiError> {
    let group = state.group(group_id).ok_or(ApiError::NotFound("group"))?;
    if group.creator_id != requester_id {
        return Err(ApiError::PermissionDenied(
            "only the group creator can delete the group".into(),
        ));
    }

    state
        .messages
        .retain(|m| m.group_id.as_deref() != Some(group_id));

    let idx = state
        .groups
        .iter()
        .position(|g| g.id == group_id)
        .ok_or(ApiError::NotFound("group"))?;
    Ok(state.groups.remove(idx))
}
