//! Entity types for all persisted collections.
//! Wire names are camelCase, matching the snapshot file and the REST/WS
//! payloads the client already speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved sender id for synthetic membership-change announcements.
pub const SYSTEM_SENDER: &str = "system";

/// User account. `password_hash` is an argon2 PHC string; it lives in the
/// snapshot but must never appear in an API response (see `UserView`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub password_hash: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub friend_ids: Vec<String>,
}

impl User {
    pub fn new(name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            password_hash: password_hash.into(),
            is_online: true,
            last_seen: Utc::now(),
            friend_ids: Vec::new(),
        }
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            name: self.name.clone(),
            is_online: self.is_online,
            last_seen: self.last_seen,
            friend_ids: self.friend_ids.clone(),
        }
    }
}

/// Public projection of a user, safe to return from handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub friend_ids: Vec<String>,
}

/// Chat group. Invariant: `creator_id` is always present in `member_ids`,
/// and the creator can never be removed by leave/kick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub member_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }
}

/// A direct or group message. Invariant: exactly one of `receiver_id` /
/// `group_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub group_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    pub fn direct(sender_id: &str, receiver_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            sender_id: sender_id.to_string(),
            receiver_id: Some(receiver_id.to_string()),
            group_id: None,
            is_read: false,
        }
    }

    pub fn group(sender_id: &str, group_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            sender_id: sender_id.to_string(),
            receiver_id: None,
            group_id: Some(group_id.to_string()),
            is_read: false,
        }
    }

    /// Synthetic membership-change announcement, e.g. "alice joined".
    pub fn system_announcement(group_id: &str, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            timestamp: Utc::now(),
            sender_id: SYSTEM_SENDER.to_string(),
            receiver_id: None,
            group_id: Some(group_id.to_string()),
            is_read: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from_user_id: String,
    pub to_user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl Notification {
    pub fn new(kind: NotificationKind, from_user_id: &str, to_user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            timestamp: Utc::now(),
            is_read: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: FriendRequestStatus,
    pub timestamp: DateTime<Utc>,
}

impl FriendRequest {
    pub fn new(from_user_id: &str, to_user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            status: FriendRequestStatus::Pending,
            timestamp: Utc::now(),
        }
    }
}
