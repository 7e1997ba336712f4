//! Durable snapshot of the full store state as one JSON document.
//! Every mutating operation rewrites the file; a crash loses at most the
//! last unflushed event. Writes go to a temp file first and are renamed
//! into place so a crash mid-write never corrupts the snapshot.

use std::path::{Path, PathBuf};

use super::ChatState;

/// Snapshot file name inside the data directory.
const SNAPSHOT_FILE: &str = "data.json";

pub fn snapshot_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(SNAPSHOT_FILE)
}

/// Load the snapshot, or start from an empty state when no file exists yet.
pub fn load(path: &Path) -> Result<ChatState, std::io::Error> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no snapshot found, starting empty");
        return Ok(ChatState::default());
    }

    let bytes = std::fs::read(path)?;
    let state: ChatState = serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    tracing::info!(
        path = %path.display(),
        users = state.users.len(),
        groups = state.groups.len(),
        messages = state.messages.len(),
        "snapshot loaded"
    );
    Ok(state)
}

/// Write the full state atomically (temp file + rename).
pub fn save(path: &Path, state: &ChatState) -> Result<(), std::io::Error> {
    let json = serde_json::to_vec(state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{Group, Message, Notification, NotificationKind, User};

    #[test]
    fn round_trip_preserves_all_collections() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path().to_str().unwrap());

        let mut state = ChatState::default();
        let alice = User::new("alice", "$argon2id$x");
        let bob = User::new("bob", "$argon2id$y");
        state.groups.push(Group {
            id: "g1".into(),
            name: "team".into(),
            creator_id: alice.id.clone(),
            member_ids: vec![alice.id.clone(), bob.id.clone()],
            created_at: chrono::Utc::now(),
        });
        state.messages.push(Message::group(&alice.id, "g1", "hello"));
        state.messages.push(Message::direct(&alice.id, &bob.id, "hi bob"));
        state
            .notifications
            .push(Notification::new(NotificationKind::FriendRequest, &alice.id, &bob.id));
        state.users.push(alice);
        state.users.push(bob);

        save(&path, &state).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(
            serde_json::to_value(&loaded).unwrap(),
            serde_json::to_value(&state).unwrap()
        );
    }

    #[test]
    fn missing_file_yields_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load(&snapshot_path(dir.path().to_str().unwrap())).unwrap();
        assert!(state.users.is_empty());
        assert!(state.groups.is_empty());
        assert!(state.messages.is_empty());
    }
}
