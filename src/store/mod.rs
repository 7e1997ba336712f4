//! Authoritative in-memory state plus durable JSON snapshot persistence.
//!
//! All collections live behind one `Arc<Mutex<_>>`; operations lock inside
//! `tokio::task::spawn_blocking` so the async runtime is never blocked and
//! every mutation runs to completion before the next one starts. A mutation
//! is not acknowledged (no response, no broadcast) until the snapshot write
//! has finished — the file write happens while the lock is still held.

pub mod models;
pub mod snapshot;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use models::{FriendRequest, Group, Message, Notification, User};

/// All persisted collections. Serializes to the snapshot document.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChatState {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub friend_requests: Vec<FriendRequest>,
}

impl ChatState {
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_mut(&mut self, id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }
}

/// Handle to the shared store. Cloneable; stored in `AppState`.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<ChatState>>,
    path: PathBuf,
}

impl Store {
    /// Open the store: create the data directory if needed and load the
    /// snapshot (or start empty).
    pub fn open(data_dir: &str) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(data_dir)?;
        let path = snapshot::snapshot_path(data_dir);
        let state = snapshot::load(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
            path,
        })
    }

    /// In-memory store for tests; snapshot writes go to a temp location.
    #[cfg(test)]
    pub fn open_temp() -> (Self, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Self::open(dir.path().to_str().expect("utf8 path")).expect("open store");
        (store, dir)
    }

    /// Run a read-only closure against the state.
    pub async fn read<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&ChatState) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let state = inner
                .lock()
                .map_err(|_| ApiError::internal("store lock poisoned"))?;
            f(&state)
        })
        .await
        .map_err(ApiError::internal)?
    }

    /// Run a mutating closure and, if it succeeds, write the snapshot
    /// before returning. The lock is held across the write so the mutation
    /// is durable before anyone can observe it.
    ///
    /// Closures must do all validation before touching the state: an Err
    /// return skips the snapshot write, so anything mutated before the
    /// error would only live in memory.
    pub async fn mutate<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut ChatState) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut state = inner
                .lock()
                .map_err(|_| ApiError::internal("store lock poisoned"))?;
            let out = f(&mut state)?;
            snapshot::save(&path, &state).map_err(ApiError::internal)?;
            Ok(out)
        })
        .await
        .map_err(ApiError::internal)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::User;

    #[tokio::test]
    async fn mutate_persists_and_read_observes() {
        let (store, _dir) = Store::open_temp();

        store
            .mutate(|state| {
                state.users.push(User::new("alice", "$argon2id$x"));
                Ok(())
            })
            .await
            .unwrap();

        let count = store.read(|state| Ok(state.users.len())).await.unwrap();
        assert_eq!(count, 1);

        // Reopen from the same snapshot path to prove durability.
        let reopened = Store {
            inner: Arc::new(Mutex::new(snapshot::load(&store.path).unwrap())),
            path: store.path.clone(),
        };
        let count = reopened.read(|state| Ok(state.users.len())).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn failed_mutation_writes_nothing() {
        let (store, _dir) = Store::open_temp();

        let err = store
            .mutate(|state| {
                state.users.push(User::new("ghost", "$argon2id$x"));
                Err::<(), _>(ApiError::Validation("rejected".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // The snapshot on disk must not contain the rejected write.
        let on_disk = snapshot::load(&store.path).unwrap();
        assert!(on_disk.users.is_empty());
    }
}
