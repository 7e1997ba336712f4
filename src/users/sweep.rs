//! Periodic duplicate-user sweep.
//!
//! Legacy snapshots can contain several records with the same display name;
//! the sweep keeps the most-recently-seen record per name. It runs on a
//! fixed interval and goes through `Store::mutate`, so it is serialized
//! with every other mutation by the store lock.

use std::collections::HashMap;
use std::time::Duration;

use crate::store::{ChatState, Store};

/// Remove duplicate users by display name, keeping the record with the
/// latest last-seen timestamp. Returns how many records were dropped.
pub fn dedup_users(state: &mut ChatState) -> usize {
    let mut keep: HashMap<String, (String, chrono::DateTime<chrono::Utc>)> = HashMap::new();
    for user in &state.users {
        match keep.get(&user.name) {
            Some((_, seen)) if *seen >= user.last_seen => {}
            _ => {
                keep.insert(user.name.clone(), (user.id.clone(), user.last_seen));
            }
        }
    }

    let before = state.users.len();
    state
        .users
        .retain(|u| keep.get(&u.name).map(|(id, _)| *id == u.id).unwrap_or(false));
    before - state.users.len()
}

/// Background task: run the sweep every `interval_secs`.
pub async fn run(store: Store, interval_secs: u64) {
    let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));
    // Skip the immediate first tick; the snapshot was just loaded.
    timer.tick().await;

    loop {
        timer.tick().await;
        match store.mutate(|s| Ok(dedup_users(s))).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(removed = removed, "duplicate-user sweep removed records");
            }
            Err(e) => {
                tracing::warn!(error = %e, "duplicate-user sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::User;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn keeps_the_most_recently_seen_record_per_name() {
        let mut state = ChatState::default();

        let mut old = User::new("alice", "$argon2id$x");
        old.last_seen = Utc::now() - ChronoDuration::hours(2);
        let old_id = old.id.clone();

        let fresh = User::new("alice", "$argon2id$y");
        let fresh_id = fresh.id.clone();

        let bob = User::new("bob", "$argon2id$z");

        state.users.extend([old, fresh, bob]);

        let removed = dedup_users(&mut state);
        assert_eq!(removed, 1);
        assert_eq!(state.users.len(), 2);
        assert!(state.user(&fresh_id).is_some());
        assert!(state.user(&old_id).is_none());
    }

    #[test]
    fn sweep_is_a_noop_without_duplicates() {
        let mut state = ChatState::default();
        state.users.push(User::new("alice", "$argon2id$x"));
        state.users.push(User::new("bob", "$argon2id$y"));
        assert_eq!(dedup_users(&mut state), 0);
        assert_eq!(state.users.len(), 2);
    }
}
