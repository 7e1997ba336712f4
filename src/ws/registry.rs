//! Connection registry: indexed maps from principal to live connections and
//! from group id to live subscriber set.
//!
//! The subscriber set is a cache of "who is listening", never an
//! authorization source — group membership is checked against the store at
//! send time. `subscribe` deliberately does not validate membership (the
//! client may join the live channel before the REST add-member call lands);
//! this is a documented simplification, not security-sound on its own.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Sender half of a connection's outbound channel. Anything holding a clone
/// can push messages to that client; the per-connection writer task drains
/// the channel in order.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Opaque handle for one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct ConnectionEntry {
    principal: Option<String>,
    tx: ConnectionSender,
}

/// Tracks live connections. One principal may own several connections
/// (multi-device); one connection may subscribe to several groups.
/// All operations on unknown ids return empty results, never fail.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    next_id: Arc<AtomicU64>,
    connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,
    principals: Arc<DashMap<String, Vec<ConnectionId>>>,
    groups: Arc<DashMap<String, HashSet<ConnectionId>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new, unauthenticated connection.
    pub fn register(&self, tx: ConnectionSender) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(
            id,
            ConnectionEntry {
                principal: None,
                tx,
            },
        );
        id
    }

    /// Bind a principal to a connection. Idempotent; rebinding to a
    /// different principal moves the connection between principal indexes.
    pub fn identify(&self, id: ConnectionId, principal_id: &str) {
        let previous = match self.connections.get_mut(&id) {
            Some(mut entry) => entry.principal.replace(principal_id.to_string()),
            None => return,
        };

        if previous.as_deref() == Some(principal_id) {
            return;
        }
        if let Some(old) = previous {
            self.remove_from_principal_index(&old, id);
        }

        self.principals
            .entry(principal_id.to_string())
            .or_default()
            .push(id);
    }

    /// Add a connection to a group's live subscriber set. No membership
    /// validation here; see the module docs.
    pub fn subscribe(&self, id: ConnectionId, group_id: &str) {
        if !self.connections.contains_key(&id) {
            return;
        }
        self.groups
            .entry(group_id.to_string())
            .or_default()
            .insert(id);
    }

    /// Remove a connection from a group's set; safe if absent.
    pub fn unsubscribe(&self, id: ConnectionId, group_id: &str) {
        let mut drop_group = false;
        if let Some(mut set) = self.groups.get_mut(group_id) {
            set.remove(&id);
            drop_group = set.is_empty();
        }
        if drop_group {
            self.groups.remove_if(group_id, |_, set| set.is_empty());
        }
    }

    /// Remove a connection from every group set and clear its principal
    /// binding. Called on socket close/error; safe to call twice.
    pub fn unregister(&self, id: ConnectionId) {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return;
        };

        if let Some(principal) = entry.principal {
            self.remove_from_principal_index(&principal, id);
        }

        self.groups.retain(|_, set| {
            set.remove(&id);
            !set.is_empty()
        });
    }

    /// Drop a group's entire subscriber set (used when the group is deleted).
    pub fn drop_group(&self, group_id: &str) {
        self.groups.remove(group_id);
    }

    /// Remove all of one principal's connections from a group's subscriber
    /// set. Keeps the live cache consistent when a member is kicked or
    /// leaves via REST.
    pub fn evict_principal_from_group(&self, principal_id: &str, group_id: &str) {
        let Some(conn_ids) = self.principals.get(principal_id).map(|v| v.value().clone()) else {
            return;
        };
        let mut drop_group = false;
        if let Some(mut set) = self.groups.get_mut(group_id) {
            for id in &conn_ids {
                set.remove(id);
            }
            drop_group = set.is_empty();
        }
        if drop_group {
            self.groups.remove_if(group_id, |_, set| set.is_empty());
        }
    }

    /// Currently open connections for a principal (multi-device fan-out).
    pub fn connections_for(&self, principal_id: &str) -> Vec<ConnectionSender> {
        let Some(conn_ids) = self.principals.get(principal_id) else {
            return Vec::new();
        };
        conn_ids
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|entry| entry.tx.clone())
            .filter(|tx| !tx.is_closed())
            .collect()
    }

    /// Currently open connections subscribed to a group.
    pub fn subscribers_of(&self, group_id: &str) -> Vec<ConnectionSender> {
        let Some(conn_ids) = self.groups.get(group_id).map(|s| s.value().clone()) else {
            return Vec::new();
        };
        conn_ids
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|entry| entry.tx.clone())
            .filter(|tx| !tx.is_closed())
            .collect()
    }

    /// Principal bound to a connection, if identified.
    pub fn principal_of(&self, id: ConnectionId) -> Option<String> {
        self.connections.get(&id).and_then(|e| e.principal.clone())
    }

    fn remove_from_principal_index(&self, principal: &str, id: ConnectionId) {
        let mut drop_key = false;
        if let Some(mut conn_ids) = self.principals.get_mut(principal) {
            conn_ids.retain(|c| *c != id);
            drop_key = conn_ids.is_empty();
        }
        if drop_key {
            self.principals.remove_if(principal, |_, v| v.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> (ConnectionSender, mpsc::UnboundedReceiver<axum::extract::ws::Message>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn identify_is_idempotent_and_supports_multi_device() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = conn();
        let (tx2, _rx2) = conn();

        let a = registry.register(tx1);
        let b = registry.register(tx2);
        registry.identify(a, "alice");
        registry.identify(a, "alice"); // no duplicate entry
        registry.identify(b, "alice");

        assert_eq!(registry.connections_for("alice").len(), 2);
        assert_eq!(registry.principal_of(a).as_deref(), Some("alice"));
    }

    #[test]
    fn unregister_removes_from_every_group_set() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = conn();

        let id = registry.register(tx);
        registry.identify(id, "alice");
        registry.subscribe(id, "g1");
        registry.subscribe(id, "g2");
        assert_eq!(registry.subscribers_of("g1").len(), 1);

        registry.unregister(id);
        registry.unregister(id); // idempotent

        assert!(registry.subscribers_of("g1").is_empty());
        assert!(registry.subscribers_of("g2").is_empty());
        assert!(registry.connections_for("alice").is_empty());
        assert!(registry.principal_of(id).is_none());
    }

    #[test]
    fn unknown_ids_yield_empty_results() {
        let registry = ConnectionRegistry::new();
        assert!(registry.connections_for("nobody").is_empty());
        assert!(registry.subscribers_of("no-group").is_empty());
        registry.unsubscribe(ConnectionId(42), "no-group"); // no panic
        registry.unregister(ConnectionId(42));
    }

    #[test]
    fn closed_senders_are_filtered_out() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = conn();
        let id = registry.register(tx);
        registry.identify(id, "alice");
        registry.subscribe(id, "g1");

        drop(rx); // peer went away, sender is now closed

        assert!(registry.subscribers_of("g1").is_empty());
        assert!(registry.connections_for("alice").is_empty());
    }

    #[test]
    fn evict_principal_from_group_clears_only_that_group() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = conn();
        let id = registry.register(tx);
        registry.identify(id, "alice");
        registry.subscribe(id, "g1");
        registry.subscribe(id, "g2");

        registry.evict_principal_from_group("alice", "g1");

        assert!(registry.subscribers_of("g1").is_empty());
        assert_eq!(registry.subscribers_of("g2").len(), 1);
    }
}
