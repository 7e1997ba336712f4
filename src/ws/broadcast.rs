//! Broadcast engine: fan one logical event out to a set of live connections.
//!
//! Delivery is at-most-once, best-effort, fire-and-forget per connection:
//! closed or stale senders are silently skipped, nothing is queued or
//! retried. Per-connection ordering is preserved because every connection
//! drains a single mpsc channel through one writer task.

use crate::ws::protocol::{encode, ServerEvent};
use crate::ws::registry::ConnectionRegistry;

/// Deliver an event to every open connection in the group's live
/// subscriber set at call time.
pub fn broadcast_to_group(registry: &ConnectionRegistry, group_id: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for tx in registry.subscribers_of(group_id) {
        let _ = tx.send(msg.clone());
    }
}

/// Deliver an event to every connection whose bound principal is in the
/// authoritative member list, regardless of live-subscription state. Used
/// for membership-change events so members who never joined the live
/// channel still learn about adds/kicks/deletes.
pub fn broadcast_to_membership(
    registry: &ConnectionRegistry,
    member_ids: &[String],
    event: &ServerEvent,
) {
    let Some(msg) = encode(event) else { return };
    for member_id in member_ids {
        for tx in registry.connections_for(member_id) {
            let _ = tx.send(msg.clone());
        }
    }
}

/// Deliver an event to all of one principal's open connections
/// (multi-device fan-out). An empty set is a silent no-op.
pub fn send_to_principal(registry: &ConnectionRegistry, principal_id: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };
    for tx in registry.connections_for(principal_id) {
        let _ = tx.send(msg.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::Message;
    use tokio::sync::mpsc;

    fn event() -> ServerEvent {
        ServerEvent::NewMessage {
            message: Message::group("u1", "g1", "hello"),
        }
    }

    #[test]
    fn delivers_exactly_to_the_open_subscriber_set_at_call_time() {
        let registry = ConnectionRegistry::new();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();

        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        let c = registry.register(tx_c);
        registry.subscribe(a, "g1");
        registry.subscribe(b, "g1");
        registry.subscribe(c, "other");

        drop(rx_b); // b's socket closed before the call

        broadcast_to_group(&registry, "g1", &event());

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err()); // different group

        // A connection opening after the call receives nothing.
        let (tx_late, mut rx_late) = mpsc::unbounded_channel();
        let late = registry.register(tx_late);
        registry.subscribe(late, "g1");
        assert_eq!(registry.subscribers_of("g1").len(), 2);
        assert!(rx_late.try_recv().is_err());
    }

    #[test]
    fn membership_broadcast_reaches_unsubscribed_members() {
        let registry = ConnectionRegistry::new();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(tx);
        registry.identify(id, "alice");
        // alice never joined the live channel

        let members = vec!["alice".to_string(), "offline-bob".to_string()];
        broadcast_to_membership(
            &registry,
            &members,
            &ServerEvent::GroupDeleted {
                group_id: "g1".into(),
            },
        );

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn send_to_principal_fans_out_to_all_devices() {
        let registry = ConnectionRegistry::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let a = registry.register(tx1);
        let b = registry.register(tx2);
        registry.identify(a, "alice");
        registry.identify(b, "alice");

        send_to_principal(&registry, "alice", &event());

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());

        // Unknown principal: silent no-op.
        send_to_principal(&registry, "nobody", &event());
    }
}
