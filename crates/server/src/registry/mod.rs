//! Connection registry: the single piece of shared mutable presence state.
//!
//! Maps a user id to that user's current live connection. All mutations go
//! through [`ConnectionRegistry::register`] / [`ConnectionRegistry::unregister`]
//! under one `parking_lot` lock, so register/unregister for the same user are
//! linearized and concurrent operations on different users cannot corrupt the
//! map. The lock is only ever held for the in-memory operation itself, never
//! across I/O or an `.await`.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use duplex_common::ServerEvent;

/// Sender half of a connection's event channel. Cloning this lets any part
/// of the server push events to that client; the writer task on the other
/// end serializes them onto the WebSocket.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Identity of one live connection, distinct from the owning user. Used to
/// guard unregistration against the reconnect race: a stale connection's
/// cleanup must not evict a newer connection of the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One registered connection: its unique id plus the channel into its
/// writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub tx: EventSender,
}

impl ConnectionHandle {
    pub fn new(tx: EventSender) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
        }
    }
}

/// In-memory map from user id to that user's current connection.
///
/// Exactly one handle is tracked per user: a later connection from the same
/// user replaces the earlier one (last-connection-wins), and the replaced
/// handle is returned so its channel can be dropped, which ends the old
/// writer task.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `user_id` with `handle`, replacing any prior handle for
    /// that user. Returns the replaced handle, if any.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections
            .write()
            .insert(user_id.to_string(), handle)
    }

    /// Remove the association for `user_id`, but only if `connection_id`
    /// is still the handle on record. Returns whether anything was removed.
    ///
    /// The id check guards the reconnect race: if the user reconnected and
    /// a newer handle replaced this one, the stale cleanup is a no-op.
    pub fn unregister(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write();
        match connections.get(user_id) {
            Some(current) if current.id == connection_id => {
                connections.remove(user_id);
                true
            }
            _ => false,
        }
    }

    /// Sender for `user_id`'s current connection, if online.
    pub fn lookup(&self, user_id: &str) -> Option<EventSender> {
        self.connections.read().get(user_id).map(|h| h.tx.clone())
    }

    /// The derived online set: every user with a registered connection.
    pub fn online_users(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Consistent snapshot of the online set together with every sender,
    /// taken under a single read lock so a broadcast sees one coherent
    /// registry state. Sends happen after the lock is released.
    pub fn snapshot(&self) -> (Vec<String>, Vec<(String, EventSender)>) {
        let connections = self.connections.read();
        let online: Vec<String> = connections.keys().cloned().collect();
        let senders = connections
            .iter()
            .map(|(user, handle)| (user.clone(), handle.tx.clone()))
            .collect();
        (online, senders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn online_set_tracks_register_unregister_exactly() {
        let registry = ConnectionRegistry::new();
        assert!(registry.online_users().is_empty());

        let (alice, _rx_a) = handle();
        let alice_id = alice.id;
        let (bob, _rx_b) = handle();
        let bob_id = bob.id;

        registry.register("alice", alice);
        registry.register("bob", bob);

        let mut online = registry.online_users();
        online.sort();
        assert_eq!(online, vec!["alice".to_string(), "bob".to_string()]);

        assert!(registry.unregister("alice", alice_id));
        assert_eq!(registry.online_users(), vec!["bob".to_string()]);
        assert!(registry.lookup("alice").is_none());
        assert!(registry.lookup("bob").is_some());

        assert!(registry.unregister("bob", bob_id));
        assert!(registry.online_users().is_empty());
    }

    #[test]
    fn register_replaces_prior_handle_last_wins() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let first_id = first.id;
        let (second, _rx2) = handle();
        let second_id = second.id;

        assert!(registry.register("alice", first).is_none());
        let replaced = registry.register("alice", second).expect("first replaced");
        assert_eq!(replaced.id, first_id);

        // Only one entry for the user, and it is the newer one
        assert_eq!(registry.online_users(), vec!["alice".to_string()]);
        assert!(registry.lookup("alice").is_some());
        assert_eq!(registry.connections.read().get("alice").unwrap().id, second_id);
    }

    #[test]
    fn stale_unregister_does_not_evict_newer_connection() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle();
        let old_id = old.id;
        let (new, _rx2) = handle();

        registry.register("alice", old);
        registry.register("alice", new);

        // The old connection's deferred cleanup fires after the reconnect
        assert!(!registry.unregister("alice", old_id));
        assert_eq!(registry.online_users(), vec!["alice".to_string()]);
    }

    #[test]
    fn snapshot_is_coherent() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx_a) = handle();
        let (bob, _rx_b) = handle();
        registry.register("alice", alice);
        registry.register("bob", bob);

        let (online, senders) = registry.snapshot();
        assert_eq!(online.len(), 2);
        assert_eq!(senders.len(), 2);
        let sender_users: Vec<&str> = senders.iter().map(|(u, _)| u.as_str()).collect();
        for user in &online {
            assert!(sender_users.contains(&user.as_str()));
        }
    }
}
