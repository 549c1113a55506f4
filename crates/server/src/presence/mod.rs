//! Presence broadcaster: tells every connected client who is online.
//!
//! Runs after every successful register or unregister. The broadcast is a
//! full-state replacement of each client's cached online set, not a delta,
//! and is best-effort per recipient: one dead connection never blocks
//! delivery to the rest.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use duplex_common::ServerEvent;

use crate::registry::ConnectionRegistry;

pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
    /// Serializes snapshot-plus-send. Without it, two concurrent
    /// broadcasts could enqueue their events in the opposite order of
    /// their snapshots, leaving clients with a stale online set until
    /// the next registry change.
    serialize: Mutex<()>,
}

impl PresenceBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            serialize: Mutex::new(()),
        }
    }

    /// Emit the current online set to every registered connection.
    ///
    /// The online set and the recipient list come from one registry
    /// snapshot, so every client receives the same coherent view.
    /// Snapshot and enqueue happen under one mutex, so a newer snapshot
    /// is never overtaken by an older one on any connection's channel.
    /// Sends are non-blocking channel pushes; no lock is held across
    /// I/O or an `.await`.
    pub fn broadcast(&self) {
        let _serialized = self.serialize.lock();
        let (online, targets) = self.registry.snapshot();
        let event = ServerEvent::PresenceUpdate { online };

        for (user_id, tx) in targets {
            if tx.send(event.clone()).is_err() {
                // Connection dropped between snapshot and send. Its own
                // cleanup will unregister it and rebroadcast.
                debug!(user_id = %user_id, "presence send to closed connection skipped");
            }
        }
    }
}
