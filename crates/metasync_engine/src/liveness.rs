//! Peer liveness tracking (route detection).
//!
//! Keeps the set of peers currently believed reachable. The ABSENT→PRESENT
//! edge is the sole event that publishes a delivery trigger; repeated
//! liveness signals for an already-present peer are absorbed. The component
//! that actively health-checks peers is external and only calls the mark
//! operations here.

use metasync_protocol::NodeId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::mpsc::Sender;
use tracing::debug;

/// Tracks which peers are reachable and fires delivery triggers on the
/// absent→present edge.
pub struct LivenessTracker {
    reachable: RwLock<HashSet<NodeId>>,
    trigger: Mutex<Option<Sender<NodeId>>>,
}

impl LivenessTracker {
    /// Creates a tracker with no trigger wired.
    pub fn new() -> Self {
        Self {
            reachable: RwLock::new(HashSet::new()),
            trigger: Mutex::new(None),
        }
    }

    /// Creates a tracker publishing edges to the given channel.
    pub fn with_trigger(trigger: Sender<NodeId>) -> Self {
        Self {
            reachable: RwLock::new(HashSet::new()),
            trigger: Mutex::new(Some(trigger)),
        }
    }

    /// Wires (or replaces) the delivery trigger channel.
    pub fn set_trigger(&self, trigger: Sender<NodeId>) {
        *self.trigger.lock() = Some(trigger);
    }

    /// Marks a peer reachable.
    ///
    /// Returns true and publishes a delivery trigger only on the
    /// absent→present edge; marking an already-present peer is a no-op.
    pub fn mark_reachable(&self, node: &NodeId) -> bool {
        let inserted = self.reachable.write().insert(node.clone());
        if inserted {
            debug!(node = %node, "peer became reachable");
            if let Some(trigger) = self.trigger.lock().as_ref() {
                // The receiver disappears during shutdown; nothing to do.
                let _ = trigger.send(node.clone());
            }
        }
        inserted
    }

    /// Marks a peer unreachable. Returns true if it was present.
    pub fn mark_unreachable(&self, node: &NodeId) -> bool {
        let removed = self.reachable.write().remove(node);
        if removed {
            debug!(node = %node, "peer became unreachable");
        }
        removed
    }

    /// Clears every peer.
    pub fn reset(&self) {
        self.reachable.write().clear();
    }

    /// Returns true if the peer is currently believed reachable.
    pub fn is_reachable(&self, node: &NodeId) -> bool {
        self.reachable.read().contains(node)
    }

    /// Snapshot of the reachable set.
    pub fn reachable(&self) -> Vec<NodeId> {
        self.reachable.read().iter().cloned().collect()
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}
