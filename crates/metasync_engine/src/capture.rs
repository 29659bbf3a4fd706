//! Post-commit change capture.
//!
//! The storage layer calls [`ChangeCapture::on_commit`] after every durable
//! local mutation of a replicable entity, on the committing thread. Capture
//! normalizes the mutation into a change record, runs the topology filter,
//! and fans the record out to the buffers of every targeted peer.
//!
//! Mutations made while applying an incoming replicated change carry
//! [`ChangeOrigin::Replicated`] and are suppressed here; that is what keeps
//! two nodes from replaying each other's changes forever.

use crate::buffer::DestinationBuffers;
use crate::filter::ReplicationFilter;
use crate::liveness::LivenessTracker;
use metasync_protocol::{ChangeAction, ChangeRecord, EntityBody, NodeId};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::trace;

/// Where a storage mutation came from.
///
/// The explicit parameter threaded through the apply call path; there is no
/// ambient flag to leak between concurrent applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// The mutation was made by this node's own control plane.
    Local,
    /// The mutation is the local apply of a change received from a peer.
    Replicated,
}

/// Turns committed local mutations into buffered change records.
pub struct ChangeCapture {
    buffers: Arc<DestinationBuffers>,
    filter: Arc<dyn ReplicationFilter>,
    liveness: Arc<LivenessTracker>,
    trigger: Option<Sender<NodeId>>,
    local_node: NodeId,
    peers: Vec<NodeId>,
}

impl ChangeCapture {
    /// Creates a capture hook.
    ///
    /// `trigger`, when wired, requests a delivery attempt for each targeted
    /// peer that is already reachable; the dispatcher's in-flight marker
    /// absorbs redundant requests.
    pub fn new(
        buffers: Arc<DestinationBuffers>,
        filter: Arc<dyn ReplicationFilter>,
        liveness: Arc<LivenessTracker>,
        trigger: Option<Sender<NodeId>>,
        local_node: NodeId,
        peers: Vec<NodeId>,
    ) -> Self {
        Self {
            buffers,
            filter,
            liveness,
            trigger,
            local_node,
            peers,
        }
    }

    /// Observes one committed mutation.
    ///
    /// Must be called only after the mutation is durable locally. Replicated
    /// origins are absorbed without producing a record.
    pub fn on_commit(&self, action: ChangeAction, body: EntityBody, origin: ChangeOrigin) {
        if origin == ChangeOrigin::Replicated {
            trace!(kind = %body.kind(), "replicated apply, not re-captured");
            return;
        }

        let record = ChangeRecord::new(action, body);
        if !self.filter.eligible(&record) {
            trace!(record = %record.key(), action = %record.action(), "change not eligible");
            return;
        }

        for dest in self.targets(&record) {
            self.buffers.push(&dest, record.clone());
            if self.liveness.is_reachable(&dest) {
                if let Some(trigger) = &self.trigger {
                    let _ = trigger.send(dest);
                }
            }
        }
    }

    /// Destinations a record fans out to: the configured peers minus this
    /// node, narrowed by the record's node hints when it carries any.
    fn targets(&self, record: &ChangeRecord) -> Vec<NodeId> {
        let hints = record.node_ids();
        self.peers
            .iter()
            .filter(|peer| **peer != self.local_node)
            .filter(|peer| hints.is_empty() || hints.contains(peer))
            .cloned()
            .collect()
    }
}
