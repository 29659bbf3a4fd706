//! Configuration for the replication engine.

use crate::filter::{HubFilter, MeshFilter, ReplicationFilter};
use crate::retry::{BoundedRetry, FailFast, RetryPolicy};
use metasync_protocol::{EntityKind, NodeId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for one direct delivery call.
pub const DIRECT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Deployment topology of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One center node streams changes to many edge nodes.
    HubSpoke,
    /// Fully decentralized; nodes call each other directly.
    Mesh,
}

/// Retry strategy applied when a delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Abandon after the first failed attempt.
    FailFast,
    /// Allow up to this many attempts in total.
    Bounded(u32),
}

/// Configuration for a node's replication engine.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// This node's id; never a replication target of itself.
    pub node_id: NodeId,
    /// Deployment topology.
    pub topology: Topology,
    /// Peer nodes that receive replicated changes.
    pub peers: Vec<NodeId>,
    /// Entity kinds eligible for replication.
    pub allowed_kinds: HashSet<EntityKind>,
    /// Timeout for one direct delivery call.
    pub direct_timeout: Duration,
    /// Pause before the push-stream listener reconnects after a failure.
    pub reconnect_delay: Duration,
    /// Keep abandoned records on a dead-letter list instead of dropping them.
    pub keep_abandoned: bool,
    /// Retry strategy for failed deliveries.
    pub retry: RetryStrategy,
}

impl ReplicationConfig {
    /// Creates a configuration with every known entity kind allowed.
    pub fn new(node_id: impl Into<NodeId>, topology: Topology) -> Self {
        Self {
            node_id: node_id.into(),
            topology,
            peers: Vec::new(),
            allowed_kinds: EntityKind::ALL.iter().copied().collect(),
            direct_timeout: DIRECT_SEND_TIMEOUT,
            reconnect_delay: Duration::ZERO,
            keep_abandoned: false,
            retry: RetryStrategy::Bounded(3),
        }
    }

    /// Sets the peer nodes.
    pub fn with_peers(mut self, peers: Vec<NodeId>) -> Self {
        self.peers = peers;
        self
    }

    /// Restricts the allow-list of replicable kinds.
    pub fn with_allowed_kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.allowed_kinds = kinds.into_iter().collect();
        self
    }

    /// Sets the direct delivery timeout.
    pub fn with_direct_timeout(mut self, timeout: Duration) -> Self {
        self.direct_timeout = timeout;
        self
    }

    /// Sets the listener reconnect pause.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Keeps abandoned records on a dead-letter list.
    pub fn with_keep_abandoned(mut self, keep: bool) -> Self {
        self.keep_abandoned = keep;
        self
    }

    /// Sets the retry strategy.
    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the topology-specific eligibility filter.
    pub fn filter(&self) -> Arc<dyn ReplicationFilter> {
        match self.topology {
            Topology::HubSpoke => Arc::new(HubFilter::new(self.allowed_kinds.clone())),
            Topology::Mesh => Arc::new(MeshFilter::new(self.allowed_kinds.clone())),
        }
    }

    /// Builds the configured retry policy.
    pub fn policy(&self) -> Arc<dyn RetryPolicy> {
        match self.retry {
            RetryStrategy::FailFast => Arc::new(FailFast),
            RetryStrategy::Bounded(budget) => Arc::new(BoundedRetry::new(budget)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReplicationConfig::new("node-a", Topology::Mesh);
        assert_eq!(config.node_id, NodeId::new("node-a"));
        assert_eq!(config.direct_timeout, DIRECT_SEND_TIMEOUT);
        assert_eq!(config.retry, RetryStrategy::Bounded(3));
        assert!(!config.keep_abandoned);
        assert_eq!(config.allowed_kinds.len(), EntityKind::ALL.len());
    }

    #[test]
    fn builders() {
        let config = ReplicationConfig::new("hub", Topology::HubSpoke)
            .with_peers(vec![NodeId::new("edge-1"), NodeId::new("edge-2")])
            .with_allowed_kinds([EntityKind::Project, EntityKind::Task])
            .with_direct_timeout(Duration::from_secs(1))
            .with_keep_abandoned(true)
            .with_retry(RetryStrategy::FailFast);

        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.allowed_kinds.len(), 2);
        assert!(config.keep_abandoned);
        assert_eq!(config.retry, RetryStrategy::FailFast);
    }
}
