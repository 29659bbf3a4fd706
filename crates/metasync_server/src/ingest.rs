//! The ingestion request handler.
//!
//! Receives change envelopes POSTed by peers (the direct transport's far
//! end), applies them through the engine's [`ChangeApplier`], and answers a
//! [`ReplyEnvelope`]. The handler never panics on bad input: a body it
//! cannot parse or apply is logged and answered with a non-zero status.

use crate::config::ServerConfig;
use metasync_engine::{ChangeApplier, IngestEndpoint};
use metasync_protocol::{ChangeEnvelope, NodeId, ReplyEnvelope};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handles ingestion requests on behalf of the local node.
pub struct IngestHandler {
    config: ServerConfig,
    applier: Arc<ChangeApplier>,
}

impl IngestHandler {
    /// Creates a handler applying changes through `applier`.
    pub fn new(config: ServerConfig, applier: Arc<ChangeApplier>) -> Self {
        Self { config, applier }
    }

    /// Handles one POSTed body from `origin`.
    ///
    /// Always answers; `status.code == 0` means the change was applied and
    /// the accepted envelope is echoed back in `data`.
    pub fn handle_ingest(&self, origin: &NodeId, body: &[u8]) -> ReplyEnvelope {
        if body.len() > self.config.max_body_bytes {
            warn!(origin = %origin, bytes = body.len(), "ingest body too large");
            return ReplyEnvelope::error(ReplyEnvelope::CODE_BAD_REQUEST, "body too large");
        }

        let envelope = match ChangeEnvelope::from_bytes(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(origin = %origin, error = %e, "malformed ingest body");
                return ReplyEnvelope::error(ReplyEnvelope::CODE_BAD_REQUEST, e.to_string());
            }
        };

        match self.applier.apply_envelope(&envelope) {
            Ok(()) => {
                debug!(origin = %origin, table = %envelope.table_name, action = %envelope.action, "change ingested");
                let echo = serde_json::to_value(&envelope).unwrap_or_default();
                ReplyEnvelope::ok(echo)
            }
            Err(e) => {
                warn!(origin = %origin, table = %envelope.table_name, error = %e, "failed to apply ingested change");
                ReplyEnvelope::error(ReplyEnvelope::CODE_APPLY_FAILED, e.to_string())
            }
        }
    }
}

impl IngestEndpoint for IngestHandler {
    fn handle(&self, origin: &NodeId, body: &[u8]) -> Vec<u8> {
        self.handle_ingest(origin, body)
            .to_bytes()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metasync_engine::MemoryStore;
    use metasync_protocol::{
        ChangeAction, ChangeRecord, EntityBody, EntityKind, RecordKey, Vote, VoteDecision,
    };
    use serde_json::json;

    fn handler_with_store() -> (Arc<MemoryStore>, IngestHandler) {
        let store = Arc::new(MemoryStore::new());
        let applier = Arc::new(ChangeApplier::new(
            Arc::clone(&store) as Arc<dyn metasync_engine::EntityStore>
        ));
        (store, IngestHandler::new(ServerConfig::default(), applier))
    }

    fn vote_envelope() -> Vec<u8> {
        let record = ChangeRecord::new(
            ChangeAction::Create,
            EntityBody::Vote(Vote {
                vote_id: "v-1".into(),
                project_id: "p-1".into(),
                node_id: NodeId::new("node-b"),
                decision: VoteDecision::Approve,
                last_update_time: 3,
            }),
        );
        ChangeEnvelope::from_record(&record)
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn applies_and_echoes() {
        let (store, handler) = handler_with_store();
        let reply = handler.handle_ingest(&NodeId::new("node-a"), &vote_envelope());

        assert!(reply.is_ok());
        let echo = reply.data.unwrap();
        assert_eq!(echo["tableName"], "vote");
        assert!(store
            .get(&RecordKey {
                kind: EntityKind::Vote,
                entity_id: "v-1".into()
            })
            .is_some());
    }

    #[test]
    fn malformed_body_is_answered_not_crashed() {
        let (store, handler) = handler_with_store();
        let reply = handler.handle_ingest(&NodeId::new("node-a"), b"not json at all");

        assert_eq!(reply.status.code, ReplyEnvelope::CODE_BAD_REQUEST);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_table_is_rejected_with_apply_failure() {
        let (store, handler) = handler_with_store();
        let body = serde_json::to_vec(&json!({
            "tableName": "credentials",
            "action": "CREATE",
            "data": {}
        }))
        .unwrap();

        let reply = handler.handle_ingest(&NodeId::new("node-a"), &body);
        assert_eq!(reply.status.code, ReplyEnvelope::CODE_APPLY_FAILED);
        assert!(store.is_empty());
    }

    #[test]
    fn oversize_body_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let applier = Arc::new(ChangeApplier::new(
            Arc::clone(&store) as Arc<dyn metasync_engine::EntityStore>
        ));
        let handler = IngestHandler::new(
            ServerConfig::default().with_max_body_bytes(16),
            applier,
        );

        let reply = handler.handle_ingest(&NodeId::new("node-a"), &vote_envelope());
        assert_eq!(reply.status.code, ReplyEnvelope::CODE_BAD_REQUEST);
    }

    #[test]
    fn endpoint_contract_returns_reply_bytes() {
        let (_store, handler) = handler_with_store();
        let bytes = handler.handle(&NodeId::new("node-a"), &vote_envelope());
        let reply = ReplyEnvelope::from_bytes(&bytes).unwrap();
        assert!(reply.is_ok());
    }
}
