//! Change records: the unit of replication.

use crate::entity::{EntityBody, EntityKind};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The mutation a change record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    /// The entity was inserted.
    Create,
    /// The entity was updated.
    Update,
    /// The entity was deleted.
    Remove,
}

impl ChangeAction {
    /// Wire token for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "CREATE",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup identity of a change record.
///
/// Two records queued for the same destination with equal keys are
/// duplicates: the later enqueue is a no-op. The key is stable across
/// repeated snapshots of the same logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity primary key.
    pub entity_id: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.entity_id)
    }
}

/// One committed entity mutation, normalized for replication.
///
/// Records are immutable once constructed: the buffer and transport layers
/// only copy and forward them. The routing hints (`project_id`, `node_ids`)
/// are denormalized out of the snapshot at construction time so that
/// filtering and targeting never re-inspect the payload.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    record_id: Uuid,
    action: ChangeAction,
    body: EntityBody,
    project_id: Option<String>,
    node_ids: Vec<NodeId>,
}

impl ChangeRecord {
    /// Builds a record from a committed mutation.
    pub fn new(action: ChangeAction, body: EntityBody) -> Self {
        let project_id = body.project_id().map(str::to_owned);
        let node_ids = body.node_ids();
        Self {
            record_id: Uuid::new_v4(),
            action,
            body,
            project_id,
            node_ids,
        }
    }

    /// Unique id of this record, used to correlate log lines.
    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    /// The mutation this record carries.
    pub fn action(&self) -> ChangeAction {
        self.action
    }

    /// Entity kind of the snapshot.
    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    /// The full entity snapshot.
    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    /// Project routing hint.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Node routing hints. Empty means "all peers".
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Dedup identity: `(kind, entity primary key)`.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            kind: self.body.kind(),
            entity_id: self.body.identity().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Project, Vote, VoteDecision};

    fn sample_project() -> EntityBody {
        EntityBody::Project(Project {
            project_id: "p-42".into(),
            name: "joint-psi".into(),
            owner_node: NodeId::new("node-a"),
            member_nodes: vec![NodeId::new("node-b")],
            last_update_time: 10,
        })
    }

    #[test]
    fn hints_denormalized_at_construction() {
        let record = ChangeRecord::new(ChangeAction::Create, sample_project());
        assert_eq!(record.project_id(), Some("p-42"));
        assert_eq!(record.node_ids().len(), 2);
        assert_eq!(record.kind(), EntityKind::Project);
    }

    #[test]
    fn key_is_stable_across_snapshots() {
        let a = ChangeRecord::new(ChangeAction::Create, sample_project());
        let b = ChangeRecord::new(ChangeAction::Update, sample_project());
        assert_eq!(a.key(), b.key());
        assert_ne!(a.record_id(), b.record_id());
    }

    #[test]
    fn keys_differ_across_kinds() {
        let project = ChangeRecord::new(ChangeAction::Create, sample_project());
        let vote = ChangeRecord::new(
            ChangeAction::Create,
            EntityBody::Vote(Vote {
                vote_id: "p-42".into(),
                project_id: "p-42".into(),
                node_id: NodeId::new("node-b"),
                decision: VoteDecision::Pending,
                last_update_time: 0,
            }),
        );
        // Same entity id, different kind: not duplicates.
        assert_ne!(project.key(), vote.key());
    }

    #[test]
    fn action_tokens() {
        assert_eq!(ChangeAction::Create.as_str(), "CREATE");
        assert_eq!(
            serde_json::to_string(&ChangeAction::Remove).unwrap(),
            "\"REMOVE\""
        );
        let action: ChangeAction = serde_json::from_str("\"UPDATE\"").unwrap();
        assert_eq!(action, ChangeAction::Update);
    }
}
