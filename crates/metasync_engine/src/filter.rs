//! Topology-specific eligibility filters.

use metasync_protocol::{ChangeAction, ChangeRecord, EntityKind};
use std::collections::HashSet;

/// Decides whether a committed change is replicated at all.
pub trait ReplicationFilter: Send + Sync {
    /// Returns true if the record should be queued for delivery.
    fn eligible(&self, record: &ChangeRecord) -> bool;
}

/// Filter for the hub in a hub/spoke deployment.
///
/// Besides the allow-list, UPDATE records for tasks and jobs are dropped:
/// their running/progress state is cheap for an edge to re-derive and too
/// chatty to stream. CREATE and REMOVE still propagate for both kinds.
pub struct HubFilter {
    allowed: HashSet<EntityKind>,
}

impl HubFilter {
    /// Creates a hub filter over the given allow-list.
    pub fn new(allowed: HashSet<EntityKind>) -> Self {
        Self { allowed }
    }
}

impl ReplicationFilter for HubFilter {
    fn eligible(&self, record: &ChangeRecord) -> bool {
        if !self.allowed.contains(&record.kind()) {
            return false;
        }
        if record.action() == ChangeAction::Update
            && matches!(record.kind(), EntityKind::Task | EntityKind::Job)
        {
            return false;
        }
        true
    }
}

/// Filter for a fully decentralized deployment.
///
/// Allow-list only: with no center to re-derive task/job state from, every
/// action propagates for every allowed kind.
pub struct MeshFilter {
    allowed: HashSet<EntityKind>,
}

impl MeshFilter {
    /// Creates a mesh filter over the given allow-list.
    pub fn new(allowed: HashSet<EntityKind>) -> Self {
        Self { allowed }
    }
}

impl ReplicationFilter for MeshFilter {
    fn eligible(&self, record: &ChangeRecord) -> bool {
        self.allowed.contains(&record.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metasync_protocol::{EntityBody, NodeId, TaskRecord, TaskState};

    fn task_record(action: ChangeAction) -> ChangeRecord {
        ChangeRecord::new(
            action,
            EntityBody::Task(TaskRecord {
                task_id: "t-1".into(),
                job_id: None,
                project_id: "p-1".into(),
                party_nodes: vec![NodeId::new("node-b")],
                state: TaskState::Running,
                result_ref: None,
                last_update_time: 1,
            }),
        )
    }

    fn all_kinds() -> HashSet<EntityKind> {
        EntityKind::ALL.iter().copied().collect()
    }

    #[test]
    fn hub_drops_task_updates_but_not_creates() {
        let filter = HubFilter::new(all_kinds());
        assert!(!filter.eligible(&task_record(ChangeAction::Update)));
        assert!(filter.eligible(&task_record(ChangeAction::Create)));
        assert!(filter.eligible(&task_record(ChangeAction::Remove)));
    }

    #[test]
    fn mesh_keeps_task_updates() {
        let filter = MeshFilter::new(all_kinds());
        assert!(filter.eligible(&task_record(ChangeAction::Update)));
    }

    #[test]
    fn kinds_outside_the_allow_list_are_dropped_by_both() {
        let mut allowed = all_kinds();
        allowed.remove(&EntityKind::Task);

        let hub = HubFilter::new(allowed.clone());
        let mesh = MeshFilter::new(allowed);
        let record = task_record(ChangeAction::Create);

        assert!(!hub.eligible(&record));
        assert!(!mesh.eligible(&record));
    }

    #[test]
    fn empty_allow_list_fails_closed() {
        let hub = HubFilter::new(HashSet::new());
        assert!(!hub.eligible(&task_record(ChangeAction::Create)));
    }
}
