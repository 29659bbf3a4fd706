//! Applying incoming replicated changes to local storage.

use crate::capture::{ChangeCapture, ChangeOrigin};
use crate::error::ReplResult;
use crate::stream::ManifestProvider;
use metasync_protocol::{
    ChangeAction, ChangeEnvelope, EntityBody, EntityKind, RecordKey, StreamFrame, SyncMark,
    TaskRecord,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The storage collaborator.
///
/// Implementations persist the snapshot and, strictly after the local
/// commit, notify change capture with the same `origin` they were given.
/// Passing the origin through unchanged is what lets capture tell a
/// replicated apply from a local mutation.
pub trait EntityStore: Send + Sync {
    /// Applies one mutation to local storage.
    fn apply(&self, action: ChangeAction, body: &EntityBody, origin: ChangeOrigin)
        -> ReplResult<()>;
}

/// Side effect hook for task completion.
///
/// Invoked synchronously after a terminal task snapshot is applied, so the
/// receiving node can materialize the task's result.
pub trait TaskCompletionHook: Send + Sync {
    /// Called once per applied terminal task snapshot.
    fn task_finished(&self, task: &TaskRecord);
}

/// Decodes incoming change envelopes and applies them locally.
pub struct ChangeApplier {
    store: Arc<dyn EntityStore>,
    task_hook: Option<Arc<dyn TaskCompletionHook>>,
}

impl ChangeApplier {
    /// Creates an applier over the given store.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            task_hook: None,
        }
    }

    /// Wires the task-completion side effect.
    pub fn with_task_hook(mut self, hook: Arc<dyn TaskCompletionHook>) -> Self {
        self.task_hook = Some(hook);
        self
    }

    /// Applies one incoming envelope.
    ///
    /// Decoding goes through the closed entity catalogue; an unknown table
    /// name or malformed payload is an error for the caller to log and drop,
    /// never a crash. The apply runs under [`ChangeOrigin::Replicated`] so
    /// capture does not re-emit it.
    pub fn apply_envelope(&self, envelope: &ChangeEnvelope) -> ReplResult<()> {
        let kind = envelope.kind()?;
        let body = EntityBody::decode(kind, &envelope.data)?;

        self.store.apply(envelope.action, &body, ChangeOrigin::Replicated)?;
        debug!(kind = %kind, entity = body.identity(), action = %envelope.action, "replicated change applied");

        if let EntityBody::Task(task) = &body {
            if task.state.is_terminal() {
                if let Some(hook) = &self.task_hook {
                    hook.task_finished(task);
                }
            }
        }
        Ok(())
    }

    /// Applies one push-stream frame. Heartbeats are ignored.
    pub fn apply_frame(&self, frame: &StreamFrame) -> ReplResult<()> {
        if frame.is_ping() {
            return Ok(());
        }
        let envelope = frame.envelope()?;
        self.apply_envelope(&envelope)
    }
}

/// An in-memory entity store for tests and single-process deployments.
pub struct MemoryStore {
    entities: RwLock<HashMap<RecordKey, EntityBody>>,
    capture: Mutex<Option<Arc<ChangeCapture>>>,
}

impl MemoryStore {
    /// Creates an empty store with no capture wired.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            capture: Mutex::new(None),
        }
    }

    /// Wires change capture; from now on every apply is reported to it.
    pub fn set_capture(&self, capture: Arc<ChangeCapture>) {
        *self.capture.lock() = Some(capture);
    }

    /// Looks up an entity snapshot.
    pub fn get(&self, key: &RecordKey) -> Option<EntityBody> {
        self.entities.read().get(key).cloned()
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryStore {
    fn apply(
        &self,
        action: ChangeAction,
        body: &EntityBody,
        origin: ChangeOrigin,
    ) -> ReplResult<()> {
        let key = RecordKey {
            kind: body.kind(),
            entity_id: body.identity().to_owned(),
        };
        {
            let mut entities = self.entities.write();
            match action {
                ChangeAction::Create | ChangeAction::Update => {
                    entities.insert(key, body.clone());
                }
                ChangeAction::Remove => {
                    entities.remove(&key);
                }
            }
        }
        // Post-commit notification, origin passed through unchanged.
        if let Some(capture) = self.capture.lock().clone() {
            capture.on_commit(action, body.clone(), origin);
        }
        Ok(())
    }
}

impl ManifestProvider for MemoryStore {
    fn manifest(&self) -> Vec<SyncMark> {
        let entities = self.entities.read();
        EntityKind::ALL
            .iter()
            .map(|kind| {
                let newest = entities
                    .iter()
                    .filter(|(key, _)| key.kind == *kind)
                    .map(|(_, body)| body.last_update_time())
                    .max()
                    .unwrap_or(0);
                SyncMark::new(*kind, newest)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplError;
    use metasync_protocol::{ChangeRecord, NodeId, TaskState, Vote, VoteDecision, WireError};
    use serde_json::json;

    fn vote_body(vote_id: &str, t: u64) -> EntityBody {
        EntityBody::Vote(Vote {
            vote_id: vote_id.into(),
            project_id: "p-1".into(),
            node_id: NodeId::new("node-b"),
            decision: VoteDecision::Approve,
            last_update_time: t,
        })
    }

    fn task_body(state: TaskState) -> EntityBody {
        EntityBody::Task(TaskRecord {
            task_id: "t-1".into(),
            job_id: None,
            project_id: "p-1".into(),
            party_nodes: vec![],
            state,
            result_ref: Some("result://t-1".into()),
            last_update_time: 9,
        })
    }

    fn envelope_for(action: ChangeAction, body: &EntityBody) -> ChangeEnvelope {
        ChangeEnvelope::from_record(&ChangeRecord::new(action, body.clone())).unwrap()
    }

    #[test]
    fn apply_create_update_remove() {
        let store = Arc::new(MemoryStore::new());
        let applier = ChangeApplier::new(Arc::clone(&store) as Arc<dyn EntityStore>);
        let key = RecordKey {
            kind: EntityKind::Vote,
            entity_id: "v-1".into(),
        };

        applier
            .apply_envelope(&envelope_for(ChangeAction::Create, &vote_body("v-1", 1)))
            .unwrap();
        assert!(store.get(&key).is_some());

        applier
            .apply_envelope(&envelope_for(ChangeAction::Update, &vote_body("v-1", 2)))
            .unwrap();
        assert_eq!(store.get(&key).unwrap().last_update_time(), 2);

        applier
            .apply_envelope(&envelope_for(ChangeAction::Remove, &vote_body("v-1", 3)))
            .unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn unknown_table_name_fails_closed() {
        let applier = ChangeApplier::new(Arc::new(MemoryStore::new()));
        let envelope = ChangeEnvelope {
            table_name: "secret_table".into(),
            action: ChangeAction::Create,
            data: json!({}),
        };

        let result = applier.apply_envelope(&envelope);
        assert!(matches!(
            result,
            Err(ReplError::Wire(WireError::UnknownEntityKind(_)))
        ));
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_crash() {
        let applier = ChangeApplier::new(Arc::new(MemoryStore::new()));
        let envelope = ChangeEnvelope {
            table_name: "vote".into(),
            action: ChangeAction::Create,
            data: json!({"voteId": 7}),
        };

        assert!(applier.apply_envelope(&envelope).is_err());
    }

    #[test]
    fn terminal_task_fires_completion_hook() {
        struct Recorder(Mutex<Vec<String>>);
        impl TaskCompletionHook for Recorder {
            fn task_finished(&self, task: &TaskRecord) {
                self.0.lock().push(task.task_id.clone());
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let applier = ChangeApplier::new(Arc::new(MemoryStore::new()))
            .with_task_hook(Arc::clone(&recorder) as Arc<dyn TaskCompletionHook>);

        applier
            .apply_envelope(&envelope_for(
                ChangeAction::Update,
                &task_body(TaskState::Running),
            ))
            .unwrap();
        assert!(recorder.0.lock().is_empty());

        applier
            .apply_envelope(&envelope_for(
                ChangeAction::Update,
                &task_body(TaskState::Succeeded),
            ))
            .unwrap();
        assert_eq!(recorder.0.lock().as_slice(), ["t-1"]);
    }

    #[test]
    fn ping_frames_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let applier = ChangeApplier::new(Arc::clone(&store) as Arc<dyn EntityStore>);

        applier.apply_frame(&StreamFrame::ping()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn manifest_reports_newest_per_kind() {
        let store = MemoryStore::new();
        store
            .apply(ChangeAction::Create, &vote_body("v-1", 5), ChangeOrigin::Local)
            .unwrap();
        store
            .apply(ChangeAction::Create, &vote_body("v-2", 9), ChangeOrigin::Local)
            .unwrap();

        let marks = store.manifest();
        let vote_mark = marks.iter().find(|m| m.table_name == "vote").unwrap();
        assert_eq!(vote_mark.last_update_time, 9);
        let task_mark = marks.iter().find(|m| m.table_name == "task").unwrap();
        assert_eq!(task_mark.last_update_time, 0);
    }
}
