//! The closed catalogue of replicable control-plane entities.
//!
//! Replication moves full entity snapshots between nodes. The set of
//! replicable types is a closed enum ([`EntityKind`]) with one explicit
//! decode arm per type ([`EntityBody::decode`]); an entity type name arriving
//! on the wire that is not in the catalogue is rejected, never guessed.

use crate::error::{WireError, WireResult};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The logical type of a replicated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A collaborative project shared between parties.
    Project,
    /// A network route to a participating node.
    Route,
    /// An approval vote on a project.
    Vote,
    /// A TEE data-management record.
    TeeData,
    /// A computation task.
    Task,
    /// A computation job (a group of tasks).
    Job,
}

impl EntityKind {
    /// Every kind this build knows about.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Project,
        EntityKind::Route,
        EntityKind::Vote,
        EntityKind::TeeData,
        EntityKind::Task,
        EntityKind::Job,
    ];

    /// Stable wire token for this kind (the envelope `tableName`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Route => "route",
            EntityKind::Vote => "vote",
            EntityKind::TeeData => "tee_data",
            EntityKind::Task => "task",
            EntityKind::Job => "job",
        }
    }

    /// Parses a wire token. Unknown tokens return `None` (fail closed).
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "project" => Some(EntityKind::Project),
            "route" => Some(EntityKind::Route),
            "vote" => Some(EntityKind::Vote),
            "tee_data" => Some(EntityKind::TeeData),
            "task" => Some(EntityKind::Task),
            "job" => Some(EntityKind::Job),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted, not yet scheduled.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl TaskState {
    /// Returns true if no further state transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted, not yet running.
    Pending,
    /// At least one task is executing.
    Running,
    /// All tasks finished successfully.
    Succeeded,
    /// At least one task failed.
    Failed,
}

impl JobState {
    /// Returns true if no further state transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// A party's decision on a project approval vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteDecision {
    /// Not yet decided.
    Pending,
    /// The party approved.
    Approve,
    /// The party rejected.
    Reject,
}

/// A collaborative project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project id.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
    /// Node that created the project.
    pub owner_node: NodeId,
    /// Nodes invited to participate.
    #[serde(default)]
    pub member_nodes: Vec<NodeId>,
    /// Unix millis of the last mutation.
    pub last_update_time: u64,
}

/// A network route to a participating node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Unique route id.
    pub route_id: String,
    /// Project the route belongs to, if scoped.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Node the route points at.
    pub node_id: NodeId,
    /// Reachable endpoint, `host:port`.
    pub endpoint: String,
    /// Unix millis of the last mutation.
    pub last_update_time: u64,
}

/// An approval vote cast by a party on a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Unique vote id.
    pub vote_id: String,
    /// Project being voted on.
    pub project_id: String,
    /// Voting node.
    pub node_id: NodeId,
    /// The decision.
    pub decision: VoteDecision,
    /// Unix millis of the last mutation.
    pub last_update_time: u64,
}

/// A TEE data-management record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeeData {
    /// Unique record id.
    pub data_id: String,
    /// Project the data is registered under.
    pub project_id: String,
    /// Node providing the enclave-managed data.
    pub provider_node: NodeId,
    /// Reference to the managed dataset.
    pub dataset_ref: String,
    /// Unix millis of the last mutation.
    pub last_update_time: u64,
}

/// A computation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unique task id.
    pub task_id: String,
    /// Owning job, if any.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Project the task runs under.
    pub project_id: String,
    /// Nodes participating in the task.
    #[serde(default)]
    pub party_nodes: Vec<NodeId>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Reference to the materialized result, once available.
    #[serde(default)]
    pub result_ref: Option<String>,
    /// Unix millis of the last mutation.
    pub last_update_time: u64,
}

/// A computation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique job id.
    pub job_id: String,
    /// Project the job runs under.
    pub project_id: String,
    /// Nodes participating in the job.
    #[serde(default)]
    pub party_nodes: Vec<NodeId>,
    /// Current lifecycle state.
    pub state: JobState,
    /// Unix millis of the last mutation.
    pub last_update_time: u64,
}

/// A full entity snapshot, tagged by kind.
///
/// This is the owned-by-value payload carried in a change record: it is
/// copied out of whatever storage-managed instance produced it and outlives
/// the originating transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityBody {
    /// Project snapshot.
    Project(Project),
    /// Route snapshot.
    Route(Route),
    /// Vote snapshot.
    Vote(Vote),
    /// TEE data record snapshot.
    TeeData(TeeData),
    /// Task snapshot.
    Task(TaskRecord),
    /// Job snapshot.
    Job(JobRecord),
}

impl EntityBody {
    /// The kind tag of this snapshot.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityBody::Project(_) => EntityKind::Project,
            EntityBody::Route(_) => EntityKind::Route,
            EntityBody::Vote(_) => EntityKind::Vote,
            EntityBody::TeeData(_) => EntityKind::TeeData,
            EntityBody::Task(_) => EntityKind::Task,
            EntityBody::Job(_) => EntityKind::Job,
        }
    }

    /// The entity's primary key.
    ///
    /// Stable across repeated snapshots of the same logical entity; together
    /// with [`Self::kind`] it forms the dedup identity of a change record.
    pub fn identity(&self) -> &str {
        match self {
            EntityBody::Project(p) => &p.project_id,
            EntityBody::Route(r) => &r.route_id,
            EntityBody::Vote(v) => &v.vote_id,
            EntityBody::TeeData(t) => &t.data_id,
            EntityBody::Task(t) => &t.task_id,
            EntityBody::Job(j) => &j.job_id,
        }
    }

    /// The project this entity belongs to, if scoped to one.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            EntityBody::Project(p) => Some(&p.project_id),
            EntityBody::Route(r) => r.project_id.as_deref(),
            EntityBody::Vote(v) => Some(&v.project_id),
            EntityBody::TeeData(t) => Some(&t.project_id),
            EntityBody::Task(t) => Some(&t.project_id),
            EntityBody::Job(j) => Some(&j.project_id),
        }
    }

    /// Routing hints: the nodes this entity concerns.
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self {
            EntityBody::Project(p) => {
                let mut nodes = p.member_nodes.clone();
                if !nodes.contains(&p.owner_node) {
                    nodes.push(p.owner_node.clone());
                }
                nodes
            }
            EntityBody::Route(r) => vec![r.node_id.clone()],
            EntityBody::Vote(v) => vec![v.node_id.clone()],
            EntityBody::TeeData(t) => vec![t.provider_node.clone()],
            EntityBody::Task(t) => t.party_nodes.clone(),
            EntityBody::Job(j) => j.party_nodes.clone(),
        }
    }

    /// Unix millis of the entity's last mutation.
    pub fn last_update_time(&self) -> u64 {
        match self {
            EntityBody::Project(p) => p.last_update_time,
            EntityBody::Route(r) => r.last_update_time,
            EntityBody::Vote(v) => v.last_update_time,
            EntityBody::TeeData(t) => t.last_update_time,
            EntityBody::Task(t) => t.last_update_time,
            EntityBody::Job(j) => j.last_update_time,
        }
    }

    /// Serializes the snapshot to a JSON value for the wire.
    pub fn to_value(&self) -> WireResult<Value> {
        let value = match self {
            EntityBody::Project(p) => serde_json::to_value(p),
            EntityBody::Route(r) => serde_json::to_value(r),
            EntityBody::Vote(v) => serde_json::to_value(v),
            EntityBody::TeeData(t) => serde_json::to_value(t),
            EntityBody::Task(t) => serde_json::to_value(t),
            EntityBody::Job(j) => serde_json::to_value(j),
        };
        value.map_err(WireError::Encode)
    }

    /// Decodes a wire payload against the schema of the given kind.
    ///
    /// One explicit arm per catalogue entry; there is no fallback path.
    pub fn decode(kind: EntityKind, data: &Value) -> WireResult<EntityBody> {
        let decode_err = |source| WireError::Decode {
            kind: kind.as_str(),
            source,
        };
        match kind {
            EntityKind::Project => serde_json::from_value(data.clone())
                .map(EntityBody::Project)
                .map_err(decode_err),
            EntityKind::Route => serde_json::from_value(data.clone())
                .map(EntityBody::Route)
                .map_err(decode_err),
            EntityKind::Vote => serde_json::from_value(data.clone())
                .map(EntityBody::Vote)
                .map_err(decode_err),
            EntityKind::TeeData => serde_json::from_value(data.clone())
                .map(EntityBody::TeeData)
                .map_err(decode_err),
            EntityKind::Task => serde_json::from_value(data.clone())
                .map(EntityBody::Task)
                .map_err(decode_err),
            EntityKind::Job => serde_json::from_value(data.clone())
                .map(EntityBody::Job)
                .map_err(decode_err),
        }
    }
}
