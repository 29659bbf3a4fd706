//! # MetaSync Protocol
//!
//! Wire types and change-record model for MetaSync replication.
//!
//! This crate provides:
//! - The closed catalogue of replicable entity types ([`EntityKind`],
//!   [`EntityBody`])
//! - [`ChangeRecord`], the unit of replication
//! - JSON wire envelopes for both transports ([`ChangeEnvelope`],
//!   [`ReplyEnvelope`], [`StreamFrame`], [`SyncMark`])
//!
//! This is a pure protocol crate with no I/O operations. Entity decoding is
//! dispatched through the closed [`EntityKind`] enum; unknown wire names fail
//! closed rather than guessing.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod envelope;
mod error;
mod node;
mod record;

pub use entity::{
    EntityBody, EntityKind, JobRecord, JobState, Project, Route, TaskRecord, TaskState, TeeData,
    Vote, VoteDecision,
};
pub use envelope::{
    ChangeEnvelope, ReplyEnvelope, ReplyStatus, StreamFrame, SyncMark, HEARTBEAT_FRAME_ID,
    INGEST_PATH, ORIGIN_NODE_HEADER,
};
pub use error::{WireError, WireResult};
pub use node::NodeId;
pub use record::{ChangeAction, ChangeRecord, RecordKey};
