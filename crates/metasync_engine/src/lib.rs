//! # MetaSync Engine
//!
//! Change capture, buffering, and delivery engine for MetaSync replication.
//!
//! This crate provides:
//! - Post-commit change capture with loop prevention
//! - Topology-specific eligibility filters (hub/spoke and mesh)
//! - Per-destination deduplicating FIFO buffers
//! - Edge-triggered peer liveness tracking
//! - Single-flight delivery workers with pluggable retry policies
//! - Both transports: direct peer calls and the push stream's two halves
//! - The replicated-change applier used by ingestion endpoints
//!
//! ## Architecture
//!
//! Committed mutations flow capture → filter → per-destination buffer.
//! Delivery is edge-triggered: the first liveness signal for an absent peer
//! (or an explicit delivery request) schedules at most one worker per
//! destination, which drains that destination's buffer in FIFO order through
//! the configured transport. Failed deliveries consult the retry policy and
//! are eventually committed as abandoned; replication never reports back to
//! the transaction that produced the change.
//!
//! ## Key invariants
//!
//! - A duplicate of an already-queued record is absorbed, not re-queued
//! - At most one delivery worker is in flight per destination
//! - Liveness re-announcements never re-trigger delivery
//! - Applying a replicated change never re-enters capture
//! - Convergence is eventual; there is no exactly-once or cross-node
//!   transactional guarantee

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect() outside tests.
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod apply;
mod buffer;
mod capture;
mod config;
mod direct;
mod error;
mod filter;
mod liveness;
mod retry;
mod service;
mod stream;
mod transport;
mod worker;

pub use apply::{ChangeApplier, EntityStore, MemoryStore, TaskCompletionHook};
pub use buffer::{BufferStats, CommitDisposition, DestinationBuffers};
pub use capture::{ChangeCapture, ChangeOrigin};
pub use config::{ReplicationConfig, RetryStrategy, Topology, DIRECT_SEND_TIMEOUT};
pub use direct::{DirectTransport, IngestClient, IngestEndpoint, LoopbackClient};
pub use error::{ReplError, ReplResult};
pub use filter::{HubFilter, MeshFilter, ReplicationFilter};
pub use liveness::LivenessTracker;
pub use retry::{BoundedRetry, FailFast, RetryPolicy};
pub use service::ReplicationService;
pub use stream::{
    FrameSink, FrameStream, ListenerState, ManifestProvider, StreamListener, StreamSource,
    StreamTransport,
};
pub use transport::{MockTransport, RecordTransport};
pub use worker::{DeliveryDispatcher, InFlightMarkers};
