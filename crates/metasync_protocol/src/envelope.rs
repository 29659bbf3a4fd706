//! JSON wire envelopes for both transports.
//!
//! The direct (peer-to-peer) transport POSTs a [`ChangeEnvelope`] to
//! [`INGEST_PATH`] and receives a [`ReplyEnvelope`]; the streamed (hub/spoke)
//! transport wraps the same envelope in a [`StreamFrame`] whose `id` is the
//! entity-kind token, with [`HEARTBEAT_FRAME_ID`] reserved for pings.

use crate::entity::EntityKind;
use crate::error::{WireError, WireResult};
use crate::record::{ChangeAction, ChangeRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed path of the peer-to-peer ingestion endpoint.
pub const INGEST_PATH: &str = "/replica/apply";

/// Request header carrying the origin node id.
pub const ORIGIN_NODE_HEADER: &str = "x-metasync-origin";

/// Frame id reserved for heartbeat pings on the push stream.
pub const HEARTBEAT_FRAME_ID: &str = "ping";

/// A change record serialized for transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEnvelope {
    /// Entity-kind wire token.
    pub table_name: String,
    /// The mutation.
    pub action: ChangeAction,
    /// Entity snapshot, schema determined by `table_name`.
    pub data: Value,
}

impl ChangeEnvelope {
    /// Serializes a change record for the wire.
    pub fn from_record(record: &ChangeRecord) -> WireResult<Self> {
        Ok(Self {
            table_name: record.kind().as_str().to_owned(),
            action: record.action(),
            data: record.body().to_value()?,
        })
    }

    /// Encodes to a JSON byte body.
    pub fn to_bytes(&self) -> WireResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Decodes from a JSON byte body.
    pub fn from_bytes(bytes: &[u8]) -> WireResult<Self> {
        serde_json::from_slice(bytes).map_err(WireError::Malformed)
    }

    /// Resolves the entity kind. Unknown table names fail closed.
    pub fn kind(&self) -> WireResult<EntityKind> {
        EntityKind::parse(&self.table_name)
            .ok_or_else(|| WireError::UnknownEntityKind(self.table_name.clone()))
    }
}

/// Status half of a reply envelope. `code == 0` signals success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyStatus {
    /// 0 on success, non-zero on failure.
    pub code: i32,
    /// Human-readable outcome.
    pub msg: String,
}

/// Generic reply envelope of the ingestion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Outcome.
    pub status: ReplyStatus,
    /// Echo of the accepted envelope; absent on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ReplyEnvelope {
    /// Reply code for a request body that could not be decoded.
    pub const CODE_BAD_REQUEST: i32 = 1;
    /// Reply code for an apply that failed locally.
    pub const CODE_APPLY_FAILED: i32 = 2;

    /// A success reply echoing the accepted envelope.
    pub fn ok(echo: Value) -> Self {
        Self {
            status: ReplyStatus {
                code: 0,
                msg: "ok".into(),
            },
            data: Some(echo),
        }
    }

    /// A failure reply.
    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus {
                code,
                msg: msg.into(),
            },
            data: None,
        }
    }

    /// Returns true if the remote accepted the change.
    pub fn is_ok(&self) -> bool {
        self.status.code == 0
    }

    /// Encodes to a JSON byte body.
    pub fn to_bytes(&self) -> WireResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Decodes from a JSON byte body.
    pub fn from_bytes(bytes: &[u8]) -> WireResult<Self> {
        serde_json::from_slice(bytes).map_err(WireError::Malformed)
    }
}

/// One frame on the hub-to-spoke push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Entity-kind token, or [`HEARTBEAT_FRAME_ID`].
    pub id: String,
    /// Serialized [`ChangeEnvelope`]; empty for pings.
    pub data: String,
}

impl StreamFrame {
    /// A heartbeat frame.
    pub fn ping() -> Self {
        Self {
            id: HEARTBEAT_FRAME_ID.to_owned(),
            data: String::new(),
        }
    }

    /// Frames a change record for the push stream.
    pub fn for_record(record: &ChangeRecord) -> WireResult<Self> {
        let envelope = ChangeEnvelope::from_record(record)?;
        Ok(Self {
            id: record.kind().as_str().to_owned(),
            data: serde_json::to_string(&envelope).map_err(WireError::Encode)?,
        })
    }

    /// Returns true if this is a heartbeat, not data.
    pub fn is_ping(&self) -> bool {
        self.id == HEARTBEAT_FRAME_ID
    }

    /// Parses the carried envelope.
    pub fn envelope(&self) -> WireResult<ChangeEnvelope> {
        serde_json::from_str(&self.data).map_err(WireError::Malformed)
    }
}

/// One entry of the manifest a spoke sends when opening the push stream:
/// its last-known-synced state per entity type, a resume/backfill hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMark {
    /// Entity-kind wire token.
    pub table_name: String,
    /// Unix millis of the newest locally-applied snapshot of that kind.
    pub last_update_time: u64,
}

impl SyncMark {
    /// Creates a manifest entry.
    pub fn new(kind: EntityKind, last_update_time: u64) -> Self {
        Self {
            table_name: kind.as_str().to_owned(),
            last_update_time,
        }
    }
}
