//! Direct (peer-to-peer) transport.
//!
//! Serializes a change record into a [`ChangeEnvelope`] and POSTs it to the
//! destination's ingestion endpoint. The HTTP client itself is abstracted
//! behind [`IngestClient`] so deployments can plug in whatever stack they
//! already run, and tests can loop back to an in-process endpoint.

use crate::config::DIRECT_SEND_TIMEOUT;
use crate::error::{ReplError, ReplResult};
use crate::transport::RecordTransport;
use metasync_protocol::{ChangeEnvelope, ChangeRecord, NodeId, ReplyEnvelope};
use std::time::Duration;

/// HTTP client abstraction for the ingestion endpoint.
///
/// Implementations POST `body` to `dest`'s fixed ingestion path
/// ([`metasync_protocol::INGEST_PATH`]) with the origin node id in the
/// [`metasync_protocol::ORIGIN_NODE_HEADER`] header, honoring `timeout`,
/// and return the raw response body.
pub trait IngestClient: Send + Sync {
    /// Sends one request, bounded by `timeout`.
    fn post(
        &self,
        dest: &NodeId,
        origin: &NodeId,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, String>;
}

/// Request/response transport calling peers' ingestion endpoints directly.
pub struct DirectTransport<C: IngestClient> {
    client: C,
    origin: NodeId,
    timeout: Duration,
}

impl<C: IngestClient> DirectTransport<C> {
    /// Creates a direct transport identifying itself as `origin`.
    pub fn new(client: C, origin: NodeId) -> Self {
        Self {
            client,
            origin,
            timeout: DIRECT_SEND_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<C: IngestClient> RecordTransport for DirectTransport<C> {
    fn send(&self, dest: &NodeId, record: &ChangeRecord) -> ReplResult<()> {
        let envelope = ChangeEnvelope::from_record(record)?;
        let body = envelope.to_bytes()?;

        let reply_body = self
            .client
            .post(dest, &self.origin, body, self.timeout)
            .map_err(ReplError::transport_retryable)?;

        let reply = ReplyEnvelope::from_bytes(&reply_body)?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(ReplError::Rejected {
                code: reply.status.code,
                msg: reply.status.msg,
            })
        }
    }
}

/// An in-process ingestion endpoint a loopback client can call.
///
/// The server crate's request handler implements this; tests wire a
/// [`LoopbackClient`] straight to it, skipping the network.
pub trait IngestEndpoint: Send + Sync {
    /// Handles one POSTed envelope body, returning the reply body.
    fn handle(&self, origin: &NodeId, body: &[u8]) -> Vec<u8>;
}

/// An [`IngestClient`] that routes requests to a local endpoint.
pub struct LoopbackClient<E: IngestEndpoint> {
    endpoint: E,
}

impl<E: IngestEndpoint> LoopbackClient<E> {
    /// Creates a loopback client over the given endpoint.
    pub fn new(endpoint: E) -> Self {
        Self { endpoint }
    }
}

impl<E: IngestEndpoint> IngestClient for LoopbackClient<E> {
    fn post(
        &self,
        _dest: &NodeId,
        origin: &NodeId,
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<Vec<u8>, String> {
        Ok(self.endpoint.handle(origin, &body))
    }
}
