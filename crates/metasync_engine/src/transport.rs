//! Transport contract for delivering change records.

use crate::error::{ReplError, ReplResult};
use metasync_protocol::{ChangeRecord, NodeId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Transmits one change record to one destination.
///
/// The delivery worker owns the drain loop; implementations only move a
/// single record and report success or failure. Implementations must never
/// mutate the record.
pub trait RecordTransport: Send + Sync {
    /// Delivers `record` to `dest`.
    fn send(&self, dest: &NodeId, record: &ChangeRecord) -> ReplResult<()>;
}

/// A scriptable transport for tests: records every attempt and can be told
/// to fail the next N sends or fail forever.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(NodeId, ChangeRecord)>>,
    attempts: AtomicU32,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
}

impl MockTransport {
    /// Creates a transport that succeeds on every send.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `n` sends with a retryable transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fails every send from now on.
    pub fn fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Every successfully delivered `(destination, record)` pair, in call
    /// order.
    pub fn sent(&self) -> Vec<(NodeId, ChangeRecord)> {
        self.sent.lock().clone()
    }

    /// Number of successful deliveries.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Number of send attempts, including failed ones.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl RecordTransport for MockTransport {
    fn send(&self, dest: &NodeId, record: &ChangeRecord) -> ReplResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(ReplError::transport_retryable("mock transport failure"));
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ReplError::transport_retryable("mock transport failure"));
        }
        self.sent.lock().push((dest.clone(), record.clone()));
        Ok(())
    }
}
