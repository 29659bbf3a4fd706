//! Per-destination replication buffers.
//!
//! One FIFO, deduplicating queue per peer node, created lazily on first
//! enqueue and kept for the life of the process. The registry owns its own
//! synchronization; producers (change capture), the liveness tracker, and
//! delivery workers all share one instance without external locking.

use metasync_protocol::{ChangeRecord, NodeId, RecordKey};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

/// Outcome a delivery worker reports when committing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDisposition {
    /// The destination acknowledged the record.
    Delivered,
    /// The record was given up on after the retry budget ran out.
    Abandoned,
}

/// Snapshot of buffer bookkeeping counters.
#[derive(Debug, Clone, Default)]
pub struct BufferStats {
    /// Records accepted into a queue.
    pub enqueued: u64,
    /// Enqueues suppressed as duplicates of an already-queued record.
    pub deduplicated: u64,
    /// Records committed as delivered.
    pub delivered: u64,
    /// Records committed as abandoned.
    pub abandoned: u64,
    /// Retransmission attempts beyond each record's first.
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    deduplicated: AtomicU64,
    delivered: AtomicU64,
    abandoned: AtomicU64,
    retries: AtomicU64,
}

/// One destination's queue. The key set mirrors the queue contents so that
/// duplicate detection stays O(1).
#[derive(Default)]
struct DestQueue {
    records: VecDeque<ChangeRecord>,
    keys: HashSet<RecordKey>,
}

impl DestQueue {
    /// Enqueues unless a record with the same key is already waiting.
    fn push(&mut self, record: ChangeRecord) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push_back(record);
        true
    }

    fn pop(&mut self) -> Option<ChangeRecord> {
        let record = self.records.pop_front()?;
        self.keys.remove(&record.key());
        Some(record)
    }
}

/// Registry of per-destination buffers.
pub struct DestinationBuffers {
    queues: Mutex<HashMap<NodeId, DestQueue>>,
    available: Condvar,
    shutdown: AtomicBool,
    keep_abandoned: bool,
    abandoned: Mutex<Vec<(NodeId, ChangeRecord)>>,
    counters: Counters,
}

impl DestinationBuffers {
    /// Creates a registry that drops abandoned records after logging them.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            keep_abandoned: false,
            abandoned: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    /// Creates a registry that keeps abandoned records on a dead-letter list.
    pub fn with_dead_letter() -> Self {
        Self {
            keep_abandoned: true,
            ..Self::new()
        }
    }

    /// Enqueues a record for a destination.
    ///
    /// A record whose key matches one already queued for that destination is
    /// absorbed without effect; the queue behaves as an ordered set. Repeated
    /// touches of the same row while a peer is away therefore cost one slot,
    /// not a retransmission storm.
    pub fn push(&self, dest: &NodeId, record: ChangeRecord) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(dest.clone()).or_default();
        if queue.push(record) {
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            self.available.notify_all();
        } else {
            trace!(dest = %dest, "duplicate change absorbed");
            self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Dequeues the head record for a destination, blocking until one is
    /// available.
    ///
    /// Returns `None` once the registry has been shut down; this is the
    /// cooperative cancellation point for delivery workers.
    pub fn take(&self, dest: &NodeId) -> Option<ChangeRecord> {
        let mut queues = self.queues.lock();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(queue) = queues.get_mut(dest) {
                if let Some(record) = queue.pop() {
                    return Some(record);
                }
            }
            self.available.wait(&mut queues);
        }
    }

    /// Number of records waiting for a destination. Zero for destinations
    /// that have never been pushed to; never an error.
    pub fn pending(&self, dest: &NodeId) -> usize {
        self.queues
            .lock()
            .get(dest)
            .map(|q| q.records.len())
            .unwrap_or(0)
    }

    /// Acknowledges a record as delivered or abandoned.
    ///
    /// The in-memory registry only does bookkeeping here; a durable
    /// implementation would checkpoint.
    pub fn commit(&self, dest: &NodeId, record: ChangeRecord, disposition: CommitDisposition) {
        match disposition {
            CommitDisposition::Delivered => {
                debug!(dest = %dest, record = %record.key(), "record delivered");
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            CommitDisposition::Abandoned => {
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                if self.keep_abandoned {
                    self.abandoned.lock().push((dest.clone(), record));
                }
            }
        }
    }

    /// Counts one retransmission attempt.
    pub fn record_retry(&self) {
        self.counters.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Unblocks every waiting `take` call. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.queues.lock();
        self.available.notify_all();
    }

    /// Drains the dead-letter list (empty unless enabled).
    pub fn take_abandoned(&self) -> Vec<(NodeId, ChangeRecord)> {
        std::mem::take(&mut *self.abandoned.lock())
    }

    /// Snapshot of the bookkeeping counters.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
        }
    }
}

impl Default for DestinationBuffers {
    fn default() -> Self {
        Self::new()
    }
}
