//! Delivery dispatch and the per-destination drain loop.

use crate::buffer::{CommitDisposition, DestinationBuffers};
use crate::retry::RetryPolicy;
use crate::transport::RecordTransport;
use metasync_protocol::{ChangeRecord, NodeId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// Per-destination in-flight markers.
///
/// At most one delivery worker may drain a destination at a time; the marker
/// is the only thing preventing two workers from interleaving sends on the
/// same connection and reordering deliveries.
pub struct InFlightMarkers {
    active: Mutex<HashSet<NodeId>>,
}

impl InFlightMarkers {
    /// Creates an empty marker set.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Atomically claims the marker for `dest`. Returns false if a worker is
    /// already in flight.
    pub fn try_acquire(&self, dest: &NodeId) -> bool {
        self.active.lock().insert(dest.clone())
    }

    /// Releases the marker for `dest`.
    pub fn release(&self, dest: &NodeId) {
        self.active.lock().remove(dest);
    }

    /// Returns true if a worker currently holds the marker for `dest`.
    pub fn is_active(&self, dest: &NodeId) -> bool {
        self.active.lock().contains(dest)
    }
}

impl Default for InFlightMarkers {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedules delivery workers, one at most per destination.
pub struct DeliveryDispatcher {
    buffers: Arc<DestinationBuffers>,
    transport: Arc<dyn RecordTransport>,
    policy: Arc<dyn RetryPolicy>,
    in_flight: Arc<InFlightMarkers>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeliveryDispatcher {
    /// Creates a dispatcher draining `buffers` through `transport`.
    pub fn new(
        buffers: Arc<DestinationBuffers>,
        transport: Arc<dyn RecordTransport>,
        policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        Self {
            buffers,
            transport,
            policy,
            in_flight: Arc::new(InFlightMarkers::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// The in-flight marker set (shared with anything that inspects it).
    pub fn in_flight(&self) -> &Arc<InFlightMarkers> {
        &self.in_flight
    }

    /// Requests a drain of `dest`'s buffer.
    ///
    /// Returns true if a worker was spawned. The request is dropped when the
    /// buffer is empty or a worker is already in flight for `dest`; the
    /// in-flight worker keeps draining records enqueued after it started, so
    /// nothing is lost by dropping the request.
    pub fn schedule(&self, dest: &NodeId) -> bool {
        if self.buffers.pending(dest) == 0 {
            return false;
        }
        if !self.in_flight.try_acquire(dest) {
            debug!(dest = %dest, "delivery already in flight");
            return false;
        }

        let buffers = Arc::clone(&self.buffers);
        let transport = Arc::clone(&self.transport);
        let policy = Arc::clone(&self.policy);
        let in_flight = Arc::clone(&self.in_flight);
        let dest = dest.clone();
        let worker_dest = dest.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("metasync-deliver-{dest}"))
            .spawn(move || {
                drain(&buffers, transport.as_ref(), policy.as_ref(), &worker_dest);
                in_flight.release(&worker_dest);
            });

        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock();
                workers.retain(|worker| !worker.is_finished());
                workers.push(handle);
                true
            }
            Err(e) => {
                self.in_flight.release(&dest);
                error!(dest = %dest, error = %e, "failed to spawn delivery worker");
                false
            }
        }
    }

    /// Joins every worker spawned so far. Call after the buffers have been
    /// shut down so blocked workers can exit.
    pub fn join(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Drains one destination to empty.
///
/// Exits when the buffer reports no pending records at the moment of the
/// check; a push racing past that check re-triggers a fresh worker through
/// its own delivery request.
fn drain(
    buffers: &DestinationBuffers,
    transport: &dyn RecordTransport,
    policy: &dyn RetryPolicy,
    dest: &NodeId,
) {
    while buffers.pending(dest) > 0 {
        let Some(record) = buffers.take(dest) else {
            // Shutdown while waiting.
            return;
        };
        deliver(buffers, transport, policy, dest, record);
    }
}

/// Transmits one record, consulting the retry policy on failure.
fn deliver(
    buffers: &DestinationBuffers,
    transport: &dyn RecordTransport,
    policy: &dyn RetryPolicy,
    dest: &NodeId,
    record: ChangeRecord,
) {
    let first_error = match transport.send(dest, &record) {
        Ok(()) => {
            buffers.commit(dest, record, CommitDisposition::Delivered);
            return;
        }
        Err(e) => e,
    };
    warn!(
        dest = %dest,
        record = %record.key(),
        record_id = %record.record_id(),
        error = %first_error,
        "delivery failed"
    );

    let budget = policy.retry(dest, &record, &first_error);
    if budget >= 0 {
        // The failed attempt above already counts against the budget.
        let mut attempts = 1;
        while attempts < budget {
            buffers.record_retry();
            match transport.send(dest, &record) {
                Ok(()) => {
                    buffers.commit(dest, record, CommitDisposition::Delivered);
                    return;
                }
                Err(e) => {
                    attempts += 1;
                    warn!(
                        dest = %dest,
                        record = %record.key(),
                        attempt = attempts,
                        error = %e,
                        "retransmission failed"
                    );
                }
            }
        }
    }

    error!(
        dest = %dest,
        record = %record.key(),
        record_id = %record.record_id(),
        "abandoning record after failed delivery"
    );
    buffers.commit(dest, record, CommitDisposition::Abandoned);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{BoundedRetry, FailFast};
    use crate::transport::MockTransport;
    use metasync_protocol::{ChangeAction, EntityBody, Route};
    use std::time::Duration;

    fn route_record(route_id: &str) -> ChangeRecord {
        ChangeRecord::new(
            ChangeAction::Create,
            EntityBody::Route(Route {
                route_id: route_id.into(),
                project_id: None,
                node_id: NodeId::new("node-b"),
                endpoint: "10.0.0.2:50050".into(),
                last_update_time: 1,
            }),
        )
    }

    fn dispatcher_with(
        transport: Arc<MockTransport>,
        policy: Arc<dyn RetryPolicy>,
    ) -> (Arc<DestinationBuffers>, DeliveryDispatcher) {
        let buffers = Arc::new(DestinationBuffers::new());
        let dispatcher = DeliveryDispatcher::new(Arc::clone(&buffers), transport, policy);
        (buffers, dispatcher)
    }

    #[test]
    fn drains_in_fifo_order() {
        let transport = Arc::new(MockTransport::new());
        let (buffers, dispatcher) =
            dispatcher_with(Arc::clone(&transport), Arc::new(BoundedRetry::default()));
        let dest = NodeId::new("node-b");

        for id in ["r-1", "r-2", "r-3"] {
            buffers.push(&dest, route_record(id));
        }
        assert!(dispatcher.schedule(&dest));
        dispatcher.join();

        let ids: Vec<String> = transport
            .sent()
            .iter()
            .map(|(_, r)| r.key().entity_id.clone())
            .collect();
        assert_eq!(ids, vec!["r-1", "r-2", "r-3"]);
        assert_eq!(buffers.pending(&dest), 0);
        assert_eq!(buffers.stats().delivered, 3);
    }

    #[test]
    fn schedule_is_dropped_while_in_flight() {
        let transport = Arc::new(MockTransport::new());
        let (buffers, dispatcher) =
            dispatcher_with(Arc::clone(&transport), Arc::new(BoundedRetry::default()));
        let dest = NodeId::new("node-b");

        buffers.push(&dest, route_record("r-1"));
        assert!(dispatcher.in_flight().try_acquire(&dest));
        // A worker holds the marker: the request must be dropped, not queued.
        assert!(!dispatcher.schedule(&dest));
        dispatcher.in_flight().release(&dest);

        assert!(dispatcher.schedule(&dest));
        dispatcher.join();
        assert_eq!(transport.sent_count(), 1);
    }

    #[test]
    fn empty_buffer_spawns_nothing() {
        let transport = Arc::new(MockTransport::new());
        let (_buffers, dispatcher) =
            dispatcher_with(Arc::clone(&transport), Arc::new(BoundedRetry::default()));

        assert!(!dispatcher.schedule(&NodeId::new("node-b")));
        assert!(!dispatcher.in_flight().is_active(&NodeId::new("node-b")));
    }

    #[test]
    fn concurrent_schedules_yield_one_worker() {
        let transport = Arc::new(MockTransport::new());
        let buffers = Arc::new(DestinationBuffers::new());
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            Arc::clone(&buffers),
            Arc::clone(&transport) as Arc<dyn RecordTransport>,
            Arc::new(BoundedRetry::default()),
        ));
        let dest = NodeId::new("node-b");

        for id in 0..20 {
            buffers.push(&dest, route_record(&format!("r-{id}")));
        }

        let spawned: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let dispatcher = Arc::clone(&dispatcher);
                    let dest = dest.clone();
                    scope.spawn(move || usize::from(dispatcher.schedule(&dest)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        dispatcher.join();
        // However many triggers raced, no record was seen twice.
        assert!(spawned >= 1);
        assert_eq!(transport.sent_count(), 20);
        let mut ids: Vec<String> = transport
            .sent()
            .iter()
            .map(|(_, r)| r.key().entity_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn bounded_retry_attempts_then_abandons() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_always(true);
        let (buffers, dispatcher) =
            dispatcher_with(Arc::clone(&transport), Arc::new(BoundedRetry::new(3)));
        let dest = NodeId::new("node-b");

        buffers.push(&dest, route_record("r-1"));
        dispatcher.schedule(&dest);
        dispatcher.join();

        assert_eq!(transport.attempts(), 3);
        let stats = buffers.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(buffers.pending(&dest), 0);

        // Nothing further happens for the abandoned record.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(transport.attempts(), 3);
    }

    #[test]
    fn fail_fast_abandons_after_one_attempt() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_always(true);
        let (buffers, dispatcher) = dispatcher_with(Arc::clone(&transport), Arc::new(FailFast));
        let dest = NodeId::new("node-b");

        buffers.push(&dest, route_record("r-1"));
        dispatcher.schedule(&dest);
        dispatcher.join();

        assert_eq!(transport.attempts(), 1);
        assert_eq!(buffers.stats().abandoned, 1);
    }

    #[test]
    fn retry_succeeding_mid_budget_delivers() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next(1);
        let (buffers, dispatcher) =
            dispatcher_with(Arc::clone(&transport), Arc::new(BoundedRetry::new(3)));
        let dest = NodeId::new("node-b");

        buffers.push(&dest, route_record("r-1"));
        dispatcher.schedule(&dest);
        dispatcher.join();

        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(buffers.stats().delivered, 1);
        assert_eq!(buffers.stats().abandoned, 0);
    }

    #[test]
    fn worker_drains_records_pushed_after_start() {
        // Slow the first delivery down so the push below lands while the
        // worker is still in flight.
        struct SlowTransport(Arc<MockTransport>);
        impl RecordTransport for SlowTransport {
            fn send(&self, dest: &NodeId, record: &ChangeRecord) -> crate::ReplResult<()> {
                std::thread::sleep(Duration::from_millis(30));
                self.0.send(dest, record)
            }
        }

        let inner = Arc::new(MockTransport::new());
        let buffers = Arc::new(DestinationBuffers::new());
        let dispatcher = DeliveryDispatcher::new(
            Arc::clone(&buffers),
            Arc::new(SlowTransport(Arc::clone(&inner))),
            Arc::new(BoundedRetry::default()),
        );
        let dest = NodeId::new("node-b");

        buffers.push(&dest, route_record("r-1"));
        dispatcher.schedule(&dest);
        buffers.push(&dest, route_record("r-2"));
        dispatcher.join();

        assert_eq!(inner.sent_count(), 2);
    }
}
