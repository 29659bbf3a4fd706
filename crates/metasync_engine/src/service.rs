//! Top-level wiring of the replication engine.

use crate::apply::ChangeApplier;
use crate::buffer::{BufferStats, DestinationBuffers};
use crate::capture::ChangeCapture;
use crate::config::ReplicationConfig;
use crate::liveness::LivenessTracker;
use crate::stream::{ManifestProvider, StreamListener, StreamSource};
use crate::transport::RecordTransport;
use crate::worker::DeliveryDispatcher;
use metasync_protocol::{ChangeRecord, NodeId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

/// How often the trigger pump re-checks the stop flag while idle.
const PUMP_IDLE_TICK: Duration = Duration::from_millis(100);

/// One node's replication service.
///
/// Owns the per-destination buffers, the liveness tracker, the in-flight
/// markers, and the dispatcher; everything that needs them gets a reference
/// from here rather than reaching for process-wide state. Liveness edges and
/// explicit delivery requests share one trigger channel, pumped by a
/// dedicated thread into the dispatcher.
pub struct ReplicationService {
    config: ReplicationConfig,
    buffers: Arc<DestinationBuffers>,
    liveness: Arc<LivenessTracker>,
    dispatcher: Arc<DeliveryDispatcher>,
    trigger: Sender<NodeId>,
    stopped: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicationService {
    /// Wires a service from its configuration and a transport.
    pub fn new(config: ReplicationConfig, transport: Arc<dyn RecordTransport>) -> Self {
        let buffers = if config.keep_abandoned {
            Arc::new(DestinationBuffers::with_dead_letter())
        } else {
            Arc::new(DestinationBuffers::new())
        };

        let (trigger, requests) = mpsc::channel::<NodeId>();
        let liveness = Arc::new(LivenessTracker::with_trigger(trigger.clone()));
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            Arc::clone(&buffers),
            transport,
            config.policy(),
        ));
        let stopped = Arc::new(AtomicBool::new(false));

        let pump = {
            let dispatcher = Arc::clone(&dispatcher);
            let stopped = Arc::clone(&stopped);
            std::thread::Builder::new()
                .name("metasync-dispatch".into())
                .spawn(move || loop {
                    if stopped.load(Ordering::SeqCst) {
                        return;
                    }
                    match requests.recv_timeout(PUMP_IDLE_TICK) {
                        Ok(dest) => {
                            dispatcher.schedule(&dest);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                })
                .ok()
        };

        Self {
            config,
            buffers,
            liveness,
            dispatcher,
            trigger,
            stopped,
            pump: Mutex::new(pump),
        }
    }

    /// The per-destination buffers.
    pub fn buffers(&self) -> &Arc<DestinationBuffers> {
        &self.buffers
    }

    /// The liveness tracker. Marking a peer reachable through it triggers
    /// delivery for that peer's buffer.
    pub fn liveness(&self) -> &Arc<LivenessTracker> {
        &self.liveness
    }

    /// Builds the capture hook to hand to the storage layer.
    pub fn capture(&self) -> ChangeCapture {
        ChangeCapture::new(
            Arc::clone(&self.buffers),
            self.config.filter(),
            Arc::clone(&self.liveness),
            Some(self.trigger.clone()),
            self.config.node_id.clone(),
            self.config.peers.clone(),
        )
    }

    /// Builds the spoke-side push-stream listener, paced by this service's
    /// reconnect delay.
    pub fn listener(
        &self,
        source: Arc<dyn StreamSource>,
        applier: Arc<ChangeApplier>,
        manifest: Arc<dyn ManifestProvider>,
    ) -> StreamListener {
        StreamListener::new(source, applier, manifest, self.config.reconnect_delay)
    }

    /// Explicitly requests a delivery attempt for one destination,
    /// independent of liveness edges.
    pub fn request_delivery(&self, dest: &NodeId) {
        let _ = self.trigger.send(dest.clone());
    }

    /// Snapshot of buffer bookkeeping.
    pub fn stats(&self) -> BufferStats {
        self.buffers.stats()
    }

    /// Drains the dead-letter list (empty unless configured on).
    pub fn take_abandoned(&self) -> Vec<(NodeId, ChangeRecord)> {
        self.buffers.take_abandoned()
    }

    /// Stops dispatching, unblocks workers, and joins them. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("replication service shutting down");
        self.buffers.shutdown();
        if let Some(handle) = self.pump.lock().take() {
            let _ = handle.join();
        }
        self.dispatcher.join();
    }
}

impl Drop for ReplicationService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
