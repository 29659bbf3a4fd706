//! Streamed (hub/spoke) transport.
//!
//! The hub holds one long-lived push session per connected spoke and writes
//! framed events into it; [`StreamTransport`] adapts that to the common
//! [`RecordTransport`] contract through a [`FrameSink`]. The spoke side runs
//! a [`StreamListener`]: a supervised reconnect loop that opens the stream
//! with a manifest of its last-known-synced state, applies incoming frames,
//! and ignores heartbeats.

use crate::apply::ChangeApplier;
use crate::error::ReplResult;
use crate::transport::RecordTransport;
use metasync_protocol::{ChangeRecord, NodeId, StreamFrame, SyncMark};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Hub-side sink: writes one frame into a spoke's push session.
pub trait FrameSink: Send + Sync {
    /// Writes `frame` to `dest`'s session; an error means the delivery
    /// failed (dead session, full session, no session).
    fn send_frame(&self, dest: &NodeId, frame: StreamFrame) -> ReplResult<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Arc<S> {
    fn send_frame(&self, dest: &NodeId, frame: StreamFrame) -> ReplResult<()> {
        (**self).send_frame(dest, frame)
    }
}

/// Adapts a [`FrameSink`] to the [`RecordTransport`] contract so the
/// delivery worker can drain buffers onto push streams.
pub struct StreamTransport<S: FrameSink> {
    sink: S,
}

impl<S: FrameSink> StreamTransport<S> {
    /// Creates a stream transport over the given sink.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: FrameSink> RecordTransport for StreamTransport<S> {
    fn send(&self, dest: &NodeId, record: &ChangeRecord) -> ReplResult<()> {
        let frame = StreamFrame::for_record(record)?;
        self.sink.send_frame(dest, frame)
    }
}

/// Spoke-side stream opener.
///
/// `connect` transmits the manifest as the opening request and returns the
/// live frame stream. Implementations should surface read timeouts
/// periodically rather than blocking forever, so the listener can observe
/// its stop flag.
pub trait StreamSource: Send + Sync {
    /// Opens the push stream, sending the manifest first.
    fn connect(&self, manifest: &[SyncMark]) -> ReplResult<Box<dyn FrameStream>>;
}

/// One open push stream.
pub trait FrameStream: Send {
    /// Blocks for the next frame. `Ok(None)` is a clean end of stream.
    fn next_frame(&mut self) -> ReplResult<Option<StreamFrame>>;
}

/// Supplies the manifest sent when (re)opening the stream.
pub trait ManifestProvider: Send + Sync {
    /// Last-known-synced state per entity kind.
    fn manifest(&self) -> Vec<SyncMark>;
}

/// Connection state of the spoke listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not connected and not trying to be.
    Disconnected,
    /// Opening the stream.
    Connecting,
    /// Connected and processing frames.
    Streaming,
    /// The stream broke; the supervisor will reconnect.
    Failed,
}

/// The spoke's reconnecting push-stream listener.
///
/// A supervising thread drives the state machine: Connecting → Streaming,
/// back to Connecting via Failed when the stream breaks (immediately by
/// default, after `reconnect_delay` if configured), and to Disconnected on
/// [`StreamListener::stop`].
pub struct StreamListener {
    source: Arc<dyn StreamSource>,
    applier: Arc<ChangeApplier>,
    manifest: Arc<dyn ManifestProvider>,
    state: Arc<RwLock<ListenerState>>,
    stopped: Arc<AtomicBool>,
    reconnect_delay: Duration,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl StreamListener {
    /// Creates a listener; call [`Self::start`] to begin connecting.
    pub fn new(
        source: Arc<dyn StreamSource>,
        applier: Arc<ChangeApplier>,
        manifest: Arc<dyn ManifestProvider>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            source,
            applier,
            manifest,
            state: Arc::new(RwLock::new(ListenerState::Disconnected)),
            stopped: Arc::new(AtomicBool::new(false)),
            reconnect_delay,
            supervisor: Mutex::new(None),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    /// Spawns the supervising thread. Idempotent while running.
    pub fn start(&self) {
        let mut supervisor = self.supervisor.lock();
        if supervisor.is_some() {
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);

        let source = Arc::clone(&self.source);
        let applier = Arc::clone(&self.applier);
        let manifest = Arc::clone(&self.manifest);
        let state = Arc::clone(&self.state);
        let stopped = Arc::clone(&self.stopped);
        let reconnect_delay = self.reconnect_delay;

        let handle = std::thread::Builder::new()
            .name("metasync-stream-listener".into())
            .spawn(move || {
                supervise(&source, &applier, &manifest, &state, &stopped, reconnect_delay);
            });

        match handle {
            Ok(handle) => *supervisor = Some(handle),
            Err(e) => warn!(error = %e, "failed to spawn stream listener"),
        }
    }

    /// Requests a stop without waiting.
    ///
    /// If the source cannot surface read timeouts, close the underlying
    /// stream after calling this so the blocked read returns.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Stops the supervisor and waits for it to exit.
    pub fn stop(&self) {
        self.request_stop();
        if let Some(handle) = self.supervisor.lock().take() {
            let _ = handle.join();
        }
        *self.state.write() = ListenerState::Disconnected;
    }
}

fn supervise(
    source: &Arc<dyn StreamSource>,
    applier: &Arc<ChangeApplier>,
    manifest: &Arc<dyn ManifestProvider>,
    state: &Arc<RwLock<ListenerState>>,
    stopped: &Arc<AtomicBool>,
    reconnect_delay: Duration,
) {
    while !stopped.load(Ordering::SeqCst) {
        *state.write() = ListenerState::Connecting;
        match source.connect(&manifest.manifest()) {
            Ok(mut stream) => {
                info!("push stream established");
                *state.write() = ListenerState::Streaming;
                let clean = pump(stream.as_mut(), applier, stopped);
                *state.write() = if clean {
                    ListenerState::Disconnected
                } else {
                    ListenerState::Failed
                };
            }
            Err(e) => {
                warn!(error = %e, "push stream connect failed");
                *state.write() = ListenerState::Failed;
            }
        }

        if stopped.load(Ordering::SeqCst) {
            break;
        }
        if !reconnect_delay.is_zero() {
            std::thread::sleep(reconnect_delay);
        }
    }
    *state.write() = ListenerState::Disconnected;
}

/// Processes frames until the stream ends. Returns true on a clean close.
fn pump(stream: &mut dyn FrameStream, applier: &ChangeApplier, stopped: &AtomicBool) -> bool {
    loop {
        if stopped.load(Ordering::SeqCst) {
            return true;
        }
        match stream.next_frame() {
            Ok(Some(frame)) => {
                if frame.is_ping() {
                    trace!("heartbeat");
                    continue;
                }
                if let Err(e) = applier.apply_frame(&frame) {
                    // A frame we cannot decode or apply is dropped; the
                    // stream itself stays up.
                    warn!(frame_id = %frame.id, error = %e, "dropping stream frame");
                }
            }
            Ok(None) => {
                debug!("push stream closed by hub");
                return true;
            }
            Err(e) => {
                warn!(error = %e, "push stream read failed");
                return false;
            }
        }
    }
}
