//! The hub's push-stream session manager.
//!
//! One long-lived outbound session per connected spoke. The HTTP layer calls
//! [`PushHub::connect`] when a spoke opens the stream (handing over the
//! spoke's manifest) and writes the returned receiver's frames out as the
//! event stream. The delivery engine pushes change frames through the
//! [`FrameSink`] impl; a periodic heartbeat ping detects half-open sessions
//! and tears down their bookkeeping.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use metasync_engine::{FrameSink, ReplError, ReplResult};
use metasync_protocol::{NodeId, StreamFrame, SyncMark};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

struct SpokeSession {
    tx: mpsc::Sender<StreamFrame>,
    manifest: Vec<SyncMark>,
}

/// Session registry for the hub side of a hub/spoke deployment.
pub struct PushHub {
    config: ServerConfig,
    sessions: RwLock<HashMap<NodeId, SpokeSession>>,
}

impl PushHub {
    /// Creates an empty hub.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a push session for a spoke, replacing any prior one.
    ///
    /// `manifest` is the spoke's last-known-synced state per entity type,
    /// kept for whatever backfill machinery the embedder runs. The returned
    /// receiver yields the frames to write out on the event stream.
    pub fn connect(&self, node: &NodeId, manifest: Vec<SyncMark>) -> mpsc::Receiver<StreamFrame> {
        let (tx, rx) = mpsc::channel(self.config.session_capacity);
        let prior = self
            .sessions
            .write()
            .insert(node.clone(), SpokeSession { tx, manifest });
        if prior.is_some() {
            info!(node = %node, "push session replaced");
        } else {
            info!(node = %node, "push session opened");
        }
        rx
    }

    /// Tears down a spoke's session. Returns true if one existed.
    pub fn disconnect(&self, node: &NodeId) -> bool {
        let removed = self.sessions.write().remove(node).is_some();
        if removed {
            info!(node = %node, "push session closed");
        }
        removed
    }

    /// Spokes with an open session.
    pub fn connected(&self) -> Vec<NodeId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Returns true if the spoke has an open session.
    pub fn is_connected(&self, node: &NodeId) -> bool {
        self.sessions.read().contains_key(node)
    }

    /// The manifest the spoke presented when it connected.
    pub fn manifest_for(&self, node: &NodeId) -> Option<Vec<SyncMark>> {
        self.sessions.read().get(node).map(|s| s.manifest.clone())
    }

    /// Writes one frame into a spoke's session.
    ///
    /// A closed receiver means the spoke went away: the session is removed
    /// here so later pushes fail fast with [`ServerError::NoSession`].
    pub fn push(&self, node: &NodeId, frame: StreamFrame) -> ServerResult<()> {
        let tx = self.sessions.read().get(node).map(|s| s.tx.clone());
        let Some(tx) = tx else {
            return Err(ServerError::NoSession(node.clone()));
        };
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(node = %node, "push session full, spoke not keeping up");
                Err(ServerError::SessionFull(node.clone()))
            }
            Err(TrySendError::Closed(_)) => {
                self.sessions.write().remove(node);
                warn!(node = %node, "push session dead, removed");
                Err(ServerError::SessionClosed(node.clone()))
            }
        }
    }

    /// Pings every session, removing the dead ones. Returns how many died.
    pub fn ping_all(&self) -> usize {
        let mut dead = 0;
        for node in self.connected() {
            match self.push(&node, StreamFrame::ping()) {
                Ok(()) => debug!(node = %node, "heartbeat sent"),
                Err(ServerError::SessionClosed(_)) => dead += 1,
                // A full session still has a live reader; leave it alone.
                Err(_) => {}
            }
        }
        dead
    }

    /// Spawns the periodic heartbeat task on the current tokio runtime.
    ///
    /// Abort the returned handle on shutdown.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(hub.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so idle streams get
            // their first ping one full interval after connecting.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let dead = hub.ping_all();
                if dead > 0 {
                    debug!(dead, "heartbeat reaped dead sessions");
                }
            }
        })
    }
}

impl FrameSink for PushHub {
    fn send_frame(&self, dest: &NodeId, frame: StreamFrame) -> ReplResult<()> {
        self.push(dest, frame)
            .map_err(|e| ReplError::transport_retryable(e.to_string()))
    }
}
