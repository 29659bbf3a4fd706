//! Server configuration.

use std::time::Duration;

/// Configuration for a node's serving side.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval between heartbeat pings on push sessions.
    pub heartbeat_interval: Duration,
    /// Frames buffered per push session before pushes fail.
    pub session_capacity: usize,
    /// Largest accepted ingestion request body.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Creates a configuration with production defaults.
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            session_capacity: 256,
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the per-session frame buffer capacity.
    pub fn with_session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity;
        self
    }

    /// Sets the largest accepted request body.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
