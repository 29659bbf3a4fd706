//! Error types for the serving side.

use metasync_protocol::NodeId;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving replication traffic.
#[derive(Error, Debug)]
pub enum ServerError {
    /// No push session is open for the spoke.
    #[error("no push session for {0}")]
    NoSession(NodeId),

    /// The spoke's session buffer is full; the spoke is not keeping up.
    #[error("push session for {0} is full")]
    SessionFull(NodeId),

    /// The spoke went away; its session has been torn down.
    #[error("push session for {0} is closed")]
    SessionClosed(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_the_spoke() {
        let err = ServerError::SessionClosed(NodeId::new("edge-3"));
        assert!(err.to_string().contains("edge-3"));
    }
}
