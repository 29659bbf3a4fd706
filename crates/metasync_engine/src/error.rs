//! Error types for the replication engine.

use metasync_protocol::WireError;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplResult<T> = Result<T, ReplError>;

/// Errors that can occur while replicating changes.
#[derive(Error, Debug)]
pub enum ReplError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the delivery can be retried.
        retryable: bool,
    },

    /// The remote node answered with a non-zero status code.
    #[error("remote rejected change: code {code}: {msg}")]
    Rejected {
        /// Reply status code.
        code: i32,
        /// Reply message.
        msg: String,
    },

    /// A payload failed to encode or decode.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The local storage collaborator failed to apply a change.
    #[error("storage error: {0}")]
    Storage(String),

    /// The replication service is shutting down.
    #[error("replication shut down")]
    Shutdown,
}

impl ReplError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the delivery could succeed.
    ///
    /// A remote rejection counts as retryable here; distinguishing it from a
    /// transient fault is left entirely to the retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplError::Transport { retryable, .. } => *retryable,
            ReplError::Rejected { .. } => true,
            _ => false,
        }
    }
}
