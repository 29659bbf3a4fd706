//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for wire encode/decode operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Error, Debug)]
pub enum WireError {
    /// The wire carried an entity type name this build does not know.
    ///
    /// Unknown names always fail closed; the caller drops the payload.
    #[error("unknown entity type: {0:?}")]
    UnknownEntityKind(String),

    /// A payload failed to decode against its entity schema.
    #[error("failed to decode {kind} payload: {source}")]
    Decode {
        /// Entity type the payload claimed to be.
        kind: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A record or envelope failed to serialize.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A request or response body was not valid JSON for its message type.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_display() {
        let err = WireError::UnknownEntityKind("gadget".into());
        assert!(err.to_string().contains("gadget"));
    }
}
