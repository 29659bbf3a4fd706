//! Peer node identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a cluster node that can originate or receive replicated
/// changes.
///
/// Node ids are opaque strings assigned by the control plane (for example
/// `"node-beijing-01"`). They are compared byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_as_str() {
        let node = NodeId::new("node-a");
        assert_eq!(node.as_str(), "node-a");
        assert_eq!(node.to_string(), "node-a");
    }

    #[test]
    fn serde_transparent() {
        let node = NodeId::new("edge-7");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"edge-7\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
