//! Edge types for flow graphs.
//!
//! Edges connect nodes directionally. A branching node (condition,
//! time_window, randomizer, sentiment) labels its outgoing edges with a
//! handle so the engine can pick the path matching the branch outcome;
//! unlabeled edges are unconditional.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Branch label selecting among multiple outgoing paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchHandle {
    True,
    False,
}

impl From<bool> for BranchHandle {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl fmt::Display for BranchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
        }
    }
}

/// A directed edge between two nodes in a flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier (authored by the graph editor).
    pub id: String,
    /// The source node id.
    pub source: NodeId,
    /// The target node id.
    pub target: NodeId,
    /// Branch label; `None` marks an unconditional edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<BranchHandle>,
}

impl Edge {
    /// Creates an unconditional edge.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    /// Creates a branch-labeled edge.
    #[must_use]
    pub fn branch(
        id: impl Into<String>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        handle: BranchHandle,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: Some(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_handle_from_bool() {
        assert_eq!(BranchHandle::from(true), BranchHandle::True);
        assert_eq!(BranchHandle::from(false), BranchHandle::False);
    }

    #[test]
    fn branch_handle_serializes_lowercase() {
        let json = serde_json::to_string(&BranchHandle::True).expect("serialize");
        assert_eq!(json, "\"true\"");
    }

    #[test]
    fn unconditional_edge_omits_handle() {
        let edge = Edge::new("e1", "a", "b");
        let json = serde_json::to_value(&edge).expect("serialize");
        assert!(json.get("source_handle").is_none());
    }

    #[test]
    fn edge_serde_roundtrip() {
        let edge = Edge::branch("e2", "cond", "yes", BranchHandle::True);
        let json = serde_json::to_string(&edge).expect("serialize");
        let parsed: Edge = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(edge, parsed);
    }
}
