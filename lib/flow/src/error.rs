//! Error types for the flow crate.
//!
//! - `GraphError`: low-level graph operations (nodes, edges, validation)
//! - `FlowError`: flow-level operations (lookup, activation quota)

use crate::node::NodeId;
use chatflow_core::{AccountId, FlowId};
use std::fmt;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// A node with this ID already exists in the graph.
    DuplicateNode { node_id: NodeId },
    /// The graph has no trigger node to serve as an entry point.
    MissingTrigger,
    /// Graph contains cycles.
    CycleDetected,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => {
                write!(f, "node not found: {node_id}")
            }
            Self::DuplicateNode { node_id } => {
                write!(f, "duplicate node id: {node_id}")
            }
            Self::MissingTrigger => write!(f, "graph has no trigger node"),
            Self::CycleDetected => write!(f, "graph contains cycles"),
        }
    }
}

impl std::error::Error for GraphError {}

/// High-level flow errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Flow not found.
    NotFound { flow_id: FlowId },
    /// Activating the flow would exceed the account's active-flow quota.
    QuotaExceeded { account_id: AccountId, limit: u32 },
    /// The flow graph failed validation.
    InvalidGraph(GraphError),
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { flow_id } => {
                write!(f, "flow not found: {flow_id}")
            }
            Self::QuotaExceeded { account_id, limit } => {
                write!(
                    f,
                    "active-flow quota of {limit} exceeded for account {account_id}"
                )
            }
            Self::InvalidGraph(e) => write!(f, "invalid flow graph: {e}"),
        }
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidGraph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for FlowError {
    fn from(e: GraphError) -> Self {
        Self::InvalidGraph(e)
    }
}
