//! Flow data model for the chatflow automation platform.
//!
//! A flow is a user-authored directed graph of trigger and action nodes
//! that reacts to inbound social-messaging events. This crate provides:
//!
//! - **Node types**: trigger entry nodes and a sum type over action kinds
//! - **Edges**: directed links with optional branch handles
//! - **Graph**: petgraph-backed storage with handle-aware successor lookup
//! - **Flow**: the persisted document with status and execution counters

pub mod edge;
pub mod error;
pub mod flow;
pub mod graph;
pub mod node;

pub use edge::{BranchHandle, Edge};
pub use error::{FlowError, GraphError};
pub use flow::{Flow, FlowStats, FlowStatus};
pub use graph::FlowGraph;
pub use node::{
    ActionConfig, ConditionOperator, ConditionVariable, DelayUnit, HttpMethod, Node, NodeData,
    NodeId, Position, SentimentClass, TriggerData, TriggerType,
};
