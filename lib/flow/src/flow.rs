//! Flow definition types.
//!
//! A flow is a named automation owned by an account. It consists of:
//! - Metadata (name, description, status, timestamps)
//! - A directed graph of trigger and action nodes
//! - Execution counters

use crate::error::GraphError;
use crate::graph::FlowGraph;
use crate::node::{Node, TriggerData};
use chatflow_core::{AccountId, FlowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a flow.
///
/// Only active flows are considered for trigger matching. Draft and paused
/// flows are invisible to inbound events but keep their graph and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Draft,
    Active,
    Paused,
}

impl FlowStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl std::str::FromStr for FlowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(format!("unknown flow status: {other}")),
        }
    }
}

/// Execution counters for a flow.
///
/// `total_executions` counts trigger matches; the other two count chain
/// outcomes. A chain that is still suspended on a delay has incremented
/// `total_executions` but neither outcome counter yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
}

/// A complete flow definition.
///
/// This is the source of truth for a flow. The graph is stored as a JSONB
/// document; counters live in dedicated columns so they can be bumped
/// atomically without rewriting the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Unique identifier for this flow.
    pub id: FlowId,
    /// The account that owns this flow.
    pub account_id: AccountId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this flow does.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: FlowStatus,
    /// The flow graph (nodes and edges).
    pub graph: FlowGraph,
    /// Execution counters.
    pub stats: FlowStats,
    /// When this flow was created.
    pub created_at: DateTime<Utc>,
    /// When this flow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// Creates a new draft flow with an empty graph.
    #[must_use]
    pub fn new(account_id: AccountId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: FlowId::new(),
            account_id,
            name: name.into(),
            description: None,
            status: FlowStatus::Draft,
            graph: FlowGraph::new(),
            stats: FlowStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the flow graph.
    #[must_use]
    pub fn with_graph(mut self, graph: FlowGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Returns whether the flow participates in trigger matching.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == FlowStatus::Active
    }

    /// Returns the flow's entry trigger node, if any.
    #[must_use]
    pub fn trigger_node(&self) -> Option<&Node> {
        self.graph.trigger_node()
    }

    /// Returns the trigger configuration, if the flow has a trigger node.
    #[must_use]
    pub fn trigger(&self) -> Option<&TriggerData> {
        self.trigger_node().and_then(|node| node.data.as_trigger())
    }

    /// Activates the flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph fails validation; a flow without a
    /// valid graph must not receive events.
    pub fn activate(&mut self) -> Result<(), GraphError> {
        self.graph.validate()?;
        self.status = FlowStatus::Active;
        self.touch();
        Ok(())
    }

    /// Pauses the flow. Already-suspended chains keep running; only new
    /// trigger matches stop.
    pub fn pause(&mut self) {
        self.status = FlowStatus::Paused;
        self.touch();
    }

    /// Validates the flow graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is invalid.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    /// Marks the flow as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::node::{ActionConfig, TriggerType};

    fn flow_with_graph() -> Flow {
        let mut graph = FlowGraph::new();
        graph
            .add_node(Node::trigger("entry", TriggerData::new(TriggerType::InstagramDm)))
            .unwrap();
        graph
            .add_node(Node::action(
                "greet",
                ActionConfig::SendDm {
                    message: "Hello!".to_string(),
                },
            ))
            .unwrap();
        graph.add_edge(Edge::new("e1", "entry", "greet")).unwrap();

        Flow::new(AccountId::new(), "Welcome DM").with_graph(graph)
    }

    #[test]
    fn new_flow_starts_as_draft() {
        let flow = Flow::new(AccountId::new(), "Test Flow");
        assert_eq!(flow.status, FlowStatus::Draft);
        assert!(!flow.is_active());
        assert_eq!(flow.stats, FlowStats::default());
    }

    #[test]
    fn activate_validates_graph() {
        let mut empty = Flow::new(AccountId::new(), "Empty");
        assert_eq!(empty.activate(), Err(GraphError::MissingTrigger));
        assert_eq!(empty.status, FlowStatus::Draft);

        let mut flow = flow_with_graph();
        flow.activate().expect("valid graph activates");
        assert!(flow.is_active());
    }

    #[test]
    fn pause_stops_matching() {
        let mut flow = flow_with_graph();
        flow.activate().unwrap();
        flow.pause();
        assert_eq!(flow.status, FlowStatus::Paused);
        assert!(!flow.is_active());
    }

    #[test]
    fn trigger_accessor() {
        let flow = flow_with_graph();
        let trigger = flow.trigger().expect("trigger present");
        assert_eq!(trigger.trigger_type, TriggerType::InstagramDm);
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [FlowStatus::Draft, FlowStatus::Active, FlowStatus::Paused] {
            let parsed: FlowStatus = status.as_str().parse().expect("parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn flow_serde_roundtrip() {
        let flow = flow_with_graph();
        let json = serde_json::to_string(&flow).expect("serialize");
        let mut parsed: Flow = serde_json::from_str(&json).expect("deserialize");
        parsed.graph.rebuild_index_map();

        assert_eq!(flow.id, parsed.id);
        assert_eq!(flow.name, parsed.name);
        assert_eq!(parsed.graph.node_count(), 2);
    }
}
