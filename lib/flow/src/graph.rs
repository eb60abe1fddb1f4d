//! Flow graph implementation using petgraph.
//!
//! Flows are directed graphs where nodes are triggers or actions and edges
//! carry optional branch handles. The graph structure is stored as JSONB in
//! the database for flexible schema evolution.
//!
//! Successor lookup is the engine's Graph Navigator: it resolves the
//! outgoing edges of a node, optionally filtered by branch handle, in
//! deterministic edge-insertion order. When a node has several matching
//! edges the engine takes the first; duplicates are not rejected because
//! user-authored graphs may depend on that ordering.

use crate::edge::{BranchHandle, Edge};
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A flow graph using petgraph's directed graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    /// The underlying directed graph.
    #[serde(with = "graph_serde")]
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    #[serde(skip)]
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl FlowGraph {
    /// Creates a new empty flow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        }
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a node with the same id already exists.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node_index_map.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        Ok(())
    }

    /// Removes a node from the graph.
    ///
    /// Also removes all edges connected to this node. petgraph swaps the
    /// last node into the removed slot, so the index map is rebuilt.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Option<Node> {
        let index = self.node_index_map.remove(node_id)?;
        let removed = self.graph.remove_node(index);
        self.rebuild_index_map();
        removed
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Adds an edge to the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge's source or target node doesn't exist.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        let source_index = self.node_index_map.get(&edge.source).copied().ok_or_else(|| {
            GraphError::NodeNotFound {
                node_id: edge.source.clone(),
            }
        })?;

        let target_index = self.node_index_map.get(&edge.target).copied().ok_or_else(|| {
            GraphError::NodeNotFound {
                node_id: edge.target.clone(),
            }
        })?;

        self.graph.add_edge(source_index, target_index, edge);
        Ok(())
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all edges in the graph.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the flow's entry trigger node, if any.
    #[must_use]
    pub fn trigger_node(&self) -> Option<&Node> {
        self.nodes().find(|node| node.data.is_trigger())
    }

    /// Returns the successors of a node, optionally filtered by branch
    /// handle, in edge-insertion order.
    ///
    /// With `handle = None` every outgoing edge matches; with `Some(h)`
    /// only edges labeled with that handle match. The engine takes the
    /// first entry when it needs a single next hop.
    #[must_use]
    pub fn successors(&self, node_id: &NodeId, handle: Option<BranchHandle>) -> Vec<&Node> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        // edges_directed iterates most-recently-added first; sort by edge
        // index to restore insertion order.
        let mut outgoing: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .collect();
        outgoing.sort_by_key(|edge| edge.id());

        outgoing
            .into_iter()
            .filter(|edge| match handle {
                None => true,
                Some(h) => edge.weight().source_handle == Some(h),
            })
            .filter_map(|edge| self.graph.node_weight(edge.target()))
            .collect()
    }

    /// Validates the flow graph.
    ///
    /// Checks:
    /// - A trigger node exists (the entry point)
    /// - No cycles (cycles among action nodes would re-enqueue forever)
    ///
    /// Edge referential integrity is enforced at `add_edge`; dangling edges
    /// in serialized data are dropped during deserialization.
    ///
    /// # Errors
    ///
    /// Returns an error describing the validation failure.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.trigger_node().is_none() {
            return Err(GraphError::MissingTrigger);
        }

        self.validate_acyclic()
    }

    /// Cycle check alone. Used when saving drafts, which may not have a
    /// trigger yet but must never contain a cycle.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph contains a cycle.
    pub fn validate_acyclic(&self) -> Result<(), GraphError> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(GraphError::CycleDetected);
        }

        Ok(())
    }

    /// Rebuilds the node index map after deserialization.
    pub fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id.clone(), index);
            }
        }
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for FlowGraph {
    fn eq(&self, other: &Self) -> bool {
        let mut our_nodes: Vec<_> = self.nodes().collect();
        let mut their_nodes: Vec<_> = other.nodes().collect();
        our_nodes.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        their_nodes.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let mut our_edges: Vec<_> = self.edges().collect();
        let mut their_edges: Vec<_> = other.edges().collect();
        our_edges.sort_by(|a, b| a.id.cmp(&b.id));
        their_edges.sort_by(|a, b| a.id.cmp(&b.id));

        our_nodes == their_nodes && our_edges == their_edges
    }
}

/// Custom serde for the petgraph DiGraph.
///
/// Serializes to `{"nodes": [...], "edges": [...]}` with full edge records
/// (id, source, target, source_handle), the same shape the graph editor
/// sends. Edges referencing unknown nodes are dropped on deserialize.
mod graph_serde {
    use super::*;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeStruct;

    pub fn serialize<S>(graph: &DiGraph<Node, Edge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<_> = graph.node_weights().cloned().collect();
        let edges: Vec<_> = graph.edge_weights().cloned().collect();

        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DiGraph<Node, Edge>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DiGraph<Node, Edge>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a flow graph with nodes and edges")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut nodes: Option<Vec<Node>> = None;
                let mut edges: Option<Vec<Edge>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "nodes" => nodes = Some(map.next_value()?),
                        "edges" => edges = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let nodes = nodes.unwrap_or_default();
                let edges = edges.unwrap_or_default();

                let mut graph = DiGraph::new();
                let mut id_to_index = HashMap::new();

                for node in nodes {
                    let id = node.id.clone();
                    let index = graph.add_node(node);
                    id_to_index.insert(id, index);
                }

                for edge in edges {
                    let (Some(&source_idx), Some(&target_idx)) =
                        (id_to_index.get(&edge.source), id_to_index.get(&edge.target))
                    else {
                        continue;
                    };
                    graph.add_edge(source_idx, target_idx, edge);
                }

                Ok(graph)
            }
        }

        deserializer.deserialize_struct("Graph", &["nodes", "edges"], GraphVisitor)
    }
}
