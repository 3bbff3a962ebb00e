//! Fluent builder for engine graph templates
//!
//! Provides a compact API for laying out the fixed node templates each
//! compile mode starts from.

use serde_json::Value;

use crate::error::Result;
use crate::types::{Graph, Input, Node, NodeId};
use crate::validation::validate_graph;

/// Fluent builder for constructing engine graphs
///
/// # Example
///
/// ```
/// use graph_compiler::GraphBuilder;
///
/// let graph = GraphBuilder::new()
///     .add_node("4", "CheckpointLoaderSimple")
///     .with_literal("ckpt_name", "model.safetensors")
///     .add_node("6", "CLIPTextEncode")
///     .with_literal("text", "a cat")
///     .with_ref("clip", "4", 1)
///     .build_validated()
///     .unwrap();
///
/// assert_eq!(graph.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(mut self, id: impl Into<NodeId>, operation: impl Into<String>) -> Self {
        self.nodes.push(Node::new(id, operation));
        self
    }

    /// Set a literal input on the most recently added node
    ///
    /// Must be called after `add_node`.
    pub fn with_literal(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_input(name, Input::literal(value))
    }

    /// Point an input of the most recently added node at another node's output
    pub fn with_ref(self, name: impl Into<String>, node: impl Into<NodeId>, slot: u32) -> Self {
        self.with_input(name, Input::link(node, slot))
    }

    /// Set an input of the most recently added node
    pub fn with_input(mut self, name: impl Into<String>, input: Input) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.inputs.insert(name.into(), input);
        }
        self
    }

    /// Add a node only when `condition` holds
    ///
    /// Used for optional template nodes; the inputs are applied through the
    /// closure so the whole node disappears when skipped.
    pub fn add_node_if(
        self,
        condition: bool,
        build: impl FnOnce(Self) -> Self,
    ) -> Self {
        if condition {
            build(self)
        } else {
            self
        }
    }

    /// Build the graph without validation
    ///
    /// Later nodes with a repeated id replace earlier ones.
    pub fn build(self) -> Graph {
        let mut graph = Graph::new();
        for node in self.nodes {
            if let Some(previous) = graph.replace(node) {
                log::warn!("GraphBuilder: replacing duplicate node '{}'", previous.id);
            }
        }
        graph
    }

    /// Build the graph, rejecting duplicate ids and structural errors
    pub fn build_validated(self) -> Result<Graph> {
        let mut graph = Graph::new();
        for node in self.nodes {
            graph.insert(node)?;
        }
        match validate_graph(&graph).into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(graph),
        }
    }
}
