//! Core types for engine graphs
//!
//! A [`Graph`] is a flat arena of [`Node`]s keyed by string id. Nodes read
//! each other's outputs through [`Input::Ref`] handles rather than owning
//! anything, so a node id is only ever compared by string equality.
//!
//! The wire form is the engine's native prompt format: one JSON object keyed
//! by node id, each value carrying the operation name and its inputs, where a
//! reference is the two-element array `[nodeId, outputSlot]`.

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompileError, Result};

/// Unique identifier for a node within one graph
pub type NodeId = String;

/// A pointer at one output slot of another node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub node: NodeId,
    pub slot: u32,
}

impl NodeRef {
    pub fn new(node: impl Into<NodeId>, slot: u32) -> Self {
        Self {
            node: node.into(),
            slot,
        }
    }
}

/// A node input: either a literal value or a reference to another node's output
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Literal(Value),
    Ref(NodeRef),
}

impl Input {
    /// Create a literal input
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Create a reference to `node`'s output `slot`
    pub fn link(node: impl Into<NodeId>, slot: u32) -> Self {
        Self::Ref(NodeRef::new(node, slot))
    }

    /// The reference, if this input is one
    pub fn reference(&self) -> Option<&NodeRef> {
        match self {
            Self::Ref(r) => Some(r),
            Self::Literal(_) => None,
        }
    }

    /// The literal value, if this input is one
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Ref(_) => None,
        }
    }

    /// Classify a raw wire value. A `[string, unsigned]` pair is a reference.
    pub fn from_wire(value: Value) -> Self {
        if let Value::Array(items) = &value {
            if let [Value::String(node), slot] = items.as_slice() {
                if let Some(slot) = slot.as_u64().and_then(|s| u32::try_from(s).ok()) {
                    return Self::link(node.clone(), slot);
                }
            }
        }
        Self::Literal(value)
    }
}

impl From<NodeRef> for Input {
    fn from(r: NodeRef) -> Self {
        Self::Ref(r)
    }
}

impl Serialize for Input {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Ref(r) => (&r.node, r.slot).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Input {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Input::from_wire)
    }
}

/// One operation instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Id of this node; carried by the enclosing map key on the wire
    #[serde(skip)]
    pub id: NodeId,
    /// Opaque engine capability name
    #[serde(rename = "operation_name", alias = "class_type")]
    pub operation: String,
    /// Named inputs
    #[serde(default)]
    pub inputs: BTreeMap<String, Input>,
}

impl Node {
    /// Create a node with no inputs
    pub fn new(id: impl Into<NodeId>, operation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation: operation.into(),
            inputs: BTreeMap::new(),
        }
    }

    /// Set an input (builder style)
    pub fn with_input(mut self, name: impl Into<String>, input: Input) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    /// Look up an input by name
    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.get(name)
    }

    /// Literal value of an input, if it is a literal
    pub fn literal(&self, name: &str) -> Option<&Value> {
        self.input(name).and_then(Input::as_literal)
    }

    /// Reference held by an input, if it is a reference
    pub fn reference(&self, name: &str) -> Option<&NodeRef> {
        self.input(name).and_then(Input::reference)
    }

    /// All references held by this node, with their input names
    pub fn references(&self) -> impl Iterator<Item = (&str, &NodeRef)> + '_ {
        self.inputs
            .iter()
            .filter_map(|(name, input)| input.reference().map(|r| (name.as_str(), r)))
    }
}

/// Bookkeeping for a modifier chain spliced into a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRecord {
    /// Modifier family (e.g. "lora", "control")
    pub family: String,
    /// Node whose designated input was rewired to the chain's tail
    pub consumer: NodeId,
    /// Injected node ids, in chain order
    pub nodes: Vec<NodeId>,
}

/// A complete engine graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    chains: Vec<ChainRecord>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node under its own id
    pub fn insert(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(CompileError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Insert a node, replacing and returning any node with the same id
    pub fn replace(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id.clone(), node)
    }

    /// Add a node under a freshly allocated id and return that id
    pub fn add(&mut self, operation: impl Into<String>, inputs: BTreeMap<String, Input>) -> NodeId {
        let id = self.next_id();
        self.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                operation: operation.into(),
                inputs,
            },
        );
        id
    }

    /// Next unused id: one past the largest numeric id in the graph
    ///
    /// When the largest id is `u64::MAX`, the smallest unused positive id is
    /// taken instead.
    pub fn next_id(&self) -> NodeId {
        let max = self
            .nodes
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .max();
        match max {
            None => "1".to_string(),
            Some(max) => match max.checked_add(1) {
                Some(next) => next.to_string(),
                None => (1u64..)
                    .map(|n| n.to_string())
                    .find(|id| !self.nodes.contains_key(id))
                    .unwrap_or_default(),
            },
        }
    }

    /// Find a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Find a node by id (mutable)
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Find a node by id, failing with [`CompileError::UnknownNode`]
    pub fn require(&self, id: &str) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| CompileError::UnknownNode(id.to_string()))
    }

    /// Overwrite one input of an existing node, returning the previous value
    pub fn set_input(
        &mut self,
        node_id: &str,
        name: impl Into<String>,
        input: Input,
    ) -> Result<Option<Input>> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CompileError::UnknownNode(node_id.to_string()))?;
        Ok(node.inputs.insert(name.into(), input))
    }

    /// Whether a node with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// Iterate node ids in id order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.nodes.keys()
    }

    /// Ids of all nodes running a given operation
    pub fn nodes_with_operation<'a>(&'a self, operation: &'a str) -> Vec<&'a Node> {
        self.nodes
            .values()
            .filter(|n| n.operation == operation)
            .collect()
    }

    /// Modifier chains spliced into this graph so far
    pub fn chains(&self) -> &[ChainRecord] {
        &self.chains
    }

    pub(crate) fn record_chain(&mut self, record: ChainRecord) {
        self.chains.push(record);
    }

    /// Render the engine wire object
    pub fn to_wire(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse an engine wire object
    pub fn from_wire(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CompileError::invalid("graph", "wire graph must be a JSON object"));
        }
        Ok(Self::deserialize(value)?)
    }
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (id, node) in &self.nodes {
            map.serialize_entry(id, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Graph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<NodeId, Node>::deserialize(deserializer)?;
        let nodes = raw
            .into_iter()
            .map(|(id, mut node)| {
                node.id = id.clone();
                (id, node)
            })
            .collect();
        Ok(Self {
            nodes,
            chains: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_wire_shapes() {
        assert_eq!(Input::from_wire(json!(["4", 1])), Input::link("4", 1));
        assert_eq!(Input::from_wire(json!("euler")), Input::literal("euler"));
        // A pair whose second element is not a slot stays literal
        assert_eq!(Input::from_wire(json!(["a", "b"])), Input::literal(json!(["a", "b"])));

        assert_eq!(serde_json::to_value(Input::link("7", 0)).unwrap(), json!(["7", 0]));
        assert_eq!(serde_json::to_value(Input::literal(7.5)).unwrap(), json!(7.5));
    }

    #[test]
    fn test_graph_wire_format() {
        let mut graph = Graph::new();
        graph
            .insert(Node::new("4", "CheckpointLoaderSimple").with_input("ckpt_name", Input::literal("m.safetensors")))
            .unwrap();
        graph
            .insert(
                Node::new("6", "CLIPTextEncode")
                    .with_input("text", Input::literal("a cat"))
                    .with_input("clip", Input::link("4", 1)),
            )
            .unwrap();

        let wire = graph.to_wire().unwrap();
        assert_eq!(
            wire,
            json!({
                "4": {"operation_name": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "m.safetensors"}},
                "6": {"operation_name": "CLIPTextEncode", "inputs": {"text": "a cat", "clip": ["4", 1]}}
            })
        );

        let parsed = Graph::from_wire(&wire).unwrap();
        assert_eq!(parsed, graph);
        assert_eq!(parsed.node("6").unwrap().id, "6");
    }

    #[test]
    fn test_from_wire_accepts_engine_alias() {
        let wire = json!({"1": {"class_type": "LoadImage", "inputs": {"image": "x.png"}}});
        let graph = Graph::from_wire(&wire).unwrap();
        assert_eq!(graph.node("1").unwrap().operation, "LoadImage");

        assert!(Graph::from_wire(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut graph = Graph::new();
        graph.insert(Node::new("1", "A")).unwrap();
        let err = graph.insert(Node::new("1", "B")).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateNode(id) if id == "1"));
    }

    #[test]
    fn test_next_id_skips_past_largest_numeric() {
        let mut graph = Graph::new();
        assert_eq!(graph.next_id(), "1");
        graph.insert(Node::new("3", "A")).unwrap();
        graph.insert(Node::new("9", "B")).unwrap();
        graph.insert(Node::new("save", "C")).unwrap();
        assert_eq!(graph.next_id(), "10");

        let id = graph.add("D", BTreeMap::new());
        assert_eq!(id, "10");
        assert_eq!(graph.next_id(), "11");
    }

    #[test]
    fn test_next_id_after_largest_possible_id() {
        let mut graph = Graph::new();
        graph.insert(Node::new(u64::MAX.to_string(), "A")).unwrap();
        graph.insert(Node::new("1", "B")).unwrap();
        assert_eq!(graph.next_id(), "2");

        let id = graph.add("C", BTreeMap::new());
        assert_eq!(id, "2");
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_set_input_unknown_node() {
        let mut graph = Graph::new();
        let err = graph.set_input("42", "x", Input::literal(1)).unwrap_err();
        assert!(matches!(err, CompileError::UnknownNode(_)));
    }
}
