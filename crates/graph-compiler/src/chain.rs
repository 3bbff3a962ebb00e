//! Modifier-chain injection
//!
//! Splices an ordered list of transformation nodes between an anchor and
//! the nodes that used to read the anchor directly. Each link reads the
//! previous link's outputs (the first reads the anchor), and the designated
//! consumer inputs are rewritten to read the last link.
//!
//! ```text
//! before:  anchor ──────────────────────────► consumer
//! after:   anchor ──► link 0 ──► link 1 ──► … ──► consumer
//! ```
//!
//! The same operation serves LoRA stacks (threading `model` and `clip`)
//! and control-condition stacks (threading `positive` and `negative`).

use std::collections::BTreeMap;

use crate::constants::{ops, slots};
use crate::error::{CompileError, Result};
use crate::params::LoraConfig;
use crate::types::{ChainRecord, Graph, Input, NodeId, NodeRef};

/// A value that can become one link of a modifier chain
pub trait ChainElement {
    /// Modifier family; one chain per family may sit in front of a consumer
    fn family(&self) -> &'static str;

    /// Engine operation of the emitted node
    fn operation(&self) -> &str;

    /// Inputs threaded from link to link, paired with the output slot on
    /// which every link (and the anchor) exposes that value
    fn threaded(&self) -> &'static [(&'static str, u32)];

    /// Element-specific inputs: settings and side references
    fn settings(&self) -> BTreeMap<String, Input>;
}

/// Where the first link reads its threaded inputs from
#[derive(Debug, Clone, PartialEq)]
pub enum ChainAnchor {
    /// A single node exposing every threaded value on the matching slot
    Node(NodeId),
    /// Explicit upstream reference per threaded input
    Refs(BTreeMap<String, NodeRef>),
}

impl ChainAnchor {
    pub fn node(id: impl Into<NodeId>) -> Self {
        Self::Node(id.into())
    }

    pub fn refs<I, K>(refs: I) -> Self
    where
        I: IntoIterator<Item = (K, NodeRef)>,
        K: Into<String>,
    {
        Self::Refs(refs.into_iter().map(|(k, r)| (k.into(), r)).collect())
    }

    fn resolve(&self, input: &str, slot: u32) -> Result<NodeRef> {
        match self {
            Self::Node(id) => Ok(NodeRef::new(id.clone(), slot)),
            Self::Refs(refs) => refs.get(input).cloned().ok_or_else(|| {
                CompileError::invalid("anchor", format!("no upstream reference for '{}'", input))
            }),
        }
    }
}

/// A node input to rewire onto the chain's tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub node: NodeId,
    /// Input on the consumer that gets rewritten
    pub input: String,
    /// Threaded value the input should carry
    pub carries: String,
}

impl Consumer {
    /// Rewire `input` with the threaded value of the same name
    pub fn new(node: impl Into<NodeId>, input: impl Into<String>) -> Self {
        let input = input.into();
        Self {
            node: node.into(),
            carries: input.clone(),
            input,
        }
    }

    /// Rewire `input` with a differently named threaded value
    pub fn carrying(node: impl Into<NodeId>, input: impl Into<String>, carries: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            input: input.into(),
            carries: carries.into(),
        }
    }
}

/// Splice `elements` into `graph` between `anchor` and the consumers
///
/// Mutates `graph` in place and returns the injected node ids in chain
/// order. With no elements the graph is left untouched. All checks run
/// before the first node is added, so a failed call leaves the graph as it
/// was.
///
/// Injecting a second chain of the same family in front of the same
/// primary consumer fails with [`CompileError::ChainAlreadyInjected`];
/// chains of different families compose.
pub fn inject_chain<E: ChainElement>(
    graph: &mut Graph,
    elements: &[E],
    anchor: &ChainAnchor,
    primary: &Consumer,
    secondary: &[Consumer],
) -> Result<Vec<NodeId>> {
    let Some(first) = elements.first() else {
        return Ok(Vec::new());
    };
    let family = first.family();
    let threaded = first.threaded();

    if graph
        .chains()
        .iter()
        .any(|c| c.family == family && c.consumer == primary.node)
    {
        return Err(CompileError::ChainAlreadyInjected {
            family: family.to_string(),
            consumer: primary.node.clone(),
        });
    }

    let mut upstream: BTreeMap<&str, NodeRef> = BTreeMap::new();
    for (input, slot) in threaded {
        let r = anchor.resolve(input, *slot)?;
        graph.require(&r.node)?;
        upstream.insert(input, r);
    }

    for consumer in std::iter::once(primary).chain(secondary) {
        graph.require(&consumer.node)?;
        if !threaded.iter().any(|(name, _)| *name == consumer.carries) {
            return Err(CompileError::invalid(
                "consumer",
                format!(
                    "'{}' chain does not carry '{}' (node '{}')",
                    family, consumer.carries, consumer.node
                ),
            ));
        }
    }

    let mut injected = Vec::with_capacity(elements.len());
    for element in elements {
        let mut inputs = element.settings();
        for (input, _) in threaded {
            inputs.insert(input.to_string(), Input::Ref(upstream[input].clone()));
        }
        let id = graph.add(element.operation(), inputs);
        for (input, slot) in threaded {
            upstream.insert(input, NodeRef::new(id.clone(), *slot));
        }
        injected.push(id);
    }

    for consumer in std::iter::once(primary).chain(secondary) {
        let tail = upstream[consumer.carries.as_str()].clone();
        graph.set_input(&consumer.node, consumer.input.clone(), Input::Ref(tail))?;
    }

    log::debug!(
        "Injected {} '{}' link(s) {:?} in front of node '{}'",
        injected.len(),
        family,
        injected,
        primary.node
    );

    graph.record_chain(ChainRecord {
        family: family.to_string(),
        consumer: primary.node.clone(),
        nodes: injected.clone(),
    });

    Ok(injected)
}

/// LoRA links thread the model and clip outputs of a checkpoint
const LORA_THREADED: &[(&str, u32)] = &[("model", slots::MODEL), ("clip", slots::CLIP)];

impl ChainElement for LoraConfig {
    fn family(&self) -> &'static str {
        "lora"
    }

    fn operation(&self) -> &str {
        ops::LORA_LOADER
    }

    fn threaded(&self) -> &'static [(&'static str, u32)] {
        LORA_THREADED
    }

    fn settings(&self) -> BTreeMap<String, Input> {
        BTreeMap::from([
            ("lora_name".to_string(), Input::literal(self.name.clone())),
            ("strength_model".to_string(), Input::literal(self.strength_model)),
            ("strength_clip".to_string(), Input::literal(self.strength_clip)),
        ])
    }
}

/// Splice a LoRA stack between a checkpoint loader and its readers
///
/// The sampler's `model` input is the primary consumer; every text encoder's
/// `clip` input is rewired as a secondary consumer.
pub fn inject_loras(
    graph: &mut Graph,
    loras: &[LoraConfig],
    checkpoint: &str,
    sampler: &str,
    text_encoders: &[&str],
) -> Result<Vec<NodeId>> {
    let encoders: Vec<Consumer> = text_encoders
        .iter()
        .map(|id| Consumer::new(*id, "clip"))
        .collect();
    inject_chain(
        graph,
        loras,
        &ChainAnchor::node(checkpoint),
        &Consumer::new(sampler, "model"),
        &encoders,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::validation::validate_graph;

    fn base_graph() -> Graph {
        GraphBuilder::new()
            .add_node("4", ops::CHECKPOINT_LOADER)
            .with_literal("ckpt_name", "m.safetensors")
            .add_node("6", ops::TEXT_ENCODE)
            .with_literal("text", "a cat")
            .with_ref("clip", "4", 1)
            .add_node("7", ops::TEXT_ENCODE)
            .with_literal("text", "blurry")
            .with_ref("clip", "4", 1)
            .add_node("3", ops::SAMPLER)
            .with_ref("model", "4", 0)
            .with_ref("positive", "6", 0)
            .with_ref("negative", "7", 0)
            .build()
    }

    #[test]
    fn test_empty_chain_is_noop() {
        let mut graph = base_graph();
        let before = graph.clone();
        let injected = inject_loras(&mut graph, &[], "4", "3", &["6", "7"]).unwrap();
        assert!(injected.is_empty());
        assert_eq!(graph, before);
        assert!(graph.chains().is_empty());
    }

    #[test]
    fn test_two_loras_form_linear_chain() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut graph = base_graph();
        let before_len = graph.len();
        let loras = [LoraConfig::new("a"), LoraConfig::new("b")];

        let injected = inject_loras(&mut graph, &loras, "4", "3", &["6", "7"]).unwrap();
        assert_eq!(injected.len(), 2);
        assert_eq!(graph.len(), before_len + 2);

        let first = graph.node(&injected[0]).unwrap();
        let second = graph.node(&injected[1]).unwrap();
        assert_eq!(first.literal("lora_name").unwrap(), "a");
        assert_eq!(second.literal("lora_name").unwrap(), "b");

        // first link reads the anchor, second reads the first
        assert_eq!(first.reference("model"), Some(&NodeRef::new("4", 0)));
        assert_eq!(first.reference("clip"), Some(&NodeRef::new("4", 1)));
        assert_eq!(second.reference("model"), Some(&NodeRef::new(injected[0].clone(), 0)));
        assert_eq!(second.reference("clip"), Some(&NodeRef::new(injected[0].clone(), 1)));

        // consumers read the tail
        let sampler = graph.node("3").unwrap();
        assert_eq!(sampler.reference("model").unwrap().node, injected[1]);
        for encoder in ["6", "7"] {
            assert_eq!(
                graph.node(encoder).unwrap().reference("clip"),
                Some(&NodeRef::new(injected[1].clone(), 1))
            );
        }
        assert!(validate_graph(&graph).is_empty());
    }

    #[test]
    fn test_repeated_injection_is_rejected() {
        let mut graph = base_graph();
        inject_loras(&mut graph, &[LoraConfig::new("a")], "4", "3", &["6", "7"]).unwrap();
        let snapshot = graph.clone();

        let err = inject_loras(&mut graph, &[LoraConfig::new("b")], "4", "3", &["6", "7"]).unwrap_err();
        assert!(matches!(err, CompileError::ChainAlreadyInjected { ref family, .. } if family == "lora"));
        assert_eq!(graph, snapshot);
    }

    #[test]
    fn test_unknown_consumer_leaves_graph_untouched() {
        let mut graph = base_graph();
        let before = graph.clone();
        let err = inject_loras(&mut graph, &[LoraConfig::new("a")], "4", "3", &["6", "99"]).unwrap_err();
        assert!(matches!(err, CompileError::UnknownNode(id) if id == "99"));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_consumer_must_read_a_threaded_value() {
        let mut graph = base_graph();
        let err = inject_chain(
            &mut graph,
            &[LoraConfig::new("a")],
            &ChainAnchor::node("4"),
            &Consumer::new("3", "positive"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidParameter { .. }));
    }

    #[test]
    fn test_injection_into_wire_graph_with_max_id() {
        let max = u64::MAX.to_string();
        let wire = serde_json::json!({
            (max.clone()): {"operation_name": ops::CHECKPOINT_LOADER, "inputs": {"ckpt_name": "m.safetensors"}},
            "6": {"operation_name": ops::TEXT_ENCODE, "inputs": {"text": "a cat", "clip": [max.clone(), 1]}},
            "3": {"operation_name": ops::SAMPLER, "inputs": {"model": [max.clone(), 0], "positive": ["6", 0]}}
        });
        let mut graph = Graph::from_wire(&wire).unwrap();

        let injected = inject_loras(&mut graph, &[LoraConfig::new("a")], &max, "3", &["6"]).unwrap();
        assert_eq!(injected, vec!["1".to_string()]);
        assert_eq!(graph.node("3").unwrap().reference("model"), Some(&NodeRef::new("1", 0)));
        assert!(validate_graph(&graph).is_empty());
    }
}
