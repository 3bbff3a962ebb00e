//! Control-conditioned generation
//!
//! Every condition gets its own image loader, optional detector and model
//! loader; the conditioning-apply nodes form one linear chain from the
//! prompt encoders to the sampler.

use std::collections::BTreeMap;

use super::diffusion::require_input;
use super::{check_dimension, CompileKind, CompiledGraph, GraphCompiler};
use crate::builder::GraphBuilder;
use crate::chain::{inject_chain, ChainAnchor, ChainElement, Consumer};
use crate::constants::{ids, ops, slots};
use crate::error::{CompileError, Result};
use crate::params::{ControlCondition, ControlNetParams, Txt2ImgParams};
use crate::preprocessor::{build_preprocessor_node, SignalType};
use crate::types::{Graph, Input, NodeId, NodeRef};

/// One conditioning-apply link, with its loaders already in the graph
#[derive(Debug, Clone)]
struct ControlLink {
    control_net: NodeId,
    image: NodeId,
    strength: f64,
    window: [f64; 2],
}

const CONTROL_THREADED: &[(&str, u32)] =
    &[("positive", slots::POSITIVE), ("negative", slots::NEGATIVE)];

impl ChainElement for ControlLink {
    fn family(&self) -> &'static str {
        "control"
    }

    fn operation(&self) -> &str {
        ops::CONTROLNET_APPLY
    }

    fn threaded(&self) -> &'static [(&'static str, u32)] {
        CONTROL_THREADED
    }

    fn settings(&self) -> BTreeMap<String, Input> {
        BTreeMap::from([
            ("control_net".to_string(), Input::link(self.control_net.clone(), 0)),
            ("image".to_string(), Input::link(self.image.clone(), 0)),
            ("strength".to_string(), Input::literal(self.strength)),
            ("start_percent".to_string(), Input::literal(self.window[0])),
            ("end_percent".to_string(), Input::literal(self.window[1])),
        ])
    }
}

/// A condition after table lookups and range checks
struct ResolvedCondition<'a> {
    signal: SignalType,
    strength: f64,
    condition: &'a ControlCondition,
}

fn resolve_condition(condition: &ControlCondition) -> Result<ResolvedCondition<'_>> {
    let signal: SignalType = condition.signal_type.parse()?;
    require_input("image", &condition.image)?;

    let [start, end] = condition.activation_window;
    if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
        return Err(CompileError::invalid(
            "activation_window",
            format!("[{}, {}] is not an ordered range within [0, 1]", start, end),
        ));
    }

    let strength = condition.strength.unwrap_or_else(|| signal.default_strength());
    if !(strength >= 0.0 && strength.is_finite()) {
        return Err(CompileError::invalid("strength", format!("{} is not a non-negative number", strength)));
    }

    Ok(ResolvedCondition {
        signal,
        strength,
        condition,
    })
}

/// Add the loaders for one condition and describe its apply link
fn add_condition_sources(graph: &mut Graph, resolved: &ResolvedCondition<'_>) -> Result<ControlLink> {
    let condition = resolved.condition;
    let loaded = graph.add(
        ops::LOAD_IMAGE,
        BTreeMap::from([("image".to_string(), Input::literal(condition.image.clone()))]),
    );

    let image = if condition.preprocess {
        build_preprocessor_node(
            graph,
            resolved.signal,
            &loaded,
            &condition.preprocessor_options,
        )?
    } else {
        loaded
    };

    let model = condition
        .model
        .clone()
        .unwrap_or_else(|| resolved.signal.default_model().to_string());
    let control_net = graph.add(
        ops::CONTROLNET_LOADER,
        BTreeMap::from([("control_net_name".to_string(), Input::literal(model))]),
    );

    Ok(ControlLink {
        control_net,
        image,
        strength: resolved.strength,
        window: condition.activation_window,
    })
}

impl GraphCompiler {
    /// Generation steered by one or more control conditions, applied in order
    pub fn compile_controlnet(&self, params: &ControlNetParams) -> Result<CompiledGraph> {
        if params.conditions.is_empty() {
            return Err(CompileError::EmptyControlConditions);
        }
        let resolved = params
            .conditions
            .iter()
            .map(resolve_condition)
            .collect::<Result<Vec<_>>>()?;

        let (width, height) = params.resolved_size();
        check_dimension("width", width)?;
        check_dimension("height", height)?;
        let sources = GraphBuilder::new()
            .add_node(ids::LATENT, ops::EMPTY_LATENT)
            .with_literal("width", width)
            .with_literal("height", height)
            .with_literal("batch_size", 1);

        let (mut graph, seed) = self.diffusion_template(
            CompileKind::ControlNet,
            &params.base,
            sources,
            ids::LATENT,
            1.0,
        )?;

        let mut links = Vec::with_capacity(resolved.len());
        for condition in &resolved {
            links.push(add_condition_sources(&mut graph, condition)?);
        }

        let applied = inject_chain(
            &mut graph,
            &links,
            &ChainAnchor::refs([
                ("positive", NodeRef::new(ids::POSITIVE, 0)),
                ("negative", NodeRef::new(ids::NEGATIVE, 0)),
            ]),
            &Consumer::new(ids::SAMPLER, "positive"),
            &[Consumer::new(ids::SAMPLER, "negative")],
        )?;
        log::debug!(
            "Control chain for {:?}: {:?}",
            resolved.iter().map(|r| r.signal.as_str()).collect::<Vec<_>>(),
            applied
        );

        self.finish_diffusion(graph, &params.base.loras, seed, CompileKind::ControlNet)
    }

    /// Generation steered by a single control condition
    pub fn compile_single_controlnet(
        &self,
        params: &Txt2ImgParams,
        condition: ControlCondition,
    ) -> Result<CompiledGraph> {
        self.compile_controlnet(&ControlNetParams {
            base: params.base.clone(),
            width: params.width,
            height: params.height,
            conditions: vec![condition],
        })
    }
}
