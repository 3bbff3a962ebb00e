//! Graph compiler
//!
//! Turns high-level generation requests into complete engine graphs. Each
//! generation mode starts from a fixed node template laid out with
//! [`GraphBuilder`]; modifier chains are then spliced in with
//! [`inject_chain`](crate::chain::inject_chain) and the result is validated
//! before it is handed out. Nothing here performs I/O.

mod control;
mod diffusion;
mod mask;
mod media;
mod upscale;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::GraphBuilder;
use crate::chain::inject_loras;
use crate::constants::{defaults, ids, ops, slots};
use crate::error::{CompileError, Result};
use crate::params::{LoraConfig, PromptParams};
use crate::types::{Graph, NodeId};
use crate::validation::validate_graph;

/// Compiler-wide fallbacks for values a request leaves out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Checkpoint used when a diffusion request names none
    pub default_checkpoint: Option<String>,
    /// Upscaler used when an upscale request names none
    pub default_upscale_model: Option<String>,
    /// Saver filename prefix when a request sets none
    pub filename_prefix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_checkpoint: None,
            default_upscale_model: Some(defaults::UPSCALE_MODEL.to_string()),
            filename_prefix: defaults::FILENAME_PREFIX.to_string(),
        }
    }
}

/// Generation mode a graph was compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileKind {
    Txt2Img,
    Img2Img,
    Upscale,
    ControlNet,
    Inpaint,
    Outpaint,
    Mask,
    Tts,
    LipSync,
}

impl CompileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompileKind::Txt2Img => "txt2img",
            CompileKind::Img2Img => "img2img",
            CompileKind::Upscale => "upscale",
            CompileKind::ControlNet => "controlnet",
            CompileKind::Inpaint => "inpaint",
            CompileKind::Outpaint => "outpaint",
            CompileKind::Mask => "mask",
            CompileKind::Tts => "tts",
            CompileKind::LipSync => "lipsync",
        }
    }
}

/// A validated graph ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    pub graph: Graph,
    /// Node whose output is the result of this graph
    pub output_node: NodeId,
    /// Seed handed to the sampler, for modes that sample
    pub seed: Option<u64>,
    pub kind: CompileKind,
}

impl CompiledGraph {
    /// Render the engine wire object
    pub fn to_wire(&self) -> Result<Value> {
        self.graph.to_wire()
    }
}

/// Pick the sampler seed: the caller's value, or uniform in [0, 2^31 - 1)
pub fn resolve_seed(requested: Option<u64>) -> u64 {
    match requested {
        Some(seed) => seed,
        None => rand::thread_rng().gen_range(0..defaults::MAX_SEED),
    }
}

/// Compiles generation requests into engine graphs
///
/// Holds no mutable state; one compiler can serve any number of concurrent
/// requests.
#[derive(Debug, Clone, Default)]
pub struct GraphCompiler {
    config: CompilerConfig,
}

impl GraphCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    fn resolve_model(&self, requested: Option<&str>, mode: CompileKind) -> Result<String> {
        requested
            .filter(|m| !m.trim().is_empty())
            .or(self.config.default_checkpoint.as_deref())
            .map(str::to_string)
            .ok_or_else(|| CompileError::MissingModel(mode.as_str().to_string()))
    }

    fn filename_prefix(&self, requested: Option<&str>) -> String {
        requested
            .unwrap_or(self.config.filename_prefix.as_str())
            .to_string()
    }

    /// Lay out the shared prompt/sampler/decoder template around `sources`
    ///
    /// `sources` already holds the mode-specific nodes; `latent` is the
    /// node among them feeding the sampler's latent input.
    fn diffusion_template(
        &self,
        mode: CompileKind,
        base: &PromptParams,
        sources: GraphBuilder,
        latent: &str,
        denoise: f64,
    ) -> Result<(Graph, u64)> {
        let model = self.resolve_model(base.model.as_deref(), mode)?;
        let sampler = &base.sampler;
        let steps = sampler.steps.unwrap_or(defaults::STEPS);
        if steps == 0 {
            return Err(CompileError::invalid("steps", "must be at least 1"));
        }
        check_fraction("denoise", denoise)?;
        let seed = resolve_seed(sampler.seed);

        let graph = sources
            .add_node(ids::CHECKPOINT, ops::CHECKPOINT_LOADER)
            .with_literal("ckpt_name", model)
            .add_node(ids::POSITIVE, ops::TEXT_ENCODE)
            .with_literal("text", base.prompt.clone())
            .with_ref("clip", ids::CHECKPOINT, slots::CLIP)
            .add_node(ids::NEGATIVE, ops::TEXT_ENCODE)
            .with_literal(
                "text",
                base.negative_prompt
                    .as_deref()
                    .unwrap_or(defaults::NEGATIVE_PROMPT),
            )
            .with_ref("clip", ids::CHECKPOINT, slots::CLIP)
            .add_node(ids::SAMPLER, ops::SAMPLER)
            .with_literal("seed", seed)
            .with_literal("steps", steps)
            .with_literal("cfg", sampler.cfg.unwrap_or(defaults::CFG))
            .with_literal(
                "sampler_name",
                sampler.sampler_name.as_deref().unwrap_or(defaults::SAMPLER),
            )
            .with_literal(
                "scheduler",
                sampler.scheduler.as_deref().unwrap_or(defaults::SCHEDULER),
            )
            .with_literal("denoise", denoise)
            .with_ref("model", ids::CHECKPOINT, slots::MODEL)
            .with_ref("positive", ids::POSITIVE, 0)
            .with_ref("negative", ids::NEGATIVE, 0)
            .with_ref("latent_image", latent, 0)
            .add_node(ids::DECODE, ops::VAE_DECODE)
            .with_ref("samples", ids::SAMPLER, 0)
            .with_ref("vae", ids::CHECKPOINT, slots::VAE)
            .add_node(ids::SAVE, ops::SAVE_IMAGE)
            .with_literal(
                "filename_prefix",
                self.filename_prefix(base.filename_prefix.as_deref()),
            )
            .with_ref("images", ids::DECODE, 0)
            .build_validated()?;

        Ok((graph, seed))
    }

    /// Splice the LoRA stack and seal a diffusion graph
    fn finish_diffusion(
        &self,
        mut graph: Graph,
        loras: &[LoraConfig],
        seed: u64,
        kind: CompileKind,
    ) -> Result<CompiledGraph> {
        inject_loras(
            &mut graph,
            loras,
            ids::CHECKPOINT,
            ids::SAMPLER,
            &[ids::POSITIVE, ids::NEGATIVE],
        )?;
        seal(graph, ids::SAVE, Some(seed), kind)
    }
}

/// Final structural check before a graph leaves the compiler
fn seal(graph: Graph, output_node: &str, seed: Option<u64>, kind: CompileKind) -> Result<CompiledGraph> {
    if let Some(error) = validate_graph(&graph).into_iter().next() {
        return Err(error.into());
    }
    graph.require(output_node)?;
    log::debug!(
        "Compiled {} graph: {} nodes, output '{}', seed {:?}",
        kind.as_str(),
        graph.len(),
        output_node,
        seed
    );
    Ok(CompiledGraph {
        graph,
        output_node: output_node.to_string(),
        seed,
        kind,
    })
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(CompileError::invalid(name, format!("{} is outside (0, 1]", value)))
    }
}

fn check_dimension(name: &str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(CompileError::invalid(name, "must be greater than zero"));
    }
    Ok(())
}
