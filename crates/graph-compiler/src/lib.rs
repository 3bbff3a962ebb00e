//! Graph Compiler - node-graph construction for a media-synthesis engine
//!
//! This crate turns high-level generation requests into the flat, keyed
//! node graphs the engine accepts. It covers:
//!
//! - Fixed templates for every generation mode (txt2img, img2img, upscale,
//!   control-conditioned generation, inpaint, outpaint, mask extraction,
//!   speech synthesis, portrait lip-sync)
//! - Modifier-chain injection (LoRA stacks, control-condition stacks)
//! - Control-signal preprocessing
//! - Structural validation (every reference resolves, no cycles)
//!
//! # Architecture
//!
//! A [`Graph`] is an arena of [`Node`]s keyed by string id; nodes read each
//! other's outputs through [`Input::Ref`] handles. Compilation is pure and
//! synchronous: no network, no filesystem.
//!
//! # Example
//!
//! ```
//! use graph_compiler::{GraphCompiler, PromptParams, Txt2ImgParams};
//!
//! let compiled = GraphCompiler::default()
//!     .compile_txt2img(&Txt2ImgParams {
//!         base: PromptParams::new("a cat").with_model("m.safetensors"),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let wire = compiled.to_wire().unwrap();
//! assert_eq!(wire["3"]["operation_name"], "KSampler");
//! ```

pub mod builder;
pub mod chain;
pub mod compiler;
pub mod constants;
pub mod error;
pub mod params;
pub mod preprocessor;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::GraphBuilder;
pub use chain::{inject_chain, inject_loras, ChainAnchor, ChainElement, Consumer};
pub use compiler::{resolve_seed, CompileKind, CompiledGraph, CompilerConfig, GraphCompiler};
pub use error::{CompileError, Result};
pub use params::{
    ControlCondition, ControlNetParams, Img2ImgParams, InpaintParams, LipSyncParams, LoraConfig,
    MaskParams, MaskPreset, MaskRegion, OutpaintParams, PromptParams, Resize, SamplerSettings,
    TtsParams, Txt2ImgParams, UpscaleParams,
};
pub use preprocessor::{build_preprocessor_node, resolve_detector, PreprocessorOptions, SignalType};
pub use types::{ChainRecord, Graph, Input, Node, NodeId, NodeRef};
pub use validation::{validate_graph, ValidationError};
