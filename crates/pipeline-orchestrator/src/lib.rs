//! Pipeline Orchestrator - staged generation against a node-graph engine
//!
//! This crate sequences compiled graphs into pipelines where each stage's
//! output artifact becomes the next stage's input. It provides:
//!
//! - `PipelineOrchestrator::execute_pipeline`: base generation, optional
//!   refine (hi-res fix) pass, optional upscale pass
//! - `PipelineOrchestrator::imagine`: family detection, prompt strategy and
//!   quality tiers resolved into a pipeline request
//! - `ExecutionClient`: the contract an engine client implements
//! - `EventSink`: progress streaming, independent of transport
//!
//! # Failure policy
//!
//! The first failing stage stops the run. The caller receives a
//! [`PipelineFailure`] holding the partial step log, the captured seed and
//! the triggering error; artifacts already written are left on disk.

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod executor;
pub mod family;
pub mod imagine;
pub mod quality;
pub mod request;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export key types
pub use client::{ArtifactRef, ExecutionClient, JobOutputs, MediaKind};
pub use config::{ConfigError, HiresDefaults, OrchestratorConfig};
pub use error::{PipelineError, PipelineFailure, Result};
pub use events::{ChannelEventSink, EventError, EventSink, NullEventSink, PipelineEvent, VecEventSink};
pub use executor::{PipelineOrchestrator, PipelineRun, PipelineStage, PipelineState, StepRecord};
pub use family::{detect_family, FamilyDetection, ModelFamily};
pub use imagine::{resolve_settings, ImagineOutcome, ImagineRequest, ImagineSettings};
pub use quality::{QualityTier, TierSettings};
pub use request::{BaseGeneration, HiresFix, PipelineRequest, UpscaleOptions};
pub use strategy::{PassthroughStrategy, PromptStrategy, Recommendations, StrategyOutput, StrategyRequest};
