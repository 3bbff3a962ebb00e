//! The contract the orchestrator consumes from the execution engine
//!
//! Implementations live elsewhere (an HTTP client for a live engine, an
//! in-memory mock in tests); the orchestrator only ever talks to this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use graph_compiler::{Graph, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::EventSink;

/// Broad media category of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// A file produced by the engine, addressed the way the engine serves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage bucket on the engine side ("output", "temp", "input")
    #[serde(rename = "type")]
    pub kind: String,
    pub media: MediaKind,
}

impl ArtifactRef {
    pub fn image(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            kind: "output".to_string(),
            media: MediaKind::Image,
        }
    }
}

/// Artifacts of a finished job, grouped by the node that produced them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutputs {
    pub outputs_by_node: BTreeMap<NodeId, Vec<ArtifactRef>>,
}

impl JobOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact under `node` (builder style)
    pub fn with_artifact(mut self, node: impl Into<NodeId>, artifact: ArtifactRef) -> Self {
        self.outputs_by_node
            .entry(node.into())
            .or_default()
            .push(artifact);
        self
    }

    /// Artifacts produced by one node
    pub fn for_node(&self, node: &str) -> &[ArtifactRef] {
        self.outputs_by_node
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.outputs_by_node.values().all(Vec::is_empty)
    }
}

/// Submits graphs to the engine and retrieves what they produce
///
/// Submitting returns as soon as the engine accepts the job; waiting is a
/// separate call. Abandoning a wait does not cancel the job engine-side.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Queue a graph and return the engine's job id
    async fn submit(&self, graph: &Graph) -> Result<String>;

    /// Wait for a job to finish
    ///
    /// Fails with [`PipelineError::Engine`](crate::PipelineError::Engine)
    /// when the engine reports failure or the wait times out. Progress is
    /// reported through `events` as it becomes known.
    async fn await_completion(&self, job_id: &str, events: &dyn EventSink) -> Result<JobOutputs>;

    /// Download the bytes of an artifact
    async fn fetch_artifact_bytes(&self, artifact: &ArtifactRef) -> Result<Vec<u8>>;

    /// Store `bytes` in the engine's input folder and return the name a
    /// later graph must use to load it
    async fn upload_input_image(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String>;
}
