//! Error types for pipeline execution

use graph_compiler::CompileError;
use thiserror::Error;

use crate::executor::PipelineRun;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that terminate a pipeline run
///
/// None of these are retried by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid parameters, detected before anything is submitted
    #[error("Configuration error: {0}")]
    Configuration(#[from] CompileError),

    /// The engine reported a failure, or an expected output is missing
    #[error("Engine error: {0}")]
    Engine(String),

    /// Artifact read, write or re-upload failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create an engine error with a message
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}

/// A failed run: the step log up to and including the failing stage,
/// together with the error that stopped it
#[derive(Debug, Error)]
#[error("Pipeline {} failed: {error}", .run.execution_id)]
pub struct PipelineFailure {
    pub run: PipelineRun,
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    /// Last artifact that was written before the failure, if any
    pub fn last_good_artifact(&self) -> Option<&std::path::Path> {
        self.run.final_artifact.as_deref()
    }
}
