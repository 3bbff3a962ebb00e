//! Error types for the engine client

use pipeline_orchestrator::PipelineError;
use thiserror::Error;

/// Errors that can occur while talking to the engine
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Graph serialization failed: {0}")]
    Graph(#[from] graph_compiler::CompileError),
}

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for PipelineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Graph(e) => PipelineError::Configuration(e),
            other => PipelineError::engine(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failures_map_to_engine_error() {
        let err: PipelineError = ClientError::JobFailed("status error".into()).into();
        assert!(matches!(err, PipelineError::Engine(ref msg) if msg.contains("status error")));

        let err: PipelineError =
            ClientError::Timeout("job abc did not complete within 5s".into()).into();
        assert!(matches!(err, PipelineError::Engine(ref msg) if msg.contains("abc")));
    }
}
