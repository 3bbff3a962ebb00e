//! Error types for graph compilation
//!
//! Every variant here is a configuration problem detected before anything
//! is sent to the engine. None of them are worth retrying.

use thiserror::Error;

use crate::types::NodeId;

/// Result type alias using CompileError
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors raised while building or validating a graph
#[derive(Debug, Error)]
pub enum CompileError {
    /// Neither the request nor the compiler config names a model
    #[error("No model resolvable for {0}")]
    MissingModel(String),

    /// A control-conditioned compile was asked for zero conditions
    #[error("Control-condition list is empty")]
    EmptyControlConditions,

    /// Every outpaint extent was zero or absent
    #[error("Outpaint needs at least one non-zero extent (left, top, right, bottom)")]
    NoOutpaintExtent,

    /// Control signal type not present in the preprocessor table
    #[error("Unknown control signal type: {0}")]
    UnknownSignalType(String),

    /// Mask request without a preset, a text description or a region
    #[error("Mask request needs a preset, a text description or an explicit region")]
    MissingMaskSource,

    /// A parameter is present but out of range
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A node id was inserted twice
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// An operation referred to a node that is not in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// A reference points at a node that is not in the graph
    #[error("Input '{input}' of node '{node}' references missing node '{target}'")]
    DanglingReference {
        node: NodeId,
        input: String,
        target: NodeId,
    },

    /// The graph is not acyclic
    #[error("Cycle detected in graph")]
    CycleDetected,

    /// The same modifier family was spliced twice in front of one consumer
    #[error("A '{family}' chain has already been injected in front of node '{consumer}'")]
    ChainAlreadyInjected { family: String, consumer: NodeId },

    /// Wire (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompileError {
    /// Create an invalid parameter error
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
