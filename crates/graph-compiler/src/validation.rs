//! Structural validation for engine graphs
//!
//! Checks that every reference resolves to a node in the same graph and
//! that the references form a DAG.

use std::collections::{HashMap, VecDeque};

use crate::error::CompileError;
use crate::types::{Graph, NodeId};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An input references a node that is not in the graph
    DanglingReference {
        node: NodeId,
        input: String,
        target: NodeId,
    },
    /// Cycle detected in the graph
    CycleDetected,
}

impl From<ValidationError> for CompileError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::DanglingReference {
                node,
                input,
                target,
            } => CompileError::DanglingReference {
                node,
                input,
                target,
            },
            ValidationError::CycleDetected => CompileError::CycleDetected,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference {
                node,
                input,
                target,
            } => write!(
                f,
                "Input '{}' of node '{}' references missing node '{}'",
                input, node, target
            ),
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate an engine graph
///
/// Returns all validation errors found (not just the first).
pub fn validate_graph(graph: &Graph) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_references(graph, &mut errors);
    if errors.is_empty() {
        detect_cycles(graph, &mut errors);
    }

    errors
}

/// Check that every `Ref` points at an existing node
fn validate_references(graph: &Graph, errors: &mut Vec<ValidationError>) {
    for node in graph.iter() {
        for (input, target) in node.references() {
            if !graph.contains(&target.node) {
                errors.push(ValidationError::DanglingReference {
                    node: node.id.clone(),
                    input: input.to_string(),
                    target: target.node.clone(),
                });
            }
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles(graph: &Graph, errors: &mut Vec<ValidationError>) {
    let mut in_degree: HashMap<&str, usize> = graph.node_ids().map(|id| (id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in graph.iter() {
        for (_, target) in node.references() {
            *in_degree.entry(node.id.as_str()).or_insert(0) += 1;
            dependents
                .entry(target.node.as_str())
                .or_default()
                .push(node.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for &dependent in dependents.get(node_id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(dependent) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if visited < graph.len() {
        errors.push(ValidationError::CycleDetected);
    }
}
