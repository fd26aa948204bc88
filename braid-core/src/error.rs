use std::sync::Arc;

use thiserror::Error;

use crate::graph::Handle;

/// Failures surfaced while validating or executing a graph.  Every variant
/// names the node it refers to so a failure deep inside a large graph can be
/// traced back to the call site that built it.
#[derive(Debug, Clone, Error)]
pub enum Error {

    /// The wrapped callable panicked while executing.  Carries the panic
    /// payload as a message; never retried.
    #[error("task {node} failed: {message}")]
    Evaluation {
        node: Arc<Handle>,
        message: String
    },

    /// The dependency graph revisits a node on its own resolution path.
    /// Detected up front; no callable has executed when this is returned.
    #[error("dependency cycle through {node}")]
    Cycle {
        node: Arc<Handle>
    },

    /// A task received or produced a value whose dynamic type did not match
    /// the closure at the type-erasure boundary.
    #[error("task {node} saw an argument of an unexpected type")]
    TypeMismatch {
        node: Arc<Handle>
    },

    /// A task referenced an upstream handle the graph never produced.
    #[error("task {node} depends on a value that was never produced")]
    MissingDependency {
        node: Arc<Handle>
    },

    /// A requested output was not present after execution finished.
    #[error("requested output {node} was not produced")]
    MissingOutput {
        node: Arc<Handle>
    }
}

impl Error {
    /// The node this failure refers to.
    pub fn node(&self) -> &Arc<Handle> {
        match self {
            Error::Evaluation { node, .. } => node,
            Error::Cycle { node } => node,
            Error::TypeMismatch { node } => node,
            Error::MissingDependency { node } => node,
            Error::MissingOutput { node } => node
        }
    }
}
