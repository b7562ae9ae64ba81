//! Error types for layout operations.

use thiserror::Error;

/// Errors returned by the programmatic layout API.
///
/// The event-stream entry point never propagates these: it logs them and
/// drops the offending event so the layout keeps up with the stream.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// No particle is registered under this node id.
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// No spring is registered under this edge id.
    #[error("edge not found: {edge_id}")]
    EdgeNotFound { edge_id: String },

    /// A particle already exists for this node id.
    #[error("node '{node_id}' already exists")]
    DuplicateNode { node_id: String },

    /// A spring already exists for this edge id.
    #[error("edge '{edge_id}' already exists")]
    DuplicateEdge { edge_id: String },

    /// An edge references a node that has no particle.
    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    MissingEndpoint { edge_id: String, node_id: String },

    /// Writing the statistics file failed.
    #[error("statistics output failed: {0}")]
    Stats(#[from] std::io::Error),

    /// The layout thread is gone.
    #[error("layout runner stopped")]
    RunnerStopped,
}

/// Result type for layout operations.
pub type LayoutResult<T> = Result<T, LayoutError>;
