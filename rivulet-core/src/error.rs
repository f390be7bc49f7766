//! Error types for the data model and backend contract.

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by graph backends and the dataset.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Backend-specific failure during find / evalBGP / mutation.
    #[error("graph backend error: {0}")]
    Backend(String),

    /// A named graph required by the query is absent from the dataset.
    #[error("unknown graph: <{0}>")]
    UnknownGraph(Arc<str>),

    /// The backend does not implement an optional operation.
    #[error("operation not supported by this graph: {0}")]
    Unsupported(&'static str),

    /// Mutation attempted on a read-only (virtual) graph.
    #[error("graph is read-only")]
    ReadOnly,

    /// Cardinality estimation failed; callers treat this as non-fatal.
    #[error("cardinality estimation failed: {0}")]
    Estimation(String),
}

/// Result type for backend operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;
