//! Error types for query execution.

use rivulet_core::{GraphError, PatternKind};
use thiserror::Error;

/// Query compilation and execution errors.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed query text or JSON tree.
    #[error("parse error: {0}")]
    Parse(String),

    /// Algebra node kind the engine does not know.
    #[error("unsupported pattern: {0}")]
    UnsupportedPattern(String),

    /// Query form the engine does not know.
    #[error("unsupported query type: {0}")]
    UnsupportedQueryType(String),

    /// Known pattern kind with no registered stage builder.
    #[error("no stage registered for `{0}` patterns")]
    MissingStage(PatternKind),

    /// Expression references a function IRI nothing resolves.
    #[error("unknown function: <{0}>")]
    UnknownFunction(String),

    /// Aggregate evaluated outside a grouped solution.
    #[error("aggregate used outside a GROUP BY context")]
    AggregationOutsideGroup,

    /// Expression evaluation failed.
    ///
    /// The one recoverable kind: BIND turns it into `Unbound`, FILTER
    /// drops the solution, HAVING drops the group.
    #[error("expression evaluation failed: {0}")]
    Expression(String),

    /// Backend failure; propagated to the sink.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// SERVICE evaluation failed (non-SILENT).
    #[error("service <{endpoint}> failed: {reason}")]
    Service { endpoint: String, reason: String },

    /// Invalid query structure (bad magic-triple operands, etc.).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Update execution failed; remaining updates were aborted.
    #[error("update failed: {0}")]
    Update(String),
}

impl QueryError {
    /// Shorthand for the recoverable expression-evaluation kind.
    pub fn expression(msg: impl Into<String>) -> Self {
        QueryError::Expression(msg.into())
    }

    /// True for errors each expression consumer converts per its own
    /// policy instead of aborting the query.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, QueryError::Expression(_))
    }
}

impl From<rivulet_core::parse::JsonError> for QueryError {
    fn from(err: rivulet_core::parse::JsonError) -> Self {
        QueryError::Parse(err.to_string())
    }
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
