//! # Rivulet Core
//!
//! Data model and backend contract for the Rivulet SPARQL engine.
//!
//! This crate provides:
//! - RDF terms, triples, quads, and triple patterns
//! - Solution mappings with set algebra and grouped-row state
//! - The parsed-query algebra tree and a JSON tree adapter
//! - The [`graph::Graph`] trait backends implement, with the
//!   reference nested-loop BGP evaluation
//! - [`dataset::Dataset`]: default + named graphs with on-demand
//!   creation through a factory

pub mod algebra;
pub mod bindings;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod parse;
pub mod term;
pub mod triple;
pub mod vocab;

// Re-exports
pub use algebra::{
    Expression, FromClause, GraphRefTarget, GraphTarget, GroupCondition, OrderComparator, Pattern,
    PatternKind, Projection, Query, QueryType, QuadPattern, Update, UpdateRequest, ValuesRow,
};
pub use bindings::{Bindings, GroupSlice};
pub use dataset::{Dataset, GraphFactory, UnionGraph};
pub use error::{GraphError, GraphResult};
pub use graph::{
    match_pattern, nested_loop, BindingStream, Capabilities, FullTextMatch, FullTextOptions,
    FullTextStream, Graph, TripleStream,
};
pub use term::{Literal, Term};
pub use triple::{NegatedLink, Predicate, PropertyPath, Quad, Triple, TriplePattern};
