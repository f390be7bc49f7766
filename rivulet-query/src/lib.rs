//! # Rivulet Query
//!
//! Streaming SPARQL 1.1 execution core.
//!
//! This crate provides:
//! - A [`planner::PlanBuilder`] that compiles parsed queries into
//!   lazy pipelines of solution mappings
//! - The stage library behind it: BGP evaluation with bound join and
//!   full-text magic triples, Glushkov property paths, OPTIONAL /
//!   MINUS / UNION / GRAPH / SERVICE / FILTER / BIND, grouping and
//!   aggregation, ORDER BY, DISTINCT
//! - The SPARQL expression evaluator with custom function and
//!   aggregate registration
//! - A semantic BGP cache with subset matching and a first-committer
//!   write protocol
//! - An update engine for INSERT / DELETE / LOAD / graph management
//!
//! ## Quick start
//!
//! Bind a [`rivulet_core::Dataset`] into a `PlanBuilder`, then call
//! `build` with a parsed [`rivulet_core::Query`] and consume the
//! returned [`results::QueryResults`].

pub mod aggregate;
pub mod bgp;
pub mod bind;
pub mod bound_join;
pub mod cache;
pub mod construct;
pub mod context;
pub mod distinct;
pub mod error;
pub mod eval;
pub mod filter;
pub mod fulltext;
pub mod graph;
pub mod hints;
pub mod minus;
pub mod optional;
pub mod options;
pub mod path;
pub mod pipeline;
pub mod planner;
pub mod results;
pub mod service;
pub mod sort;
pub mod stage;
pub mod union;
pub mod update;
pub mod values;

// Re-exports
pub use cache::{BgpCache, BgpKey, WriterId};
pub use context::{ExecutionContext, GraphSelection, HintMap};
pub use error::{QueryError, Result};
pub use eval::{CompiledExpression, CustomAggregate, CustomFunction, FunctionRegistry};
pub use fulltext::{FullTextQuery, SEARCH_NAMESPACE};
pub use hints::HINT_NAMESPACE;
pub use options::EngineOptions;
pub use pipeline::SolutionStream;
pub use planner::{Optimizer, Plan, PlanBuilder, QueryParser};
pub use results::QueryResults;
pub use service::ServiceClient;
pub use stage::StageBuilder;
pub use update::{GraphLoader, UpdatePlan};

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use futures::StreamExt;
    use rivulet_core::{
        nested_loop, BindingStream, Graph, GraphError, GraphResult, Triple, TriplePattern,
        TripleStream,
    };
    use std::sync::Arc;

    /// A graph with nothing in it, for context-level unit tests.
    #[derive(Default, Clone)]
    pub struct EmptyGraph;

    #[async_trait]
    impl Graph for EmptyGraph {
        fn iri(&self) -> Arc<str> {
            Arc::from("urn:x-rivulet:empty")
        }

        async fn find(&self, _pattern: &TriplePattern) -> GraphResult<TripleStream> {
            Ok(futures::stream::empty().boxed())
        }

        async fn insert(&self, _triple: Triple) -> GraphResult<()> {
            Err(GraphError::ReadOnly)
        }

        async fn delete(&self, _triple: Triple) -> GraphResult<()> {
            Err(GraphError::ReadOnly)
        }

        async fn clear(&self) -> GraphResult<()> {
            Err(GraphError::ReadOnly)
        }

        async fn estimate_cardinality(&self, _pattern: &TriplePattern) -> GraphResult<usize> {
            Ok(0)
        }

        fn eval_bgp(&self, bgp: &[TriplePattern]) -> BindingStream {
            nested_loop::eval_bgp(self.clone(), bgp.to_vec())
        }
    }
}
