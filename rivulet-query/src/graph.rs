//! GRAPH stage.
//!
//! Re-scopes the default-graph selection for the inner patterns: a
//! named graph IRI targets that graph, a variable is resolved per
//! input mapping by the BGP stage (iterating the visible named graphs
//! when unbound).

use crate::context::{ExecutionContext, GraphSelection};
use crate::error::{QueryError, Result};
use crate::pipeline::SolutionStream;
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::{Pattern, Term};
use std::sync::Arc;

/// Stage builder for `graph` nodes.
pub struct GraphStageBuilder;

impl StageBuilder for GraphStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Graph { name, patterns } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "GRAPH stage got a `{}` node",
                pattern.kind()
            )));
        };
        let selection = match name {
            Term::Iri(iri) => GraphSelection::Iris(vec![iri.clone()]),
            Term::Variable(variable) => GraphSelection::Variable(variable.clone()),
            other => {
                return Err(QueryError::InvalidQuery(format!(
                    "GRAPH name is neither an IRI nor a variable: {other}"
                )))
            }
        };
        let scoped = Arc::new(ctx.with_default_graphs(selection));
        planner.build_group(source, patterns, scoped)
    }
}
