//! OPTIONAL stage.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::Pattern;
use std::sync::Arc;

/// Stage builder for `optional` nodes.
///
/// Left-join semantics: each input mapping seeds the optional body;
/// when the body produces nothing for a mapping, the mapping itself
/// passes through unextended.
pub struct OptionalStageBuilder;

impl StageBuilder for OptionalStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Optional { patterns } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "OPTIONAL stage got a `{}` node",
                pattern.kind()
            )));
        };
        let body = patterns.clone();
        let planner = planner.clone();
        Ok(pipeline::flat_map(source, move |mu| {
            match planner.build_group(pipeline::of(mu.clone()), &body, ctx.clone()) {
                Ok(stream) => pipeline::or_else_value(stream, mu),
                Err(e) => pipeline::once_err(e),
            }
        }))
    }
}
