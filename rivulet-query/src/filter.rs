//! FILTER stage.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::eval::{self, compare};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::Pattern;
use std::sync::Arc;

/// Stage builder for `filter` nodes.
///
/// A solution passes when the expression's effective boolean value is
/// true; an evaluation error excludes the solution and the query
/// continues.
pub struct FilterStageBuilder;

impl StageBuilder for FilterStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        _ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Filter { expression } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "FILTER stage got a `{}` node",
                pattern.kind()
            )));
        };
        let compiled = eval::compile(expression, &planner.functions())?;
        Ok(pipeline::flat_map(source, move |mu| {
            match compiled(&mu).and_then(|value| compare::ebv_opt(value.as_ref())) {
                Ok(true) => pipeline::of(mu),
                Ok(false) => pipeline::empty(),
                Err(e) if e.is_recoverable() => pipeline::empty(),
                Err(e) => pipeline::once_err(e),
            }
        }))
    }
}
