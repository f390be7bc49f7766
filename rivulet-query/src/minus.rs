//! MINUS stage.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::{Bindings, Pattern};
use std::sync::Arc;

/// Stage builder for `minus` nodes.
///
/// SPARQL MINUS semantics: the right side is evaluated independently
/// of the left (a full-buffer point); a left mapping is removed when
/// some right mapping is compatible with it *and* shares at least one
/// variable. Disjoint domains never remove anything.
pub struct MinusStageBuilder;

impl StageBuilder for MinusStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Minus { patterns } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "MINUS stage got a `{}` node",
                pattern.kind()
            )));
        };
        let body = patterns.clone();
        let planner = planner.clone();
        Ok(pipeline::from_async(async move {
            let right_stream =
                planner.build_group(pipeline::of(Bindings::new()), &body, ctx.clone())?;
            let right = pipeline::collect(right_stream).await?;
            Ok(pipeline::filter_map(source, move |mu| {
                let excluded = right
                    .iter()
                    .any(|nu| mu.shares_variable_with(nu) && mu.merge(nu).is_some());
                (!excluded).then_some(mu)
            }))
        }))
    }
}
