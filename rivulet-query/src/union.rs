//! UNION stage.
//!
//! Branches are evaluated correlated: each input mapping seeds every
//! branch, and branch results concatenate per input row. Correlation
//! keeps bindings from earlier patterns visible inside the branches.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::Pattern;
use std::sync::Arc;

/// Stage builder for `union` nodes.
pub struct UnionStageBuilder;

impl StageBuilder for UnionStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Union { patterns } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "UNION stage got a `{}` node",
                pattern.kind()
            )));
        };
        let branches = patterns.clone();
        let planner = planner.clone();
        Ok(pipeline::flat_map(source, move |mu| {
            let streams: Vec<SolutionStream> = branches
                .iter()
                .map(|branch| {
                    match planner.build_pattern(pipeline::of(mu.clone()), branch, ctx.clone()) {
                        Ok(stream) => stream,
                        Err(e) => pipeline::once_err(e),
                    }
                })
                .collect();
            pipeline::concat(streams)
        }))
    }
}
