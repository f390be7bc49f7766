//! VALUES stage.
//!
//! The plan builder normally rewrites VALUES clauses away (per-row
//! substitution into the group body); this stage covers direct
//! dispatch of a `values` node, joining each input mapping with every
//! compatible row.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::{Bindings, Pattern};
use std::sync::Arc;

/// Stage builder for `values` nodes.
pub struct ValuesStageBuilder;

impl StageBuilder for ValuesStageBuilder {
    fn execute(
        &self,
        _planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        _ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Values { rows } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "VALUES stage got a `{}` node",
                pattern.kind()
            )));
        };
        let rows: Vec<Bindings> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(var, term)| (var.clone(), term.clone()))
                    .collect()
            })
            .collect();
        Ok(pipeline::flat_map(source, move |mu| {
            let joined: Vec<Bindings> = rows.iter().filter_map(|row| mu.merge(row)).collect();
            pipeline::from_iter(joined)
        }))
    }
}
