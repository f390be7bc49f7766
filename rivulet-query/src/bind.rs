//! BIND stage.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::eval::{self, CompiledExpression};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use rivulet_core::{Pattern, Term};
use std::sync::Arc;

/// Stage builder for `bind` nodes.
///
/// One output mapping per input mapping, always: when the expression
/// fails (recoverably) or comes back unbound, the target variable
/// receives the `Unbound` sentinel and the solution is still emitted.
pub struct BindStageBuilder;

impl StageBuilder for BindStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        _ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Bind {
            expression,
            variable,
        } = pattern
        else {
            return Err(QueryError::UnsupportedPattern(format!(
                "BIND stage got a `{}` node",
                pattern.kind()
            )));
        };
        let compiled = eval::compile(expression, &planner.functions())?;
        Ok(bind_stream(source, variable.clone(), compiled))
    }
}

/// Extend each mapping with the evaluated expression; shared with the
/// plan builder's projection-expression handling.
pub(crate) fn bind_stream(
    source: SolutionStream,
    variable: Arc<str>,
    compiled: CompiledExpression,
) -> SolutionStream {
    pipeline::flat_map(source, move |mut mu| {
        let value = match compiled(&mu) {
            Ok(Some(term)) => term,
            Ok(None) => Term::Unbound,
            Err(e) if e.is_recoverable() => Term::Unbound,
            Err(e) => return pipeline::once_err(e),
        };
        mu.insert(variable.clone(), value);
        pipeline::of(mu)
    })
}
