//! The stage-builder contract.
//!
//! The plan builder keeps one registered [`StageBuilder`] per pattern
//! kind and dispatches algebra nodes to them; replacing a registration
//! swaps the execution strategy for that kind.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::pipeline::SolutionStream;
use crate::planner::PlanBuilder;
use rivulet_core::Pattern;
use std::sync::Arc;

/// Builds the pipeline stage for one pattern kind.
///
/// `execute` consumes the upstream solution sequence and returns the
/// downstream one. Stages needing recursive evaluation (UNION
/// branches, OPTIONAL bodies) go back through the `planner`.
pub trait StageBuilder: Send + Sync {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream>;
}
