//! SERVICE stage.
//!
//! Federation is delegated to a pluggable [`ServiceClient`]; the stage
//! sends the inner patterns (with the input mapping substituted) to
//! the endpoint and joins the returned mappings. `SERVICE SILENT`
//! turns client failures into an empty result.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use async_trait::async_trait;
use rivulet_core::{Bindings, Pattern, Term};
use std::sync::Arc;
use tracing::warn;

/// Executes the patterns of a SERVICE clause against a remote
/// endpoint.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn query(&self, endpoint: &str, patterns: &[Pattern]) -> Result<Vec<Bindings>>;
}

/// Stage builder for `service` nodes.
pub struct ServiceStageBuilder;

impl StageBuilder for ServiceStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        _ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Service {
            name,
            silent,
            patterns,
        } = pattern
        else {
            return Err(QueryError::UnsupportedPattern(format!(
                "SERVICE stage got a `{}` node",
                pattern.kind()
            )));
        };
        let Term::Iri(endpoint) = name else {
            return Err(QueryError::InvalidQuery(format!(
                "SERVICE endpoint is not an IRI: {name}"
            )));
        };
        let Some(client) = planner.service_client() else {
            return Err(QueryError::Service {
                endpoint: endpoint.to_string(),
                reason: "no service client configured".into(),
            });
        };
        let endpoint = endpoint.clone();
        let silent = *silent;
        let body = patterns.clone();
        Ok(pipeline::flat_map(source, move |mu| {
            let client = client.clone();
            let endpoint = endpoint.clone();
            let substituted: Vec<Pattern> = body.iter().map(|p| p.substitute(&mu)).collect();
            let input = mu.clone();
            pipeline::from_async(async move {
                match client.query(&endpoint, &substituted).await {
                    Ok(rows) => {
                        let joined: Vec<Bindings> = rows
                            .into_iter()
                            .filter_map(|row| input.merge(&row))
                            .collect();
                        Ok(pipeline::from_iter(joined))
                    }
                    Err(e) if silent => {
                        warn!(endpoint = %endpoint, error = %e, "SERVICE SILENT swallowed a failure");
                        Ok(pipeline::empty())
                    }
                    Err(e) => Err(QueryError::Service {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    }),
                }
            })
        }))
    }
}
