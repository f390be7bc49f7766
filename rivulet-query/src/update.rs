//! SPARQL Update execution.
//!
//! Each operation of a request compiles into one step of an
//! [`UpdatePlan`]; consuming the plan executes the steps in order and
//! aborts at the first failure. `LOAD` delegates fetching and parsing
//! to an injected [`GraphLoader`].

use crate::error::{QueryError, Result};
use crate::planner::PlanBuilder;
use futures::future::BoxFuture;
use rivulet_core::{
    Bindings, Dataset, Graph, GraphRefTarget, GraphTarget, Pattern, Quad, QuadPattern, Query,
    QueryType, Term, Triple, Update,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches and parses the document behind a LOAD source IRI.
pub type GraphLoader =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Vec<Triple>>> + Send + Sync>;

/// A compiled update request, executed with [`UpdatePlan::execute`].
pub struct UpdatePlan {
    planner: PlanBuilder,
    updates: Vec<Update>,
}

impl UpdatePlan {
    pub(crate) fn new(planner: PlanBuilder, updates: Vec<Update>) -> Self {
        Self { planner, updates }
    }

    /// Run the updates sequentially; the first failure aborts the
    /// remaining operations.
    pub async fn execute(&self) -> Result<()> {
        for (index, update) in self.updates.iter().enumerate() {
            debug!(index, "executing update operation");
            self.execute_one(update).await.map_err(|e| {
                QueryError::Update(format!("operation {index} failed: {e}"))
            })?;
        }
        Ok(())
    }

    async fn execute_one(&self, update: &Update) -> Result<()> {
        let dataset = self.planner.dataset();
        match update {
            Update::InsertData { quads } => insert_quads(dataset, quads).await,
            Update::DeleteData { quads } => delete_quads(dataset, quads).await,
            Update::Modify {
                delete,
                insert,
                where_clause,
                using,
            } => {
                self.modify(delete, insert, where_clause, using.as_ref())
                    .await
            }
            Update::Load {
                source,
                destination,
                silent,
            } => self.load(source, destination.as_deref(), *silent).await,
            Update::Create { graph, silent } => match dataset.create_graph(graph) {
                Ok(_) => Ok(()),
                Err(e) if *silent => {
                    warn!(graph = %graph, error = %e, "CREATE SILENT swallowed a failure");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            Update::Drop { target, silent } => drop_target(dataset, target, *silent).await,
            Update::Clear { target, silent } => clear_target(dataset, target, *silent).await,
            Update::Copy {
                source,
                destination,
                silent,
            } => transfer(dataset, source, destination, *silent, Transfer::Copy).await,
            Update::Move {
                source,
                destination,
                silent,
            } => transfer(dataset, source, destination, *silent, Transfer::Move).await,
            Update::Add {
                source,
                destination,
                silent,
            } => transfer(dataset, source, destination, *silent, Transfer::Add).await,
        }
    }

    /// DELETE/INSERT ... WHERE: evaluate the WHERE clause through the
    /// normal engine, instantiate both templates for every solution,
    /// then apply all deletions before all insertions.
    async fn modify(
        &self,
        delete: &[QuadPattern],
        insert: &[QuadPattern],
        where_clause: &[Pattern],
        using: Option<&rivulet_core::FromClause>,
    ) -> Result<()> {
        let mut query = Query::new(QueryType::Select);
        query.where_clause = where_clause.to_vec();
        query.from = using.cloned();
        let solutions = self.planner.build(&query)?.all_bindings().await?;

        let dataset = self.planner.dataset();
        let mut deletions: Vec<Quad> = Vec::new();
        let mut insertions: Vec<Quad> = Vec::new();
        for solution in &solutions {
            instantiate_quads(delete, solution, &mut deletions)?;
            instantiate_quads(insert, solution, &mut insertions)?;
        }
        delete_quads(dataset, &deletions).await?;
        insert_quads(dataset, &insertions).await
    }

    async fn load(&self, source: &str, destination: Option<&str>, silent: bool) -> Result<()> {
        let Some(loader) = self.planner.loader() else {
            return Err(QueryError::Update("no LOAD handler installed".into()));
        };
        let outcome = async {
            let triples = loader(source.to_string()).await?;
            let dataset = self.planner.dataset();
            let graph = match destination {
                None => dataset.default_graph(),
                Some(iri) => graph_for_update(dataset, iri)?,
            };
            for triple in triples {
                graph.insert(triple).await?;
            }
            Ok(())
        }
        .await;
        match outcome {
            Err(e) if silent => {
                warn!(source = %source, error = %e, "LOAD SILENT swallowed a failure");
                Ok(())
            }
            other => other,
        }
    }
}

/// Resolve the target graph of a data insertion, creating missing
/// named graphs through the factory (SPARQL Update creates graphs
/// implicitly).
fn graph_for_update(dataset: &Dataset, iri: &str) -> Result<Arc<dyn Graph>> {
    if let Some(graph) = dataset.named_graph(iri) {
        return Ok(graph);
    }
    Ok(dataset.create_graph(iri)?)
}

async fn insert_quads(dataset: &Dataset, quads: &[Quad]) -> Result<()> {
    for quad in quads {
        let graph = match &quad.graph {
            None => dataset.default_graph(),
            Some(iri) => graph_for_update(dataset, iri)?,
        };
        graph.insert(quad.triple.clone()).await?;
    }
    Ok(())
}

async fn delete_quads(dataset: &Dataset, quads: &[Quad]) -> Result<()> {
    for quad in quads {
        let graph = match &quad.graph {
            // Deleting from a graph that does not exist is a no-op.
            None => dataset.default_graph(),
            Some(iri) => match dataset.named_graph(iri) {
                Some(graph) => graph,
                None => continue,
            },
        };
        graph.delete(quad.triple.clone()).await?;
    }
    Ok(())
}

/// Instantiate a template against one solution; non-ground triples
/// are dropped per the template rules.
fn instantiate_quads(
    template: &[QuadPattern],
    solution: &Bindings,
    out: &mut Vec<Quad>,
) -> Result<()> {
    for quad_pattern in template {
        let Some(triple) = solution.instantiate(&quad_pattern.pattern) else {
            continue;
        };
        let graph = match &quad_pattern.graph {
            None => None,
            Some(Term::Iri(iri)) => Some(iri.clone()),
            Some(Term::Variable(name)) => match solution.get(name) {
                Some(Term::Iri(iri)) => Some(iri.clone()),
                _ => continue,
            },
            Some(other) => {
                return Err(QueryError::Update(format!(
                    "template graph is not an IRI: {other}"
                )))
            }
        };
        out.push(Quad::new(triple, graph));
    }
    Ok(())
}

async fn drop_target(dataset: &Dataset, target: &GraphTarget, silent: bool) -> Result<()> {
    match target {
        GraphTarget::Default => dataset.default_graph().clear().await.map_err(Into::into),
        GraphTarget::Named(iri) => {
            if dataset.drop_graph(iri) || silent {
                Ok(())
            } else {
                Err(QueryError::Update(format!("no such graph: <{iri}>")))
            }
        }
        GraphTarget::AllNamed => {
            for iri in dataset.named_graph_iris() {
                dataset.drop_graph(&iri);
            }
            Ok(())
        }
        GraphTarget::All => {
            dataset.default_graph().clear().await?;
            for iri in dataset.named_graph_iris() {
                dataset.drop_graph(&iri);
            }
            Ok(())
        }
    }
}

async fn clear_target(dataset: &Dataset, target: &GraphTarget, silent: bool) -> Result<()> {
    match target {
        GraphTarget::Default => dataset.default_graph().clear().await.map_err(Into::into),
        GraphTarget::Named(iri) => match dataset.named_graph(iri) {
            Some(graph) => graph.clear().await.map_err(Into::into),
            None if silent => Ok(()),
            None => Err(QueryError::Update(format!("no such graph: <{iri}>"))),
        },
        GraphTarget::AllNamed => {
            for iri in dataset.named_graph_iris() {
                if let Some(graph) = dataset.named_graph(&iri) {
                    graph.clear().await?;
                }
            }
            Ok(())
        }
        GraphTarget::All => {
            dataset.default_graph().clear().await?;
            for iri in dataset.named_graph_iris() {
                if let Some(graph) = dataset.named_graph(&iri) {
                    graph.clear().await?;
                }
            }
            Ok(())
        }
    }
}

enum Transfer {
    Copy,
    Move,
    Add,
}

async fn transfer(
    dataset: &Dataset,
    source: &GraphRefTarget,
    destination: &GraphRefTarget,
    silent: bool,
    mode: Transfer,
) -> Result<()> {
    if source == destination {
        return Ok(());
    }
    let from = match source {
        GraphRefTarget::Default => Some(dataset.default_graph()),
        GraphRefTarget::Named(iri) => dataset.named_graph(iri),
    };
    let Some(from) = from else {
        if silent {
            return Ok(());
        }
        return Err(QueryError::Update("COPY/MOVE/ADD source graph is missing".into()));
    };
    let to = match destination {
        GraphRefTarget::Default => dataset.default_graph(),
        GraphRefTarget::Named(iri) => graph_for_update(dataset, iri)?,
    };

    // Read the source before clearing anything: source and
    // destination may alias through a union view.
    let pattern = rivulet_core::TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"));
    let mut found = from.find(&pattern).await.map_err(QueryError::from)?;
    let mut triples = Vec::new();
    while let Some(item) = found.next().await {
        triples.push(item.map_err(QueryError::from)?);
    }

    if !matches!(mode, Transfer::Add) {
        to.clear().await?;
    }
    for triple in triples {
        to.insert(triple).await?;
    }
    if matches!(mode, Transfer::Move) {
        match source {
            GraphRefTarget::Default => from.clear().await?,
            GraphRefTarget::Named(iri) => {
                dataset.drop_graph(iri);
            }
        }
    }
    Ok(())
}
