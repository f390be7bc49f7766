//! Basic graph pattern stage.
//!
//! Preprocessing, in order: hint magic triples move into the context,
//! full-text magic triples become [`FullTextQuery`] join stages, blank
//! nodes become synthetic variables (projected away at the end), and
//! property-path patterns split off to the path stage.
//!
//! Evaluation picks the graph from the context's selection (default,
//! FROM graphs, or a per-mapping variable) and then either runs the
//! batched bound join (UNION-capable graph, index join not forced) or
//! the index-nested-loop join through the semantic cache.

use crate::bound_join;
use crate::cache::{BgpKey, CacheWriteStream};
use crate::context::{ExecutionContext, GraphSelection};
use crate::error::{QueryError, Result};
use crate::fulltext::{self, FullTextQuery};
use crate::hints;
use crate::path;
use crate::pipeline::{self, SolutionStream};
use crate::planner::PlanBuilder;
use crate::stage::StageBuilder;
use futures::StreamExt;
use rivulet_core::vocab::xsd;
use rivulet_core::{match_pattern, Bindings, Capabilities, Graph, Pattern, Term, TriplePattern};
use std::sync::Arc;
use tracing::debug;

/// Prefix of the synthetic variables standing in for blank nodes.
const BLANK_VAR_PREFIX: &str = "__bn_";

/// Stage builder for `bgp` nodes.
pub struct BgpStageBuilder;

impl StageBuilder for BgpStageBuilder {
    fn execute(
        &self,
        _planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Bgp { triples } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "BGP stage got a `{}` node",
                pattern.kind()
            )));
        };
        let triples = hints::extract(triples.clone(), &ctx);
        let (triples, searches) = fulltext::extract(triples)?;
        let (triples, synthetic) = rename_blank_nodes(triples);
        let (plain, paths): (Vec<_>, Vec<_>) = triples
            .into_iter()
            .partition(|t| !t.predicate.is_path());

        let stream = match ctx.default_graphs.clone() {
            GraphSelection::Variable(name) => {
                eval_variable_graph(name, source, plain, paths, searches, ctx)
            }
            selection => {
                let graph = resolve_graph(&selection, &ctx)?;
                eval_over_graph(graph, source, plain, paths, searches, &ctx)
            }
        };

        if synthetic.is_empty() {
            return Ok(stream);
        }
        Ok(pipeline::map(stream, move |mut mu| {
            for variable in &synthetic {
                mu.remove(variable);
            }
            mu
        }))
    }
}

/// Replace blank nodes with fresh variables, returning the synthetic
/// names so they can be projected out of final bindings.
fn rename_blank_nodes(triples: Vec<TriplePattern>) -> (Vec<TriplePattern>, Vec<Arc<str>>) {
    let mut synthetic: Vec<Arc<str>> = Vec::new();
    let mut rename = |term: &Term| -> Term {
        match term {
            Term::BlankNode(id) => {
                let name: Arc<str> = Arc::from(format!("{BLANK_VAR_PREFIX}{id}").as_str());
                if !synthetic.contains(&name) {
                    synthetic.push(name.clone());
                }
                Term::Variable(name)
            }
            other => other.clone(),
        }
    };
    let renamed = triples
        .iter()
        .map(|t| TriplePattern {
            subject: rename(&t.subject),
            predicate: t.predicate.clone(),
            object: rename(&t.object),
        })
        .collect();
    (renamed, synthetic)
}

/// Resolve a non-variable graph selection.
///
/// No FROM → the default graph; one FROM graph → that named graph; several →
/// their union. A missing named graph is fatal.
fn resolve_graph(selection: &GraphSelection, ctx: &ExecutionContext) -> Result<Arc<dyn Graph>> {
    match selection {
        GraphSelection::Default => Ok(ctx.dataset().default_graph()),
        GraphSelection::Iris(iris) => match iris.as_slice() {
            [single] => Ok(ctx.dataset().graph(Some(single))?),
            many => {
                let members: Vec<Option<Arc<str>>> =
                    many.iter().map(|iri| Some(iri.clone())).collect();
                Ok(ctx.dataset().union_graph(&members)?)
            }
        },
        GraphSelection::Variable(_) => Err(QueryError::InvalidQuery(
            "variable graph selection must be resolved per mapping".into(),
        )),
    }
}

/// Evaluate against a concrete graph: plain BGP first, then path and
/// full-text join stages.
fn eval_over_graph(
    graph: Arc<dyn Graph>,
    source: SolutionStream,
    plain: Vec<TriplePattern>,
    paths: Vec<TriplePattern>,
    searches: Vec<FullTextQuery>,
    ctx: &Arc<ExecutionContext>,
) -> SolutionStream {
    let mut stream = if plain.is_empty() {
        source
    } else {
        let graph = graph.clone();
        let ctx = ctx.clone();
        pipeline::from_async(async move {
            let plain = order_by_cardinality(&graph, plain).await;
            Ok(if use_bound_join(&graph, &ctx) {
                bound_join::execute(source, graph.clone(), plain, &ctx)
            } else {
                index_join(source, graph, plain, &ctx)
            })
        })
    };
    for pattern in paths {
        stream = path::join(stream, graph.clone(), pattern, ctx.clone());
    }
    for search in searches {
        stream = full_text_join(stream, graph.clone(), search);
    }
    stream
}

/// Put selective patterns first. Estimation failures are non-fatal:
/// the original order stands.
async fn order_by_cardinality(
    graph: &Arc<dyn Graph>,
    patterns: Vec<TriplePattern>,
) -> Vec<TriplePattern> {
    if patterns.len() < 2 {
        return patterns;
    }
    let mut estimated = Vec::with_capacity(patterns.len());
    for pattern in &patterns {
        match graph.estimate_cardinality(pattern).await {
            Ok(cardinality) => estimated.push(cardinality),
            Err(e) => {
                debug!(error = %e, "cardinality estimation failed; keeping pattern order");
                return patterns;
            }
        }
    }
    let mut order: Vec<usize> = (0..patterns.len()).collect();
    order.sort_by_key(|&i| estimated[i]);
    order.into_iter().map(|i| patterns[i].clone()).collect()
}

fn use_bound_join(graph: &Arc<dyn Graph>, ctx: &ExecutionContext) -> bool {
    graph.capabilities().contains(Capabilities::UNION)
        && !ctx.options.force_index_join
        && ctx.hint(hints::HINT_FORCE_INDEX_JOIN).is_none()
}

/// Index-nested-loop join: substitute each input mapping into the BGP
/// and delegate to the graph (through the cache when enabled).
fn index_join(
    source: SolutionStream,
    graph: Arc<dyn Graph>,
    patterns: Vec<TriplePattern>,
    ctx: &Arc<ExecutionContext>,
) -> SolutionStream {
    let ctx = ctx.clone();
    pipeline::flat_map(source, move |mu| {
        let bound: Vec<TriplePattern> = patterns.iter().map(|p| mu.bound(p)).collect();
        let results = eval_bgp_cached(graph.clone(), bound, &ctx);
        let input = mu.clone();
        pipeline::map(results, move |found| input.union(&found))
    })
}

/// Evaluate one BGP against one graph, consulting the semantic cache.
///
/// Cache read and write are both disabled while the query carries
/// LIMIT/OFFSET: a cached result must be the complete result set.
pub(crate) fn eval_bgp_cached(
    graph: Arc<dyn Graph>,
    patterns: Vec<TriplePattern>,
    ctx: &Arc<ExecutionContext>,
) -> SolutionStream {
    let plain = || -> SolutionStream {
        graph
            .eval_bgp(&patterns)
            .map(|item| item.map_err(QueryError::from))
            .boxed()
    };
    let cache = match (&ctx.cache, ctx.has_limit_offset) {
        (Some(cache), false) => cache.clone(),
        _ => return plain(),
    };
    let key = BgpKey::new(&patterns, graph.iri());

    // A committed or in-flight entry answers the whole BGP.
    if let Some(entry) = cache.get(&key) {
        let graph = graph.clone();
        let patterns = patterns.clone();
        return pipeline::from_async(async move {
            match entry.await {
                Some(rows) => Ok(pipeline::from_iter(rows.as_ref().clone())),
                // Staging was discarded; fall back to local evaluation.
                None => Ok(graph
                    .eval_bgp(&patterns)
                    .map(|item| item.map_err(QueryError::from))
                    .boxed()),
            }
        });
    }

    // A committed subset answers part of it; join the cached mappings
    // with the missing patterns.
    let (subset, missing) = cache.find_subset(&key);
    if !subset.is_empty() {
        debug!(
            cached = subset.len(),
            missing = missing.len(),
            "BGP answered from cache subset"
        );
        let subset_key = BgpKey::new(&subset, graph.iri());
        let entry = cache.get(&subset_key);
        let graph_for_missing = graph.clone();
        let fallback_graph = graph.clone();
        let fallback_patterns = patterns.clone();
        return pipeline::from_async(async move {
            let Some(entry) = entry else {
                return Ok(fallback_graph
                    .eval_bgp(&fallback_patterns)
                    .map(|item| item.map_err(QueryError::from))
                    .boxed());
            };
            match entry.await {
                None => Ok(fallback_graph
                    .eval_bgp(&fallback_patterns)
                    .map(|item| item.map_err(QueryError::from))
                    .boxed()),
                Some(rows) => {
                    let cached = pipeline::from_iter(rows.as_ref().clone());
                    if missing.is_empty() {
                        return Ok(cached);
                    }
                    Ok(pipeline::flat_map(cached, move |row| {
                        let bound: Vec<TriplePattern> =
                            missing.iter().map(|p| row.bound(p)).collect();
                        let rest = graph_for_missing
                            .eval_bgp(&bound)
                            .map(|item| item.map_err(QueryError::from))
                            .boxed();
                        let row = row.clone();
                        pipeline::map(rest, move |found| row.union(&found))
                    }))
                }
            }
        });
    }

    // Cold key: evaluate locally, staging every mapping; commit at
    // exhaustion, abort on error or cancellation.
    CacheWriteStream::new(plain(), cache, key).boxed()
}

/// Join full-text matches into the solution stream, binding relevance
/// and rank variables when requested.
fn full_text_join(
    source: SolutionStream,
    graph: Arc<dyn Graph>,
    search: FullTextQuery,
) -> SolutionStream {
    let search = Arc::new(search);
    pipeline::flat_map(source, move |mu| {
        let bound = mu.bound(&search.pattern);
        let graph = graph.clone();
        let search = search.clone();
        let input = mu.clone();
        pipeline::from_async(async move {
            let hits = graph
                .full_text_search(&bound, &search.variable, &search.keywords, &search.options)
                .await?;
            let stream = hits
                .filter_map(move |item| {
                    let out = match item {
                        Err(e) => Some(Err(QueryError::from(e))),
                        Ok(hit) => match_pattern(&bound, &hit.triple).map(|extracted| {
                            let mut merged = input.union(&extracted);
                            if let (Some(variable), Some(score)) =
                                (&search.score_variable, hit.score)
                            {
                                merged.insert(
                                    variable.clone(),
                                    Term::typed_literal(score.to_string(), xsd::FLOAT),
                                );
                            }
                            if let (Some(variable), Some(rank)) =
                                (&search.rank_variable, hit.rank)
                            {
                                merged.insert(variable.clone(), Term::integer(rank as i64));
                            }
                            Ok(merged)
                        }),
                    };
                    futures::future::ready(out)
                })
                .boxed();
            Ok(stream)
        })
    })
}

/// Resolve a variable graph selection per input mapping.
///
/// A mapping binding the variable to an IRI targets that named graph
/// (created through the dataset factory when auto-creation permits);
/// an unbound variable iterates the visible named graphs, binding it.
fn eval_variable_graph(
    name: Arc<str>,
    source: SolutionStream,
    plain: Vec<TriplePattern>,
    paths: Vec<TriplePattern>,
    searches: Vec<FullTextQuery>,
    ctx: Arc<ExecutionContext>,
) -> SolutionStream {
    pipeline::flat_map(source, move |mu| {
        let eval_in = |iri: Arc<str>, seed: Bindings| -> SolutionStream {
            match ctx.dataset().graph_or_create(&iri) {
                Err(e) => pipeline::once_err(e.into()),
                Ok(graph) => eval_over_graph(
                    graph,
                    pipeline::of(seed),
                    plain.clone(),
                    paths.clone(),
                    searches.clone(),
                    &ctx,
                ),
            }
        };
        match mu.get(&name) {
            Some(Term::Iri(iri)) => eval_in(iri.clone(), mu.clone()),
            Some(other) => pipeline::once_err(QueryError::InvalidQuery(format!(
                "graph variable ?{name} is bound to {other}"
            ))),
            None => {
                let branches = ctx
                    .visible_named_graphs()
                    .into_iter()
                    .map(|iri| {
                        let mut seed = mu.clone();
                        seed.insert(name.clone(), Term::Iri(iri.clone()));
                        eval_in(iri, seed)
                    })
                    .collect();
                pipeline::merge(branches)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_nodes_become_reserved_variables() {
        let triples = vec![TriplePattern::new(
            Term::blank("b0"),
            Term::iri("urn:p"),
            Term::var("o"),
        )];
        let (renamed, synthetic) = rename_blank_nodes(triples);
        assert_eq!(synthetic.len(), 1);
        match &renamed[0].subject {
            Term::Variable(name) => assert!(name.starts_with(BLANK_VAR_PREFIX)),
            other => panic!("expected a variable, got {other}"),
        }
    }
}
