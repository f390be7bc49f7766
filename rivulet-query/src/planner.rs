//! The plan builder.
//!
//! Walks a parsed query top-down and assembles the stage pipeline:
//! DESCRIBE rewrites into CONSTRUCT, FROM clauses scope the context,
//! WHERE groups are ordered (constant-selective producers first,
//! FILTER late), consecutive BGPs merge, VALUES clauses rewrite the
//! body per row, and the solution modifiers wrap the final stage.
//!
//! Stage builders are registered per pattern kind and replaceable; the
//! same builder instance is long-lived and bound to one dataset.

use crate::bgp::BgpStageBuilder;
use crate::bind::{bind_stream, BindStageBuilder};
use crate::cache::BgpCache;
use crate::construct::{ask, construct_stream};
use crate::context::{ExecutionContext, GraphSelection};
use crate::distinct::distinct;
use crate::error::{QueryError, Result};
use crate::eval::{self, CustomAggregate, CustomFunction, FunctionRegistry};
use crate::filter::FilterStageBuilder;
use crate::graph::GraphStageBuilder;
use crate::minus::MinusStageBuilder;
use crate::optional::OptionalStageBuilder;
use crate::options::EngineOptions;
use crate::pipeline::{self, SolutionStream};
use crate::results::QueryResults;
use crate::service::{ServiceClient, ServiceStageBuilder};
use crate::sort::{self, Comparator};
use crate::stage::StageBuilder;
use crate::union::UnionStageBuilder;
use crate::update::{GraphLoader, UpdatePlan};
use crate::values::ValuesStageBuilder;
use crate::aggregate::{group_by, GroupKey};
use futures::{FutureExt, StreamExt};
use rivulet_core::{
    parse, Bindings, Dataset, Expression, Pattern, PatternKind, Projection, Query, QueryType,
    Term, TriplePattern, UpdateRequest,
};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Pre-build query rewriter installed with [`PlanBuilder::set_optimizer`].
pub type Optimizer = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// External SPARQL text parser hook.
pub type QueryParser = Arc<dyn Fn(&str) -> Result<Query> + Send + Sync>;

/// A built plan: query results or a consumable update.
pub enum Plan {
    Query(QueryResults),
    Update(UpdatePlan),
}

struct Inner {
    dataset: Arc<Dataset>,
    stages: RwLock<FxHashMap<PatternKind, Arc<dyn StageBuilder>>>,
    cache: RwLock<Option<Arc<BgpCache>>>,
    functions: RwLock<FunctionRegistry>,
    service_client: RwLock<Option<Arc<dyn ServiceClient>>>,
    parser: RwLock<Option<QueryParser>>,
    optimizer: RwLock<Option<Optimizer>>,
    loader: RwLock<Option<GraphLoader>>,
    options: RwLock<EngineOptions>,
}

/// Long-lived query compiler bound to one dataset.
#[derive(Clone)]
pub struct PlanBuilder {
    inner: Arc<Inner>,
}

impl PlanBuilder {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let builder = Self {
            inner: Arc::new(Inner {
                dataset,
                stages: RwLock::new(FxHashMap::default()),
                cache: RwLock::new(None),
                functions: RwLock::new(FunctionRegistry::default()),
                service_client: RwLock::new(None),
                parser: RwLock::new(None),
                optimizer: RwLock::new(None),
                loader: RwLock::new(None),
                options: RwLock::new(EngineOptions::default()),
            }),
        };
        builder.register_stage(PatternKind::Bgp, Arc::new(BgpStageBuilder));
        builder.register_stage(PatternKind::Group, Arc::new(GroupStageBuilder));
        builder.register_stage(PatternKind::Optional, Arc::new(OptionalStageBuilder));
        builder.register_stage(PatternKind::Union, Arc::new(UnionStageBuilder));
        builder.register_stage(PatternKind::Minus, Arc::new(MinusStageBuilder));
        builder.register_stage(PatternKind::Graph, Arc::new(GraphStageBuilder));
        builder.register_stage(PatternKind::Service, Arc::new(ServiceStageBuilder));
        builder.register_stage(PatternKind::Filter, Arc::new(FilterStageBuilder));
        builder.register_stage(PatternKind::Bind, Arc::new(BindStageBuilder));
        builder.register_stage(PatternKind::Values, Arc::new(ValuesStageBuilder));
        builder
    }

    /// Replace (or add) the stage builder for one pattern kind.
    pub fn register_stage(&self, kind: PatternKind, stage: Arc<dyn StageBuilder>) {
        self.inner
            .stages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, stage);
    }

    /// Install a pre-build query rewriter.
    pub fn set_optimizer(&self, optimizer: Optimizer) {
        *self
            .inner
            .optimizer
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(optimizer);
    }

    /// Enable BGP caching with the default LRU parameters.
    pub fn use_cache(&self) {
        let options = self.options();
        self.use_cache_with(Arc::new(BgpCache::new(
            options.cache_max_entries,
            options.cache_max_age,
        )));
    }

    /// Enable BGP caching with a caller-supplied cache (shared across
    /// builders if desired).
    pub fn use_cache_with(&self, cache: Arc<BgpCache>) {
        *self.inner.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(cache);
    }

    pub fn disable_cache(&self) {
        *self.inner.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// The active cache, if caching is enabled.
    pub fn cache(&self) -> Option<Arc<BgpCache>> {
        self.inner
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn register_function(&self, iri: impl AsRef<str>, function: CustomFunction) {
        self.inner
            .functions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register_function(iri, function);
    }

    pub fn register_aggregate(&self, iri: impl AsRef<str>, aggregate: CustomAggregate) {
        self.inner
            .functions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register_aggregate(iri, aggregate);
    }

    pub fn set_service_client(&self, client: Arc<dyn ServiceClient>) {
        *self
            .inner
            .service_client
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(client);
    }

    pub fn set_parser(&self, parser: QueryParser) {
        *self.inner.parser.write().unwrap_or_else(|e| e.into_inner()) = Some(parser);
    }

    /// Install the HTTP + parse hook backing `LOAD`.
    pub fn set_loader(&self, loader: GraphLoader) {
        *self.inner.loader.write().unwrap_or_else(|e| e.into_inner()) = Some(loader);
    }

    pub fn set_options(&self, options: EngineOptions) {
        *self.inner.options.write().unwrap_or_else(|e| e.into_inner()) = options;
    }

    pub fn options(&self) -> EngineOptions {
        self.inner
            .options
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Snapshot of the function registry (stages compile against it).
    pub fn functions(&self) -> FunctionRegistry {
        self.inner
            .functions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn service_client(&self) -> Option<Arc<dyn ServiceClient>> {
        self.inner
            .service_client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn loader(&self) -> Option<GraphLoader> {
        self.inner
            .loader
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.inner.dataset
    }

    /// Build a plan from SPARQL text through the injected parser.
    pub fn build_text(&self, text: &str) -> Result<QueryResults> {
        let parser = self
            .inner
            .parser
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| QueryError::Parse("no SPARQL parser installed".into()))?;
        let query = parser(text)?;
        self.build(&query)
    }

    /// Build a plan from the JSON-shaped algebra tree.
    pub fn build_json(&self, tree: &Value) -> Result<Plan> {
        match tree.get("type").and_then(Value::as_str) {
            Some("query") => Ok(Plan::Query(self.build(&parse::parse_query(tree)?)?)),
            Some("update") => Ok(Plan::Update(
                self.build_update(&parse::parse_update(tree)?)?,
            )),
            other => Err(QueryError::Parse(format!(
                "expected a query or update node, got {other:?}"
            ))),
        }
    }

    /// Compile one query into its result stream.
    pub fn build(&self, query: &Query) -> Result<QueryResults> {
        let query = match self
            .inner
            .optimizer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            Some(optimizer) => optimizer(query.clone()),
            None => query.clone(),
        };
        let query = match query.query_type {
            QueryType::Describe => rewrite_describe(&query),
            _ => query,
        };
        debug!(query_type = ?query.query_type, patterns = query.where_clause.len(), "building query plan");

        let mut ctx = ExecutionContext::new(self.inner.dataset.clone(), self.options());
        ctx.has_limit_offset = query.has_limit_or_offset();
        ctx.cache = self.cache();
        ctx.prefixes = query.prefixes.clone();
        if let Some(from) = &query.from {
            if !from.default.is_empty() {
                ctx.default_graphs = GraphSelection::Iris(from.default.clone());
            }
            ctx.named_graphs = from.named.clone();
        }
        let ctx = Arc::new(ctx);

        let mut body = self.build_group(
            pipeline::of(Bindings::new()),
            &query.where_clause,
            ctx.clone(),
        )?;

        // Grouping and expression projections.
        let registry = self.functions();
        let (plain_vars, expression_vars) = partition_projection(&query.variables);
        let needs_grouping = !query.group.is_empty()
            || !query.having.is_empty()
            || query.variables.iter().any(|p| match p {
                Projection::Expression { expression, .. } => {
                    uses_aggregate(expression, &registry)
                }
                _ => false,
            });
        if needs_grouping {
            let mut keys = Vec::with_capacity(query.group.len());
            for condition in &query.group {
                let bind_as = condition.variable.clone().or_else(|| {
                    match &condition.expression {
                        Expression::Term(Term::Variable(name)) => Some(name.clone()),
                        _ => None,
                    }
                });
                keys.push(GroupKey {
                    compiled: eval::compile(&condition.expression, &registry)?,
                    bind_as,
                });
            }
            let having = query
                .having
                .iter()
                .map(|h| eval::compile(h, &registry))
                .collect::<Result<Vec<_>>>()?;
            body = group_by(body, keys, having);
        }
        for (variable, expression) in &expression_vars {
            body = bind_stream(body, variable.clone(), eval::compile(expression, &registry)?);
        }

        // ORDER BY (stable sort).
        if !query.order.is_empty() {
            let comparators = query
                .order
                .iter()
                .map(|order| {
                    eval::compile(&order.expression, &registry)
                        .map(|compiled| sort::comparator(compiled, order.descending))
                })
                .collect::<Result<Vec<Comparator>>>()?;
            body = sort::order_by(body, comparators);
        }

        // Query-type modifier, DISTINCT, OFFSET, LIMIT.
        match query.query_type {
            QueryType::Select => {
                let wildcard = query.variables.iter().any(|p| matches!(p, Projection::Wildcard))
                    || query.variables.is_empty();
                if !wildcard {
                    let mut keep: Vec<Arc<str>> = plain_vars;
                    keep.extend(expression_vars.iter().map(|(v, _)| v.clone()));
                    body = pipeline::map(body, move |mu| mu.project(&keep));
                }
                if query.distinct || query.reduced {
                    body = distinct(body);
                }
                if let Some(offset) = query.offset {
                    body = pipeline::skip(body, offset);
                }
                if let Some(limit) = query.limit {
                    body = pipeline::limit(body, limit);
                }
                Ok(QueryResults::Bindings(body))
            }
            QueryType::Ask => Ok(QueryResults::Boolean(ask(body).boxed())),
            QueryType::Construct | QueryType::Describe => {
                let mut triples = construct_stream(body, query.template.clone());
                if query.distinct || query.reduced {
                    let mut seen = std::collections::HashSet::new();
                    triples = triples
                        .filter(move |item| {
                            futures::future::ready(match item {
                                Ok(triple) => seen.insert(triple.to_string()),
                                Err(_) => true,
                            })
                        })
                        .boxed();
                }
                if let Some(offset) = query.offset {
                    triples = triples.skip(offset).boxed();
                }
                if let Some(limit) = query.limit {
                    triples = triples.take(limit).boxed();
                }
                Ok(QueryResults::Triples(triples))
            }
        }
    }

    /// Dispatch a single pattern to its registered stage.
    pub fn build_pattern(
        &self,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let stage = self
            .inner
            .stages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&pattern.kind())
            .cloned()
            .ok_or(QueryError::MissingStage(pattern.kind()))?;
        stage.execute(self, source, pattern, ctx)
    }

    /// Compile a pattern group: order, merge BGPs, rewrite VALUES,
    /// fold the stages over the source.
    pub fn build_group(
        &self,
        source: SolutionStream,
        patterns: &[Pattern],
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let ordered = order_patterns(patterns);
        let (values_rows, remaining) = split_values(&ordered);
        match values_rows {
            Some(rows) => self.build_values_rewrite(source, rows, remaining, ctx),
            None => self.fold_stages(source, &remaining, ctx),
        }
    }

    fn fold_stages(
        &self,
        source: SolutionStream,
        patterns: &[Pattern],
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let mut stream = source;
        for pattern in patterns {
            stream = self.build_pattern(stream, pattern, ctx.clone())?;
        }
        Ok(stream)
    }

    /// VALUES rewriting: for each row of the (combined) VALUES
    /// clauses, deep-substitute the row into the remaining patterns,
    /// evaluate the rewritten body, and extend results with the row.
    /// The row's bindings are authoritative: results disagreeing with
    /// the row are rejected.
    fn build_values_rewrite(
        &self,
        source: SolutionStream,
        rows: Vec<Bindings>,
        remaining: Vec<Pattern>,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let planner = self.clone();
        let rows = Arc::new(rows);
        let remaining = Arc::new(remaining);
        Ok(pipeline::flat_map(source, move |mu| {
            let branches: Vec<SolutionStream> = rows
                .iter()
                .map(|row| {
                    let rewritten: Vec<Pattern> =
                        remaining.iter().map(|p| p.substitute(row)).collect();
                    let seeded = match row.merge(&mu) {
                        Some(seed) => seed,
                        None => return pipeline::empty(),
                    };
                    match planner.fold_stages(pipeline::of(seeded), &rewritten, ctx.clone()) {
                        Err(e) => pipeline::once_err(e),
                        Ok(stream) => {
                            let row = row.clone();
                            pipeline::filter_map(stream, move |result| {
                                // VALUES binding wins; conflicts reject.
                                result.merge(&row)
                            })
                        }
                    }
                })
                .collect();
            pipeline::merge(branches)
        }))
    }

    /// Execute an update request (sequential, abort on first failure).
    pub fn build_update(&self, request: &UpdateRequest) -> Result<UpdatePlan> {
        Ok(UpdatePlan::new(self.clone(), request.updates.clone()))
    }
}

/// Stage builder for `group` nodes: recursive group compilation.
struct GroupStageBuilder;

impl StageBuilder for GroupStageBuilder {
    fn execute(
        &self,
        planner: &PlanBuilder,
        source: SolutionStream,
        pattern: &Pattern,
        ctx: Arc<ExecutionContext>,
    ) -> Result<SolutionStream> {
        let Pattern::Group { patterns } = pattern else {
            return Err(QueryError::UnsupportedPattern(format!(
                "group stage got a `{}` node",
                pattern.kind()
            )));
        };
        planner.build_group(source, patterns, ctx)
    }
}

/// Ordering weight: constant-selective producers first, FILTER late,
/// graph-with-variable last.
fn pattern_weight(pattern: &Pattern) -> u8 {
    match pattern {
        Pattern::Bgp { .. } => 0,
        Pattern::Graph { name: Term::Iri(_), .. } => 0,
        Pattern::Values { .. } => 3,
        Pattern::Filter { .. } => 4,
        Pattern::Graph { .. } => 5,
        _ => 1,
    }
}

/// Stable-sort by weight, then merge consecutive BGPs.
fn order_patterns(patterns: &[Pattern]) -> Vec<Pattern> {
    let mut ordered: Vec<Pattern> = patterns.to_vec();
    ordered.sort_by_key(pattern_weight);
    let mut merged: Vec<Pattern> = Vec::with_capacity(ordered.len());
    for pattern in ordered {
        match pattern {
            Pattern::Bgp { triples } => {
                if matches!(merged.last(), Some(Pattern::Bgp { .. })) {
                    if let Some(Pattern::Bgp { triples: existing }) = merged.last_mut() {
                        existing.extend(triples);
                    }
                } else {
                    merged.push(Pattern::Bgp { triples });
                }
            }
            other => merged.push(other),
        }
    }
    merged
}

/// Pull VALUES clauses out of an ordered group. Several clauses
/// combine by Cartesian product (incompatible row pairs drop).
fn split_values(patterns: &[Pattern]) -> (Option<Vec<Bindings>>, Vec<Pattern>) {
    let mut rows: Option<Vec<Bindings>> = None;
    let mut remaining = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match pattern {
            Pattern::Values { rows: clause } => {
                let clause_rows: Vec<Bindings> = clause
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|(var, term)| (var.clone(), term.clone()))
                            .collect()
                    })
                    .collect();
                rows = Some(match rows.take() {
                    None => clause_rows,
                    Some(existing) => existing
                        .iter()
                        .flat_map(|left| {
                            clause_rows
                                .iter()
                                .filter_map(move |right| left.merge(right))
                        })
                        .collect(),
                });
            }
            other => remaining.push(other.clone()),
        }
    }
    (rows, remaining)
}

/// Like [`Expression::has_aggregate`], but a function call resolving
/// to a registered custom aggregate also counts.
fn uses_aggregate(expression: &Expression, registry: &FunctionRegistry) -> bool {
    match expression {
        Expression::Aggregate { .. } => true,
        Expression::Term(_) | Expression::List(_) => false,
        Expression::Function { iri, args } => {
            registry.aggregate(iri).is_some() || args.iter().any(|a| uses_aggregate(a, registry))
        }
        Expression::Operation { args, .. } => args.iter().any(|a| uses_aggregate(a, registry)),
    }
}

fn partition_projection(
    projections: &[Projection],
) -> (Vec<Arc<str>>, Vec<(Arc<str>, Expression)>) {
    let mut plain = Vec::new();
    let mut expressions = Vec::new();
    for projection in projections {
        match projection {
            Projection::Wildcard => {}
            Projection::Variable(name) => plain.push(name.clone()),
            Projection::Expression {
                expression,
                variable,
            } => expressions.push((variable.clone(), expression.clone())),
        }
    }
    (plain, expressions)
}

/// DESCRIBE → CONSTRUCT rewrite: per described resource, one
/// `<resource> ?p ?o` pattern joins the WHERE clause and instantiates
/// the template.
fn rewrite_describe(query: &Query) -> Query {
    let mut rewritten = query.clone();
    rewritten.query_type = QueryType::Construct;
    rewritten.template = Vec::new();
    for (index, target) in query.describes.iter().enumerate() {
        let pattern = TriplePattern::new(
            target.clone(),
            Term::var(format!("__desc_p{index}")),
            Term::var(format!("__desc_o{index}")),
        );
        rewritten.template.push(pattern.clone());
        rewritten.where_clause.push(Pattern::Bgp {
            triples: vec![pattern],
        });
    }
    rewritten.describes.clear();
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgp(pred: &str) -> Pattern {
        Pattern::Bgp {
            triples: vec![TriplePattern::new(
                Term::var("s"),
                Term::iri(pred),
                Term::var("o"),
            )],
        }
    }

    #[test]
    fn test_pattern_ordering_weights() {
        let patterns = vec![
            Pattern::Filter {
                expression: Expression::variable("x"),
            },
            Pattern::Graph {
                name: Term::var("g"),
                patterns: vec![],
            },
            bgp("urn:p"),
            Pattern::Values { rows: vec![] },
            Pattern::Optional { patterns: vec![] },
        ];
        let ordered = order_patterns(&patterns);
        let weights: Vec<u8> = ordered.iter().map(pattern_weight).collect();
        assert_eq!(weights, vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn test_consecutive_bgps_merge() {
        let ordered = order_patterns(&[bgp("urn:p"), bgp("urn:q")]);
        assert_eq!(ordered.len(), 1);
        match &ordered[0] {
            Pattern::Bgp { triples } => assert_eq!(triples.len(), 2),
            other => panic!("unexpected pattern {other:?}"),
        }
    }

    #[test]
    fn test_describe_rewrite_adds_template_and_patterns() {
        let mut query = Query::new(QueryType::Describe);
        query.describes.push(Term::iri("urn:a"));
        let rewritten = rewrite_describe(&query);
        assert_eq!(rewritten.query_type, QueryType::Construct);
        assert_eq!(rewritten.template.len(), 1);
        assert_eq!(rewritten.where_clause.len(), 1);
    }

    #[test]
    fn test_split_values_cartesian_product() {
        let mut row_a = rivulet_core::ValuesRow::default();
        row_a.insert(Arc::from("x"), Term::integer(1));
        let mut row_b = rivulet_core::ValuesRow::default();
        row_b.insert(Arc::from("y"), Term::integer(2));
        let patterns = vec![
            Pattern::Values {
                rows: vec![row_a.clone()],
            },
            Pattern::Values {
                rows: vec![row_b.clone()],
            },
            bgp("urn:p"),
        ];
        let (rows, remaining) = split_values(&order_patterns(&patterns));
        let rows = rows.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(remaining.len(), 1);
    }
}
