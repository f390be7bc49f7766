//! RDF datasets: a default graph plus named graphs.
//!
//! `Dataset` is the handle the engine binds to. Named graphs can be
//! added up front with the `with_*` builders, or created at runtime by
//! updates (and, when explicitly enabled, by queries that resolve a
//! variable FROM graph) through a user-supplied factory.

use crate::error::{GraphError, GraphResult};
use crate::graph::{nested_loop, BindingStream, Capabilities, Graph, TripleStream};
use crate::triple::{Triple, TriplePattern};
use async_trait::async_trait;
use futures::StreamExt;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// Creates a graph for a previously unknown IRI.
pub type GraphFactory = Arc<dyn Fn(Arc<str>) -> Arc<dyn Graph> + Send + Sync>;

/// A collection of graphs addressed by IRI.
pub struct Dataset {
    default_graph: Arc<dyn Graph>,
    named: RwLock<FxHashMap<Arc<str>, Arc<dyn Graph>>>,
    factory: Option<GraphFactory>,
    auto_create: bool,
}

impl Dataset {
    pub fn new(default_graph: Arc<dyn Graph>) -> Self {
        Self {
            default_graph,
            named: RwLock::new(FxHashMap::default()),
            factory: None,
            auto_create: false,
        }
    }

    /// Register a named graph.
    pub fn with_named_graph(self, iri: impl AsRef<str>, graph: Arc<dyn Graph>) -> Self {
        self.named
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(Arc::from(iri.as_ref()), graph);
        self
    }

    /// Install a factory used to create graphs on demand.
    pub fn with_factory(mut self, factory: GraphFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Allow queries resolving a variable FROM graph to create the
    /// graph when it is missing. Off by default: silent graph creation
    /// during SELECT pollutes the dataset.
    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn default_graph(&self) -> Arc<dyn Graph> {
        self.default_graph.clone()
    }

    pub fn named_graph(&self, iri: &str) -> Option<Arc<dyn Graph>> {
        self.named
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(iri)
            .cloned()
    }

    pub fn has_named_graph(&self, iri: &str) -> bool {
        self.named
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(iri)
    }

    /// All named graph IRIs.
    pub fn named_graph_iris(&self) -> Vec<Arc<str>> {
        self.named
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Resolve a graph: `None` → default graph; otherwise the named
    /// graph, failing when absent.
    pub fn graph(&self, iri: Option<&str>) -> GraphResult<Arc<dyn Graph>> {
        match iri {
            None => Ok(self.default_graph()),
            Some(name) => self
                .named_graph(name)
                .ok_or_else(|| GraphError::UnknownGraph(Arc::from(name))),
        }
    }

    /// Resolve a named graph, creating it through the factory when
    /// auto-creation is on.
    pub fn graph_or_create(&self, iri: &str) -> GraphResult<Arc<dyn Graph>> {
        if let Some(graph) = self.named_graph(iri) {
            return Ok(graph);
        }
        if self.auto_create {
            return self.create_graph(iri);
        }
        Err(GraphError::UnknownGraph(Arc::from(iri)))
    }

    /// Create a named graph through the factory. Fails when the graph
    /// already exists or no factory is installed.
    pub fn create_graph(&self, iri: &str) -> GraphResult<Arc<dyn Graph>> {
        let factory = self
            .factory
            .as_ref()
            .ok_or(GraphError::Unsupported("graph creation (no factory)"))?;
        let mut named = self.named.write().unwrap_or_else(|e| e.into_inner());
        if named.contains_key(iri) {
            return Err(GraphError::Backend(format!("graph <{iri}> already exists")));
        }
        let key: Arc<str> = Arc::from(iri);
        let graph = factory(key.clone());
        named.insert(key, graph.clone());
        Ok(graph)
    }

    /// Remove a named graph; `false` when it was not present.
    pub fn drop_graph(&self, iri: &str) -> bool {
        self.named
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(iri)
            .is_some()
    }

    /// A read-only union over the given named graphs (FROM with
    /// several sources). Default-graph members use `None`.
    pub fn union_graph(&self, iris: &[Option<Arc<str>>]) -> GraphResult<Arc<dyn Graph>> {
        let mut members = Vec::with_capacity(iris.len());
        for iri in iris {
            members.push(self.graph(iri.as_deref())?);
        }
        Ok(Arc::new(UnionGraph::new(members)))
    }
}

/// Read-only virtual graph merging several member graphs.
#[derive(Clone)]
pub struct UnionGraph {
    iri: Arc<str>,
    members: Vec<Arc<dyn Graph>>,
}

impl UnionGraph {
    pub fn new(members: Vec<Arc<dyn Graph>>) -> Self {
        Self {
            iri: Arc::from("urn:x-rivulet:union"),
            members,
        }
    }
}

#[async_trait]
impl Graph for UnionGraph {
    fn iri(&self) -> Arc<str> {
        self.iri.clone()
    }

    fn capabilities(&self) -> Capabilities {
        // Conservative: members may disagree on bulk support.
        Capabilities::empty()
    }

    async fn find(&self, pattern: &TriplePattern) -> GraphResult<TripleStream> {
        let mut streams = Vec::with_capacity(self.members.len());
        for member in &self.members {
            streams.push(member.find(pattern).await?);
        }
        if streams.is_empty() {
            return Ok(futures::stream::empty().boxed());
        }
        Ok(futures::stream::select_all(streams).boxed())
    }

    async fn insert(&self, _triple: Triple) -> GraphResult<()> {
        Err(GraphError::ReadOnly)
    }

    async fn delete(&self, _triple: Triple) -> GraphResult<()> {
        Err(GraphError::ReadOnly)
    }

    async fn clear(&self) -> GraphResult<()> {
        Err(GraphError::ReadOnly)
    }

    async fn estimate_cardinality(&self, pattern: &TriplePattern) -> GraphResult<usize> {
        let mut total = 0usize;
        for member in &self.members {
            total = total.saturating_add(member.estimate_cardinality(pattern).await?);
        }
        Ok(total)
    }

    fn eval_bgp(&self, bgp: &[TriplePattern]) -> BindingStream {
        nested_loop::eval_bgp(self.clone(), bgp.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;
    use futures::stream;

    #[derive(Clone)]
    struct StaticGraph {
        iri: Arc<str>,
        triples: Arc<Vec<Triple>>,
    }

    #[async_trait]
    impl Graph for StaticGraph {
        fn iri(&self) -> Arc<str> {
            self.iri.clone()
        }

        async fn find(&self, pattern: &TriplePattern) -> GraphResult<TripleStream> {
            let pattern = pattern.clone();
            let matches: Vec<_> = self
                .triples
                .iter()
                .filter(|t| pattern.matches(t))
                .cloned()
                .map(Ok)
                .collect();
            Ok(stream::iter(matches).boxed())
        }

        async fn insert(&self, _triple: Triple) -> GraphResult<()> {
            Err(GraphError::ReadOnly)
        }

        async fn delete(&self, _triple: Triple) -> GraphResult<()> {
            Err(GraphError::ReadOnly)
        }

        async fn clear(&self) -> GraphResult<()> {
            Err(GraphError::ReadOnly)
        }

        async fn estimate_cardinality(&self, _pattern: &TriplePattern) -> GraphResult<usize> {
            Ok(self.triples.len())
        }

        fn eval_bgp(&self, bgp: &[TriplePattern]) -> BindingStream {
            nested_loop::eval_bgp(self.clone(), bgp.to_vec())
        }
    }

    fn graph_of(iri: &str, triples: Vec<Triple>) -> Arc<dyn Graph> {
        Arc::new(StaticGraph {
            iri: Arc::from(iri),
            triples: Arc::new(triples),
        })
    }

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), Term::iri(o))
    }

    #[tokio::test]
    async fn test_nested_loop_joins_two_patterns() {
        let graph = graph_of(
            "urn:g",
            vec![
                triple("urn:a", "urn:knows", "urn:b"),
                triple("urn:b", "urn:knows", "urn:c"),
            ],
        );
        let bgp = vec![
            TriplePattern::new(Term::var("x"), Term::iri("urn:knows"), Term::var("y")),
            TriplePattern::new(Term::var("y"), Term::iri("urn:knows"), Term::var("z")),
        ];
        let results: Vec<_> = graph
            .eval_bgp(&bgp)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<GraphResult<Vec<_>>>()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("x"), Some(&Term::iri("urn:a")));
        assert_eq!(results[0].get("z"), Some(&Term::iri("urn:c")));
    }

    #[tokio::test]
    async fn test_union_graph_merges_members() {
        let dataset = Dataset::new(graph_of("urn:d", vec![triple("urn:a", "urn:p", "urn:b")]))
            .with_named_graph("urn:g1", graph_of("urn:g1", vec![triple("urn:c", "urn:p", "urn:d")]));
        let union = dataset
            .union_graph(&[None, Some(Arc::from("urn:g1"))])
            .unwrap();
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:p"), Term::var("o"));
        let found: Vec<_> = union.find(&pattern).await.unwrap().collect().await;
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_unknown_graph_is_an_error() {
        let dataset = Dataset::new(graph_of("urn:d", vec![]));
        assert!(matches!(
            dataset.graph(Some("urn:missing")),
            Err(GraphError::UnknownGraph(_))
        ));
    }
}
