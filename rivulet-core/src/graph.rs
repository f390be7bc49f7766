//! The contract between the engine and dataset backends.
//!
//! A [`Graph`] resolves triple patterns ([`Graph::find`]) and evaluates
//! whole BGPs ([`Graph::eval_bgp`]); backends advertise optional bulk
//! operations through [`Capabilities`]. The [`nested_loop`] module
//! carries the reference BGP evaluation (iterate the leftmost pattern,
//! substitute, recurse) that typical backends delegate to.

use crate::bindings::Bindings;
use crate::error::{GraphError, GraphResult};
use crate::term::Term;
use crate::triple::{Predicate, Triple, TriplePattern};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::ops::BitOr;
use std::sync::Arc;

/// Lazy sequence of triples from a backend.
pub type TripleStream = BoxStream<'static, GraphResult<Triple>>;

/// Lazy sequence of solution mappings from a backend.
pub type BindingStream = BoxStream<'static, GraphResult<Bindings>>;

/// One full-text search hit.
#[derive(Debug, Clone)]
pub struct FullTextMatch {
    /// The matched triple
    pub triple: Triple,
    /// Relevance score, if the backend scores matches
    pub score: Option<f64>,
    /// 0-based rank in relevance order, if the backend ranks matches
    pub rank: Option<usize>,
}

/// Lazy sequence of full-text hits.
pub type FullTextStream = BoxStream<'static, GraphResult<FullTextMatch>>;

/// Bounds passed to [`Graph::full_text_search`].
#[derive(Debug, Clone, Default)]
pub struct FullTextOptions {
    /// Require every keyword to match
    pub match_all: bool,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub min_rank: Option<usize>,
    pub max_rank: Option<usize>,
}

/// Bitset of optional backend capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    /// Bulk union evaluation (`eval_union`); enables the bound-join
    /// strategy.
    pub const UNION: Capabilities = Capabilities(1 << 0);
    /// `full_text_search` is implemented.
    pub const FULL_TEXT_SEARCH: Capabilities = Capabilities(1 << 1);
    /// `estimate_cardinality` returns meaningful numbers.
    pub const ESTIMATE: Capabilities = Capabilities(1 << 2);

    pub const fn empty() -> Self {
        Capabilities(0)
    }

    pub const fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// A queryable RDF graph backend.
///
/// Backends hand out `'static` streams, so implementations keep their
/// state behind cheaply clonable handles (`Arc` internally). The
/// engine itself holds graphs as `Arc<dyn Graph>`; the blanket impl
/// below makes that handle a `Graph` again.
#[async_trait]
pub trait Graph: Send + Sync + 'static {
    /// IRI this graph is registered under.
    fn iri(&self) -> Arc<str>;

    /// Optional-operation bits.
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Resolve a triple pattern; variables act as wildcards.
    async fn find(&self, pattern: &TriplePattern) -> GraphResult<TripleStream>;

    async fn insert(&self, triple: Triple) -> GraphResult<()>;

    async fn delete(&self, triple: Triple) -> GraphResult<()>;

    /// Remove every triple.
    async fn clear(&self) -> GraphResult<()>;

    /// Estimated number of triples matching the pattern.
    async fn estimate_cardinality(&self, pattern: &TriplePattern) -> GraphResult<usize>;

    /// Evaluate a BGP against this graph.
    ///
    /// Implementations normally delegate to [`nested_loop::eval_bgp`];
    /// backends with native join support override with something
    /// better. Input variable identity must be preserved in results.
    fn eval_bgp(&self, bgp: &[TriplePattern]) -> BindingStream;

    /// Evaluate a union of BGPs in one dispatch.
    ///
    /// The default interleaves `eval_bgp` per member; backends
    /// advertising [`Capabilities::UNION`] are expected to answer this
    /// in bulk.
    fn eval_union(&self, bgps: Vec<Vec<TriplePattern>>) -> BindingStream {
        let streams: Vec<BindingStream> = bgps.iter().map(|bgp| self.eval_bgp(bgp)).collect();
        if streams.is_empty() {
            return futures::stream::empty().boxed();
        }
        futures::stream::select_all(streams).boxed()
    }

    /// Keyword search over the literals matched by `pattern`'s
    /// `variable` position.
    async fn full_text_search(
        &self,
        _pattern: &TriplePattern,
        _variable: &str,
        _keywords: &[String],
        _options: &FullTextOptions,
    ) -> GraphResult<FullTextStream> {
        Err(GraphError::Unsupported("full-text search"))
    }
}

#[async_trait]
impl<G: Graph + ?Sized> Graph for Arc<G> {
    fn iri(&self) -> Arc<str> {
        (**self).iri()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    async fn find(&self, pattern: &TriplePattern) -> GraphResult<TripleStream> {
        (**self).find(pattern).await
    }

    async fn insert(&self, triple: Triple) -> GraphResult<()> {
        (**self).insert(triple).await
    }

    async fn delete(&self, triple: Triple) -> GraphResult<()> {
        (**self).delete(triple).await
    }

    async fn clear(&self) -> GraphResult<()> {
        (**self).clear().await
    }

    async fn estimate_cardinality(&self, pattern: &TriplePattern) -> GraphResult<usize> {
        (**self).estimate_cardinality(pattern).await
    }

    fn eval_bgp(&self, bgp: &[TriplePattern]) -> BindingStream {
        (**self).eval_bgp(bgp)
    }

    fn eval_union(&self, bgps: Vec<Vec<TriplePattern>>) -> BindingStream {
        (**self).eval_union(bgps)
    }

    async fn full_text_search(
        &self,
        pattern: &TriplePattern,
        variable: &str,
        keywords: &[String],
        options: &FullTextOptions,
    ) -> GraphResult<FullTextStream> {
        (**self)
            .full_text_search(pattern, variable, keywords, options)
            .await
    }
}

/// Extract the bindings a triple induces under a pattern.
///
/// `None` when the triple does not match, or when a variable repeated
/// within the pattern would receive two different terms.
pub fn match_pattern(pattern: &TriplePattern, triple: &Triple) -> Option<Bindings> {
    let predicate = match &pattern.predicate {
        Predicate::Term(t) => t,
        Predicate::Path(_) => return None,
    };
    let mut mu = Bindings::new();
    for (pattern_term, data_term) in [
        (&pattern.subject, &triple.subject),
        (predicate, &triple.predicate),
        (&pattern.object, &triple.object),
    ] {
        match pattern_term {
            Term::Variable(name) => match mu.get(name) {
                Some(existing) if existing != data_term => return None,
                Some(_) => {}
                None => mu.insert(name.clone(), data_term.clone()),
            },
            other if other == data_term => {}
            _ => return None,
        }
    }
    Some(mu)
}

/// Reference BGP evaluation by index-nested-loop recursion.
pub mod nested_loop {
    use super::*;
    use futures::future;

    /// Evaluate `patterns` against `graph`: iterate the leftmost
    /// pattern via `find`, substitute each match into the rest,
    /// recurse. An empty BGP yields the single empty mapping.
    pub fn eval_bgp<G>(graph: G, patterns: Vec<TriplePattern>) -> BindingStream
    where
        G: Graph + Clone,
    {
        step(graph, Arc::from(patterns.into_boxed_slice()), 0, Bindings::new())
    }

    fn step<G>(
        graph: G,
        patterns: Arc<[TriplePattern]>,
        index: usize,
        seed: Bindings,
    ) -> BindingStream
    where
        G: Graph + Clone,
    {
        if index == patterns.len() {
            return futures::stream::once(future::ready(Ok(seed))).boxed();
        }
        let bound = seed.bound(&patterns[index]);
        let finder = graph.clone();
        let find_pattern = bound.clone();
        futures::stream::once(async move { finder.find(&find_pattern).await })
            .flat_map(|found| match found {
                Ok(triples) => triples,
                Err(e) => futures::stream::once(future::ready(Err(e))).boxed(),
            })
            .flat_map(move |item| match item {
                Ok(triple) => match match_pattern(&bound, &triple) {
                    Some(mu) => step(graph.clone(), patterns.clone(), index + 1, seed.union(&mu)),
                    None => futures::stream::empty().boxed(),
                },
                Err(e) => futures::stream::once(future::ready(Err(e))).boxed(),
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_bitset() {
        let caps = Capabilities::UNION | Capabilities::ESTIMATE;
        assert!(caps.contains(Capabilities::UNION));
        assert!(caps.contains(Capabilities::ESTIMATE));
        assert!(!caps.contains(Capabilities::FULL_TEXT_SEARCH));
    }

    #[test]
    fn test_match_pattern_repeated_variable() {
        let pattern = TriplePattern::new(Term::var("x"), Term::iri("http://ex.org/p"), Term::var("x"));
        let reflexive = Triple::new(
            Term::iri("http://ex.org/a"),
            Term::iri("http://ex.org/p"),
            Term::iri("http://ex.org/a"),
        );
        assert!(match_pattern(&pattern, &reflexive).is_some());

        let asymmetric = Triple::new(
            Term::iri("http://ex.org/a"),
            Term::iri("http://ex.org/p"),
            Term::iri("http://ex.org/b"),
        );
        assert!(match_pattern(&pattern, &asymmetric).is_none());
    }
}
