//! # Rivulet Memory
//!
//! Reference in-memory backend for the Rivulet SPARQL engine: a
//! capability-complete [`rivulet_core::Graph`] over an
//! insertion-ordered triple set, plus a dataset constructor whose
//! factory creates graphs on demand.
//!
//! The backend is deliberately simple (linear scans, keyword
//! matching for full-text search): it exists so the engine can be
//! exercised without external infrastructure, and as a template for
//! real backends.

pub mod store;

use async_trait::async_trait;
use futures::StreamExt;
use rivulet_core::{
    nested_loop, BindingStream, Capabilities, Dataset, FullTextMatch, FullTextOptions,
    FullTextStream, Graph, GraphError, GraphResult, Term, Triple, TriplePattern, TripleStream,
};
use std::sync::{Arc, RwLock};
use store::TripleStore;

/// An in-memory graph.
///
/// Cloning is cheap and shares the underlying store; streams handed
/// out own snapshots, so they stay valid across mutation.
#[derive(Clone)]
pub struct MemoryGraph {
    iri: Arc<str>,
    store: Arc<RwLock<TripleStore>>,
    bulk_union: bool,
}

impl MemoryGraph {
    pub fn new(iri: impl AsRef<str>) -> Self {
        Self {
            iri: Arc::from(iri.as_ref()),
            store: Arc::new(RwLock::new(TripleStore::new())),
            bulk_union: false,
        }
    }

    /// Advertise [`Capabilities::UNION`], routing the engine onto the
    /// bound-join strategy.
    pub fn with_bulk_union(mut self) -> Self {
        self.bulk_union = true;
        self
    }

    /// Seed the graph with triples.
    pub fn with_triples(self, triples: impl IntoIterator<Item = Triple>) -> Self {
        {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            for triple in triples {
                store.insert(triple);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TripleStore> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Graph for MemoryGraph {
    fn iri(&self) -> Arc<str> {
        self.iri.clone()
    }

    fn capabilities(&self) -> Capabilities {
        let base = Capabilities::ESTIMATE | Capabilities::FULL_TEXT_SEARCH;
        if self.bulk_union {
            base | Capabilities::UNION
        } else {
            base
        }
    }

    async fn find(&self, pattern: &TriplePattern) -> GraphResult<TripleStream> {
        let matches = self.read().matching(pattern);
        Ok(futures::stream::iter(matches.into_iter().map(Ok)).boxed())
    }

    async fn insert(&self, triple: Triple) -> GraphResult<()> {
        self.store
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(triple);
        Ok(())
    }

    async fn delete(&self, triple: Triple) -> GraphResult<()> {
        self.store
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .delete(&triple);
        Ok(())
    }

    async fn clear(&self) -> GraphResult<()> {
        self.store.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    async fn estimate_cardinality(&self, pattern: &TriplePattern) -> GraphResult<usize> {
        Ok(self.read().matching(pattern).len())
    }

    fn eval_bgp(&self, bgp: &[TriplePattern]) -> BindingStream {
        nested_loop::eval_bgp(self.clone(), bgp.to_vec())
    }

    async fn full_text_search(
        &self,
        pattern: &TriplePattern,
        variable: &str,
        keywords: &[String],
        options: &FullTextOptions,
    ) -> GraphResult<FullTextStream> {
        if keywords.is_empty() {
            return Err(GraphError::Backend("empty keyword list".into()));
        }
        let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let mut scored: Vec<(f64, Triple)> = Vec::new();
        for triple in self.read().matching(pattern) {
            let Some(text) = searched_text(&triple, pattern, variable) else {
                continue;
            };
            let text = text.to_lowercase();
            let hits = lowered.iter().filter(|k| text.contains(*k)).count();
            if hits == 0 || (options.match_all && hits < lowered.len()) {
                continue;
            }
            scored.push((hits as f64 / lowered.len() as f64, triple));
        }
        scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let options = options.clone();
        let hits: Vec<GraphResult<FullTextMatch>> = scored
            .into_iter()
            .enumerate()
            .filter(move |(rank, (score, _))| {
                options.min_score.map_or(true, |min| *score >= min)
                    && options.max_score.map_or(true, |max| *score <= max)
                    && options.min_rank.map_or(true, |min| *rank >= min)
                    && options.max_rank.map_or(true, |max| *rank <= max)
            })
            .map(|(rank, (score, triple))| {
                Ok(FullTextMatch {
                    triple,
                    score: Some(score),
                    rank: Some(rank),
                })
            })
            .collect();
        Ok(futures::stream::iter(hits).boxed())
    }
}

/// The literal text at the searched variable's position.
fn searched_text<'a>(
    triple: &'a Triple,
    pattern: &TriplePattern,
    variable: &str,
) -> Option<&'a str> {
    let term = if pattern.subject == Term::var(variable) {
        &triple.subject
    } else if pattern.object == Term::var(variable) {
        &triple.object
    } else if pattern.predicate.as_term() == Some(&Term::var(variable)) {
        &triple.predicate
    } else {
        return None;
    };
    match term {
        Term::Literal(lit) => Some(&lit.value),
        _ => None,
    }
}

/// A dataset over memory graphs whose factory creates named graphs on
/// demand.
pub fn memory_dataset() -> Dataset {
    Dataset::new(Arc::new(MemoryGraph::new("urn:x-rivulet:default")))
        .with_factory(Arc::new(|iri: Arc<str>| {
            Arc::new(MemoryGraph::new(iri.as_ref())) as Arc<dyn Graph>
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: Term) -> Triple {
        Triple::new(Term::iri(s), Term::iri(p), o)
    }

    #[tokio::test]
    async fn test_find_with_wildcards() {
        let graph = MemoryGraph::new("urn:g").with_triples(vec![
            triple("urn:a", "urn:p", Term::integer(1)),
            triple("urn:b", "urn:q", Term::integer(2)),
        ]);
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:p"), Term::var("o"));
        let found: Vec<_> = graph.find(&pattern).await.unwrap().collect().await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_full_text_search_scores_and_ranks() {
        let graph = MemoryGraph::new("urn:g").with_triples(vec![
            triple("urn:a", "urn:title", Term::literal("neural networks for RDF")),
            triple("urn:b", "urn:title", Term::literal("neural processing")),
            triple("urn:c", "urn:title", Term::literal("database systems")),
        ]);
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:title"), Term::var("t"));
        let hits: Vec<FullTextMatch> = graph
            .full_text_search(
                &pattern,
                "t",
                &["neural".into(), "networks".into()],
                &FullTextOptions::default(),
            )
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<GraphResult<_>>()
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rank, Some(0));
        assert_eq!(hits[0].score, Some(1.0));
        assert_eq!(hits[1].score, Some(0.5));
    }

    #[tokio::test]
    async fn test_match_all_requires_every_keyword() {
        let graph = MemoryGraph::new("urn:g").with_triples(vec![triple(
            "urn:a",
            "urn:title",
            Term::literal("neural processing"),
        )]);
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:title"), Term::var("t"));
        let options = FullTextOptions {
            match_all: true,
            ..FullTextOptions::default()
        };
        let hits: Vec<_> = graph
            .full_text_search(&pattern, "t", &["neural".into(), "networks".into()], &options)
            .await
            .unwrap()
            .collect()
            .await;
        assert!(hits.is_empty());
    }

    #[test]
    fn test_memory_dataset_factory_creates_graphs() {
        let dataset = memory_dataset();
        assert!(dataset.create_graph("urn:g1").is_ok());
        assert!(dataset.has_named_graph("urn:g1"));
    }
}
