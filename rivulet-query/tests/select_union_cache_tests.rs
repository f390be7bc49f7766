//! SELECT / UNION execution with the semantic BGP cache.
//!
//! Covers the cache contract end to end: a UNION reusing the first
//! branch's committed entry, LIMIT/OFFSET disabling cache read and
//! write, and subset reuse across queries.

use rivulet_core::{
    Dataset, Graph, Pattern, Projection, Query, Term, Triple, TriplePattern,
};
use rivulet_memory::MemoryGraph;
use rivulet_query::cache::BgpKey;
use rivulet_query::PlanBuilder;
use std::sync::Arc;

const DEFAULT_GRAPH: &str = "urn:x-default";

fn sample_triples(count: usize) -> Vec<Triple> {
    (0..count)
        .map(|i| {
            Triple::new(
                Term::iri(format!("urn:s{i}")),
                Term::iri("urn:p"),
                Term::integer(i as i64),
            )
        })
        .collect()
}

fn builder_over(triples: Vec<Triple>) -> PlanBuilder {
    let graph = MemoryGraph::new(DEFAULT_GRAPH).with_triples(triples);
    let dataset = Dataset::new(Arc::new(graph)).with_factory(Arc::new(|iri: Arc<str>| {
        Arc::new(MemoryGraph::new(iri.as_ref())) as Arc<dyn Graph>
    }));
    PlanBuilder::new(Arc::new(dataset))
}

fn spo() -> TriplePattern {
    TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"))
}

fn union_doubling_query() -> Query {
    Query::select(
        [
            Projection::Variable(Arc::from("s")),
            Projection::Variable(Arc::from("p")),
            Projection::Variable(Arc::from("o")),
        ],
        vec![Pattern::Union {
            patterns: vec![
                Pattern::Bgp {
                    triples: vec![spo()],
                },
                Pattern::Bgp {
                    triples: vec![spo()],
                },
            ],
        }],
    )
}

/// A UNION whose two branches evaluate the same BGP doubles the rows;
/// the second branch is answered from the cache, which holds exactly
/// one entry with the full result set.
#[tokio::test]
async fn test_union_doubling_populates_cache() {
    let builder = builder_over(sample_triples(17));
    builder.use_cache();

    let rows = builder
        .build(&union_doubling_query())
        .unwrap()
        .all_bindings()
        .await
        .unwrap();
    assert_eq!(rows.len(), 34);

    let cache = builder.cache().unwrap();
    assert_eq!(cache.count(), 1);
    let key = BgpKey::new(&[spo()], Arc::from(DEFAULT_GRAPH));
    assert!(cache.has(&key));
    let entry = cache.get(&key).unwrap().await.unwrap();
    assert_eq!(entry.len(), 17);
}

/// LIMIT disables the cache entirely: neither read nor write.
#[tokio::test]
async fn test_limit_disables_caching() {
    let builder = builder_over(sample_triples(17));
    builder.use_cache();

    let mut query = union_doubling_query();
    query.limit = Some(10);
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 10);

    let cache = builder.cache().unwrap();
    assert_eq!(cache.count(), 0);
}

/// OFFSET disables caching the same way LIMIT does.
#[tokio::test]
async fn test_offset_disables_caching() {
    let builder = builder_over(sample_triples(5));
    builder.use_cache();

    let mut query = union_doubling_query();
    query.offset = Some(2);
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 8);
    assert_eq!(builder.cache().unwrap().count(), 0);
}

/// A second query whose BGP is a superset of a cached BGP reuses the
/// cached mappings and only evaluates the missing pattern; the larger
/// BGP itself is not cached.
#[tokio::test]
async fn test_subset_reuse_across_queries() {
    let mut triples = vec![
        Triple::new(Term::iri("urn:a"), Term::iri("urn:p"), Term::integer(1)),
        Triple::new(Term::iri("urn:b"), Term::iri("urn:p"), Term::integer(2)),
        Triple::new(Term::iri("urn:a"), Term::iri("urn:t"), Term::literal("x")),
    ];
    triples.push(Triple::new(
        Term::iri("urn:c"),
        Term::iri("urn:t"),
        Term::literal("y"),
    ));
    let builder = builder_over(triples);
    builder.use_cache();

    let p_pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:p"), Term::var("o"));
    let first = Query::select(
        [Projection::Variable(Arc::from("s"))],
        vec![Pattern::Bgp {
            triples: vec![p_pattern.clone()],
        }],
    );
    let rows = builder.build(&first).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(builder.cache().unwrap().count(), 1);

    let t_pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:t"), Term::var("tag"));
    let second = Query::select(
        [
            Projection::Variable(Arc::from("s")),
            Projection::Variable(Arc::from("tag")),
        ],
        vec![Pattern::Bgp {
            triples: vec![p_pattern.clone(), t_pattern],
        }],
    );
    let rows = builder.build(&second).unwrap().all_bindings().await.unwrap();
    // Only urn:a carries both urn:p and urn:t.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("s"), Some(&Term::iri("urn:a")));
    assert_eq!(rows[0].get("tag"), Some(&Term::literal("x")));

    // The subset join does not install a new entry.
    assert_eq!(builder.cache().unwrap().count(), 1);
}

/// Disabling the cache stops both population and reuse.
#[tokio::test]
async fn test_disable_cache() {
    let builder = builder_over(sample_triples(3));
    builder.use_cache();
    builder.disable_cache();
    let rows = builder
        .build(&union_doubling_query())
        .unwrap()
        .all_bindings()
        .await
        .unwrap();
    assert_eq!(rows.len(), 6);
    assert!(builder.cache().is_none());
}
