//! Update engine: data modification and graph management.

use futures::FutureExt;
use rivulet_core::{
    Dataset, Graph, GraphRefTarget, GraphTarget, Pattern, Quad, QuadPattern, Term, Triple,
    TriplePattern, Update, UpdateRequest,
};
use rivulet_memory::MemoryGraph;
use rivulet_query::{PlanBuilder, QueryError};
use std::sync::Arc;

fn triple(s: &str, p: &str, o: Term) -> Triple {
    Triple::new(Term::iri(s), Term::iri(p), o)
}

fn setup(triples: Vec<Triple>) -> (PlanBuilder, MemoryGraph) {
    let graph = MemoryGraph::new("urn:x-default").with_triples(triples);
    let dataset = Dataset::new(Arc::new(graph.clone())).with_factory(Arc::new(
        |iri: Arc<str>| Arc::new(MemoryGraph::new(iri.as_ref())) as Arc<dyn Graph>,
    ));
    (PlanBuilder::new(Arc::new(dataset)), graph)
}

fn request(updates: Vec<Update>) -> UpdateRequest {
    UpdateRequest {
        updates,
        ..UpdateRequest::default()
    }
}

/// CREATE GRAPH makes the graph visible in the dataset.
#[tokio::test]
async fn test_create_graph() {
    let (builder, _) = setup(vec![]);
    let plan = builder
        .build_update(&request(vec![Update::Create {
            graph: Arc::from("urn:g"),
            silent: false,
        }]))
        .unwrap();
    plan.execute().await.unwrap();
    assert!(builder.dataset().has_named_graph("urn:g"));
}

/// CREATE on an existing graph fails loudly, succeeds silently.
#[tokio::test]
async fn test_create_existing_graph() {
    let (builder, _) = setup(vec![]);
    builder.dataset().create_graph("urn:g").unwrap();

    let loud = builder
        .build_update(&request(vec![Update::Create {
            graph: Arc::from("urn:g"),
            silent: false,
        }]))
        .unwrap();
    assert!(loud.execute().await.is_err());

    let silent = builder
        .build_update(&request(vec![Update::Create {
            graph: Arc::from("urn:g"),
            silent: true,
        }]))
        .unwrap();
    silent.execute().await.unwrap();
}

/// INSERT DATA into a named graph creates it implicitly.
#[tokio::test]
async fn test_insert_data_into_named_graph() {
    let (builder, _) = setup(vec![]);
    let quad = Quad::new(
        triple("urn:a", "urn:p", Term::integer(1)),
        Some(Arc::from("urn:g")),
    );
    builder
        .build_update(&request(vec![Update::InsertData { quads: vec![quad] }]))
        .unwrap()
        .execute()
        .await
        .unwrap();
    let graph = builder.dataset().named_graph("urn:g").unwrap();
    assert_eq!(graph.estimate_cardinality(&spo()).await.unwrap(), 1);
}

fn spo() -> TriplePattern {
    TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"))
}

/// DELETE ... INSERT ... WHERE rewrites matching triples.
#[tokio::test]
async fn test_modify_with_where() {
    let (builder, graph) = setup(vec![
        triple("urn:a", "urn:status", Term::literal("draft")),
        triple("urn:b", "urn:status", Term::literal("final")),
    ]);
    let pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:status"), Term::literal("draft"));
    let update = Update::Modify {
        delete: vec![QuadPattern {
            pattern: pattern.clone(),
            graph: None,
        }],
        insert: vec![QuadPattern {
            pattern: TriplePattern::new(
                Term::var("s"),
                Term::iri("urn:status"),
                Term::literal("published"),
            ),
            graph: None,
        }],
        where_clause: vec![Pattern::Bgp {
            triples: vec![pattern],
        }],
        using: None,
    };
    builder
        .build_update(&request(vec![update]))
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert_eq!(graph.len(), 2);
    let published = TriplePattern::new(
        Term::var("s"),
        Term::iri("urn:status"),
        Term::literal("published"),
    );
    assert_eq!(graph.estimate_cardinality(&published).await.unwrap(), 1);
    let draft = TriplePattern::new(Term::var("s"), Term::iri("urn:status"), Term::literal("draft"));
    assert_eq!(graph.estimate_cardinality(&draft).await.unwrap(), 0);
}

/// COPY replaces the destination; MOVE also removes the source.
#[tokio::test]
async fn test_copy_and_move() {
    let (builder, _) = setup(vec![triple("urn:a", "urn:p", Term::integer(1))]);
    builder.dataset().create_graph("urn:g").unwrap();
    let named = builder.dataset().named_graph("urn:g").unwrap();
    named
        .insert(triple("urn:old", "urn:p", Term::integer(9)))
        .await
        .unwrap();

    builder
        .build_update(&request(vec![Update::Copy {
            source: GraphRefTarget::Default,
            destination: GraphRefTarget::Named(Arc::from("urn:g")),
            silent: false,
        }]))
        .unwrap()
        .execute()
        .await
        .unwrap();
    let named = builder.dataset().named_graph("urn:g").unwrap();
    assert_eq!(named.estimate_cardinality(&spo()).await.unwrap(), 1);

    builder
        .build_update(&request(vec![Update::Move {
            source: GraphRefTarget::Named(Arc::from("urn:g")),
            destination: GraphRefTarget::Named(Arc::from("urn:g2")),
            silent: false,
        }]))
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert!(!builder.dataset().has_named_graph("urn:g"));
    assert!(builder.dataset().has_named_graph("urn:g2"));
}

/// CLEAR empties a graph without removing it.
#[tokio::test]
async fn test_clear_default() {
    let (builder, graph) = setup(vec![triple("urn:a", "urn:p", Term::integer(1))]);
    builder
        .build_update(&request(vec![Update::Clear {
            target: GraphTarget::Default,
            silent: false,
        }]))
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert!(graph.is_empty());
}

/// LOAD goes through the injected loader.
#[tokio::test]
async fn test_load_with_injected_loader() {
    let (builder, graph) = setup(vec![]);
    builder.set_loader(Arc::new(|source: String| {
        async move {
            if source == "http://remote/data.ttl" {
                Ok(vec![Triple::new(
                    Term::iri("urn:loaded"),
                    Term::iri("urn:p"),
                    Term::integer(7),
                )])
            } else {
                Err(QueryError::Update(format!("404: {source}")))
            }
        }
        .boxed()
    }));

    builder
        .build_update(&request(vec![Update::Load {
            source: Arc::from("http://remote/data.ttl"),
            destination: None,
            silent: false,
        }]))
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(graph.len(), 1);

    // Non-silent failure aborts; silent failure does not.
    let failing = builder
        .build_update(&request(vec![Update::Load {
            source: Arc::from("http://remote/missing.ttl"),
            destination: None,
            silent: false,
        }]))
        .unwrap();
    assert!(failing.execute().await.is_err());

    builder
        .build_update(&request(vec![Update::Load {
            source: Arc::from("http://remote/missing.ttl"),
            destination: None,
            silent: true,
        }]))
        .unwrap()
        .execute()
        .await
        .unwrap();
}

/// A failing operation aborts the remaining updates in the request.
#[tokio::test]
async fn test_failure_aborts_remaining_updates() {
    let (builder, _) = setup(vec![]);
    builder.dataset().create_graph("urn:exists").unwrap();
    let plan = builder
        .build_update(&request(vec![
            Update::Create {
                graph: Arc::from("urn:exists"),
                silent: false,
            },
            Update::Create {
                graph: Arc::from("urn:never"),
                silent: false,
            },
        ]))
        .unwrap();
    assert!(plan.execute().await.is_err());
    assert!(!builder.dataset().has_named_graph("urn:never"));
}
