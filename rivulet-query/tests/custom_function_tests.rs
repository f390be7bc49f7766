//! Custom function registration and the error-to-Unbound contract.

use rivulet_core::{
    Dataset, Expression, Pattern, Projection, Query, Term, Triple, TriplePattern,
};
use rivulet_memory::MemoryGraph;
use rivulet_query::{PlanBuilder, QueryError};
use std::sync::Arc;

const CONTAINS_THOMAS: &str = "https://test.example/CONTAINS_THOMAS";
const REVERSE: &str = "https://test.example/REVERSE";
const THROW: &str = "https://test.example/THROW";

/// A handful of bibliography-style triples; exactly three literals
/// mention Thomas.
fn dblp_sample() -> Vec<Triple> {
    let author = |s: &str, name: &str| {
        Triple::new(
            Term::iri(format!("urn:dblp:{s}")),
            Term::iri("urn:creator"),
            Term::literal(name),
        )
    };
    vec![
        author("article1", "Thomas Minier"),
        author("article2", "Hala Skaf-Molli"),
        author("article3", "Pascal Molli"),
        author("article4", "Thomas Minier"),
        Triple::new(
            Term::iri("urn:dblp:article5"),
            Term::iri("urn:title"),
            Term::literal("Thomas' festschrift"),
        ),
        Triple::new(
            Term::iri("urn:dblp:article6"),
            Term::iri("urn:year"),
            Term::integer(2019),
        ),
    ]
}

fn builder_over(triples: Vec<Triple>) -> PlanBuilder {
    let graph = MemoryGraph::new("urn:x-default").with_triples(triples);
    let builder = PlanBuilder::new(Arc::new(Dataset::new(Arc::new(graph))));
    builder.register_function(
        CONTAINS_THOMAS,
        Arc::new(|args| match args {
            [Term::Literal(lit)] => Ok(Term::boolean(lit.value.contains("Thomas"))),
            _ => Err(QueryError::expression("expected one literal")),
        }),
    );
    builder.register_function(
        REVERSE,
        Arc::new(|args| match args {
            [Term::Literal(lit)] => {
                let reversed: String = lit.value.chars().rev().collect();
                Ok(match &lit.language {
                    Some(lang) => Term::lang_literal(reversed, lang.as_ref()),
                    None => Term::literal(reversed),
                })
            }
            _ => Err(QueryError::expression("expected one literal")),
        }),
    );
    builder.register_function(
        THROW,
        Arc::new(|_args| Err(QueryError::expression("deliberate failure"))),
    );
    builder
}

fn spo() -> TriplePattern {
    TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"))
}

/// A custom FILTER function keeps exactly the solutions it accepts;
/// solutions where it errors (non-literal input) drop silently.
#[tokio::test]
async fn test_custom_filter_function() {
    let builder = builder_over(dblp_sample());
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![spo()],
            },
            Pattern::Filter {
                expression: Expression::Function {
                    iri: Arc::from(CONTAINS_THOMAS),
                    args: vec![Expression::variable("o")],
                },
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 3);
}

/// A custom BIND function transforms the bound literal, language tag
/// preserved.
#[tokio::test]
async fn test_custom_bind_function() {
    let builder = builder_over(vec![Triple::new(
        Term::iri("urn:me"),
        Term::iri("urn:name"),
        Term::lang_literal("Thomas Minier", "en"),
    )]);
    let query = Query::select(
        [
            Projection::Variable(Arc::from("name")),
            Projection::Variable(Arc::from("reversed")),
        ],
        vec![
            Pattern::Bgp {
                triples: vec![TriplePattern::new(
                    Term::var("s"),
                    Term::iri("urn:name"),
                    Term::var("name"),
                )],
            },
            Pattern::Bind {
                expression: Expression::Function {
                    iri: Arc::from(REVERSE),
                    args: vec![Expression::variable("name")],
                },
                variable: Arc::from("reversed"),
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("reversed"),
        Some(&Term::lang_literal("reiniM samohT", "en"))
    );
}

/// A throwing custom function inside BIND still emits every solution,
/// with the target bound to the Unbound sentinel (rendered as the
/// literal "UNBOUND").
#[tokio::test]
async fn test_throwing_bind_yields_unbound() {
    let builder = builder_over(dblp_sample());
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![spo()],
            },
            Pattern::Bind {
                expression: Expression::Function {
                    iri: Arc::from(THROW),
                    args: vec![Expression::variable("o")],
                },
                variable: Arc::from("error"),
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), dblp_sample().len());
    for row in &rows {
        let error = row.get("error").expect("?error must be bound");
        assert!(error.is_unbound());
        assert_eq!(error.to_string(), "\"UNBOUND\"");
    }
}

/// An unregistered function IRI fails the whole build, fatally.
#[tokio::test]
async fn test_unknown_function_is_fatal() {
    let builder = builder_over(dblp_sample());
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![spo()],
            },
            Pattern::Filter {
                expression: Expression::Function {
                    iri: Arc::from("https://test.example/NOWHERE"),
                    args: vec![],
                },
            },
        ],
    );
    let err = builder.build(&query).err().expect("build must fail");
    match err {
        QueryError::UnknownFunction(iri) => assert!(iri.contains("NOWHERE")),
        other => panic!("expected UnknownFunction, got {other}"),
    }
}

/// A custom aggregate resolves before custom functions.
#[tokio::test]
async fn test_custom_aggregate() {
    let builder = builder_over(dblp_sample());
    builder.register_aggregate(
        "https://test.example/SHORTEST",
        Arc::new(|values| {
            values
                .iter()
                .filter_map(|t| t.as_literal())
                .min_by_key(|lit| lit.value.len())
                .map(|lit| Term::literal(lit.value.as_ref()))
                .ok_or_else(|| QueryError::expression("empty group"))
        }),
    );
    let query = Query::select(
        [Projection::Expression {
            expression: Expression::Function {
                iri: Arc::from("https://test.example/SHORTEST"),
                args: vec![Expression::variable("o")],
            },
            variable: Arc::from("shortest"),
        }],
        vec![Pattern::Bgp {
            triples: vec![TriplePattern::new(
                Term::var("s"),
                Term::iri("urn:creator"),
                Term::var("o"),
            )],
        }],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("shortest"), Some(&Term::literal("Pascal Molli")));
}
