//! VALUES rewriting, BIND count preservation, OPTIONAL and MINUS
//! semantics.

use rivulet_core::{
    Dataset, Expression, Pattern, Projection, Query, Term, Triple, TriplePattern, ValuesRow,
};
use rivulet_memory::MemoryGraph;
use rivulet_query::PlanBuilder;
use std::sync::Arc;

fn builder_over(triples: Vec<Triple>) -> PlanBuilder {
    let graph = MemoryGraph::new("urn:x-default").with_triples(triples);
    PlanBuilder::new(Arc::new(Dataset::new(Arc::new(graph))))
}

fn values_row(var: &str, term: Term) -> ValuesRow {
    let mut row = ValuesRow::default();
    row.insert(Arc::from(var), term);
    row
}

/// VALUES rewriting yields the union of the substituted bodies, with
/// the VALUES variable bound per row.
#[tokio::test]
async fn test_values_rewriting_substitutes_rows() {
    let builder = builder_over(vec![
        Triple::new(Term::iri("urn:1"), Term::iri("urn:p"), Term::integer(10)),
        Triple::new(Term::iri("urn:2"), Term::iri("urn:p"), Term::integer(20)),
        Triple::new(Term::iri("urn:3"), Term::iri("urn:p"), Term::integer(30)),
    ]);
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![TriplePattern::new(
                    Term::var("s"),
                    Term::var("p"),
                    Term::var("o"),
                )],
            },
            Pattern::Values {
                rows: vec![
                    values_row("s", Term::iri("urn:1")),
                    values_row("s", Term::iri("urn:2")),
                ],
            },
        ],
    );
    let mut rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    rows.sort_by_key(|r| r.canonical());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("s"), Some(&Term::iri("urn:1")));
    assert_eq!(rows[0].get("o"), Some(&Term::integer(10)));
    assert_eq!(rows[1].get("s"), Some(&Term::iri("urn:2")));
}

/// An UNDEF row leaves the variable free: every subject matches.
#[tokio::test]
async fn test_values_undef_row_matches_everything() {
    let builder = builder_over(vec![
        Triple::new(Term::iri("urn:1"), Term::iri("urn:p"), Term::integer(10)),
        Triple::new(Term::iri("urn:2"), Term::iri("urn:p"), Term::integer(20)),
    ]);
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![TriplePattern::new(
                    Term::var("s"),
                    Term::iri("urn:p"),
                    Term::var("o"),
                )],
            },
            Pattern::Values {
                rows: vec![values_row("s", Term::iri("urn:1")), ValuesRow::default()],
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    // Row 1 matches urn:1 only; the UNDEF row matches both subjects.
    assert_eq!(rows.len(), 3);
}

/// BIND emits exactly one mapping per input; the target is bound to
/// the term or the Unbound sentinel, never dropped.
#[tokio::test]
async fn test_bind_preserves_count() {
    let builder = builder_over(vec![
        Triple::new(Term::iri("urn:a"), Term::iri("urn:p"), Term::integer(1)),
        Triple::new(Term::iri("urn:b"), Term::iri("urn:p"), Term::literal("nan")),
        Triple::new(Term::iri("urn:c"), Term::iri("urn:p"), Term::integer(3)),
    ]);
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![TriplePattern::new(
                    Term::var("s"),
                    Term::iri("urn:p"),
                    Term::var("o"),
                )],
            },
            Pattern::Bind {
                expression: Expression::operation(
                    "+",
                    vec![
                        Expression::variable("o"),
                        Expression::Term(Term::integer(1)),
                    ],
                ),
                variable: Arc::from("next"),
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 3);
    let unbound = rows
        .iter()
        .filter(|r| r.get("next") == Some(&Term::Unbound))
        .count();
    // "nan" is not numeric: that one row carries the sentinel.
    assert_eq!(unbound, 1);
}

/// OPTIONAL extends when the body matches and passes the input
/// through unextended when it does not.
#[tokio::test]
async fn test_optional_leftover_rows() {
    let builder = builder_over(vec![
        Triple::new(Term::iri("urn:a"), Term::iri("urn:p"), Term::integer(1)),
        Triple::new(Term::iri("urn:b"), Term::iri("urn:p"), Term::integer(2)),
        Triple::new(Term::iri("urn:a"), Term::iri("urn:mail"), Term::literal("a@x")),
    ]);
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![TriplePattern::new(
                    Term::var("s"),
                    Term::iri("urn:p"),
                    Term::var("o"),
                )],
            },
            Pattern::Optional {
                patterns: vec![Pattern::Bgp {
                    triples: vec![TriplePattern::new(
                        Term::var("s"),
                        Term::iri("urn:mail"),
                        Term::var("mail"),
                    )],
                }],
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 2);
    let with_mail = rows.iter().find(|r| r.contains("mail")).unwrap();
    assert_eq!(with_mail.get("s"), Some(&Term::iri("urn:a")));
    let without_mail = rows.iter().find(|r| !r.contains("mail")).unwrap();
    assert_eq!(without_mail.get("s"), Some(&Term::iri("urn:b")));
}

/// MINUS removes compatible solutions sharing a variable and keeps
/// everything else.
#[tokio::test]
async fn test_minus_excludes_compatible_rows() {
    let builder = builder_over(vec![
        Triple::new(Term::iri("urn:a"), Term::iri("urn:p"), Term::integer(1)),
        Triple::new(Term::iri("urn:b"), Term::iri("urn:p"), Term::integer(2)),
        Triple::new(Term::iri("urn:a"), Term::iri("urn:banned"), Term::boolean(true)),
    ]);
    let query = Query::select(
        [Projection::Wildcard],
        vec![
            Pattern::Bgp {
                triples: vec![TriplePattern::new(
                    Term::var("s"),
                    Term::iri("urn:p"),
                    Term::var("o"),
                )],
            },
            Pattern::Minus {
                patterns: vec![Pattern::Bgp {
                    triples: vec![TriplePattern::new(
                        Term::var("s"),
                        Term::iri("urn:banned"),
                        Term::var("flag"),
                    )],
                }],
            },
        ],
    );
    let rows = builder.build(&query).unwrap().all_bindings().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("s"), Some(&Term::iri("urn:b")));
}
