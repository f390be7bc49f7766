//! CONSTRUCT template instantiation.

use crate::error::Result;
use crate::pipeline::SolutionStream;
use futures::stream::BoxStream;
use futures::StreamExt;
use rivulet_core::{Bindings, Term, Triple, TriplePattern};

/// Triples produced by CONSTRUCT / DESCRIBE.
pub type ConstructStream = BoxStream<'static, Result<Triple>>;

/// Instantiate the template once per solution.
///
/// Template blank nodes get a fresh identifier per solution; any
/// triple left with an unbound term, a non-IRI predicate, or a literal
/// subject is dropped.
pub fn construct_stream(source: SolutionStream, template: Vec<TriplePattern>) -> ConstructStream {
    let mut solution_index: usize = 0;
    source
        .flat_map(move |item| match item {
            Err(e) => futures::stream::iter(vec![Err(e)]).boxed(),
            Ok(mu) => {
                let index = solution_index;
                solution_index += 1;
                let triples: Vec<Result<Triple>> = template
                    .iter()
                    .filter_map(|pattern| instantiate(pattern, &mu, index))
                    .map(Ok)
                    .collect();
                futures::stream::iter(triples).boxed()
            }
        })
        .boxed()
}

fn instantiate(pattern: &TriplePattern, mu: &Bindings, index: usize) -> Option<Triple> {
    let fill = |term: &Term| -> Option<Term> {
        match term {
            Term::Variable(name) => match mu.get(name) {
                Some(value) if !value.is_unbound() && !value.is_variable() => Some(value.clone()),
                _ => None,
            },
            Term::BlankNode(id) => Some(Term::blank(format!("{id}_{index}"))),
            Term::Unbound => None,
            other => Some(other.clone()),
        }
    };
    let subject = fill(&pattern.subject)?;
    let predicate = fill(pattern.predicate.as_term()?)?;
    let object = fill(&pattern.object)?;
    if subject.is_literal() || !predicate.is_iri() {
        return None;
    }
    Some(Triple::new(subject, predicate, object))
}

/// Consume a boolean (ASK) result: true when at least one solution
/// exists.
pub async fn ask(source: SolutionStream) -> Result<bool> {
    let mut limited = crate::pipeline::limit(source, 1);
    match limited.next().await {
        Some(item) => item.map(|_| true),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;
    use std::sync::Arc;

    fn mu(pairs: &[(&str, Term)]) -> Bindings {
        pairs
            .iter()
            .map(|(v, t)| (Arc::<str>::from(*v), t.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_incomplete_triples_are_dropped() {
        let template = vec![TriplePattern::new(
            Term::var("s"),
            Term::iri("urn:p"),
            Term::var("missing"),
        )];
        let source = pipeline::from_iter(vec![mu(&[("s", Term::iri("urn:a"))])]);
        let triples: Vec<_> = construct_stream(source, template).collect().await;
        assert!(triples.is_empty());
    }

    #[tokio::test]
    async fn test_blank_nodes_fresh_per_solution() {
        let template = vec![TriplePattern::new(
            Term::blank("b"),
            Term::iri("urn:p"),
            Term::var("x"),
        )];
        let source = pipeline::from_iter(vec![
            mu(&[("x", Term::integer(1))]),
            mu(&[("x", Term::integer(2))]),
        ]);
        let triples: Vec<Triple> = construct_stream(source, template)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(triples.len(), 2);
        assert_ne!(triples[0].subject, triples[1].subject);
    }
}
