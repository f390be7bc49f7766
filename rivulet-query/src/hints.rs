//! Query hints.
//!
//! Hints are magic triples under the reserved hint namespace embedded
//! in BGPs. The BGP stage strips them before evaluation and merges
//! them into the execution context's hint map, where stages and
//! backends can read them.

use crate::context::ExecutionContext;
use rivulet_core::{Predicate, Term, TriplePattern};

/// Reserved namespace for hint predicates.
pub const HINT_NAMESPACE: &str = "https://rivulet-rdf.dev/hints#";

/// Bounds the depth of transitive property-path walks.
pub const HINT_MAX_PATH_DEPTH: &str = "https://rivulet-rdf.dev/hints#maxPathDepth";

/// Prefer the index-nested-loop join even on UNION-capable graphs.
pub const HINT_FORCE_INDEX_JOIN: &str = "https://rivulet-rdf.dev/hints#forceIndexJoin";

/// Strip hint triples from a BGP, recording them on the context.
pub fn extract(triples: Vec<TriplePattern>, ctx: &ExecutionContext) -> Vec<TriplePattern> {
    let mut classic = Vec::with_capacity(triples.len());
    for triple in triples {
        match &triple.predicate {
            Predicate::Term(Term::Iri(iri)) if iri.starts_with(HINT_NAMESPACE) => {
                ctx.add_hint(iri.clone(), triple.object.clone());
            }
            _ => classic.push(triple),
        }
    }
    classic
}

/// Read a non-negative integer hint.
pub fn integer_hint(ctx: &ExecutionContext, predicate: &str) -> Option<usize> {
    match ctx.hint(predicate)? {
        Term::Literal(lit) => lit.value.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use rivulet_core::Dataset;
    use std::sync::Arc;

    #[test]
    fn test_hint_triples_are_stripped_and_recorded() {
        let dataset = Arc::new(Dataset::new(Arc::new(
            crate::test_support::EmptyGraph::default(),
        )));
        let ctx = ExecutionContext::new(dataset, EngineOptions::default());
        let triples = vec![
            TriplePattern::new(Term::var("s"), Term::iri("urn:p"), Term::var("o")),
            TriplePattern::new(
                Term::iri("urn:scope"),
                Term::iri(HINT_MAX_PATH_DEPTH),
                Term::integer(4),
            ),
        ];
        let classic = extract(triples, &ctx);
        assert_eq!(classic.len(), 1);
        assert_eq!(integer_hint(&ctx, HINT_MAX_PATH_DEPTH), Some(4));
    }
}
