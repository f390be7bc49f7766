//! ORDER BY stage.

use crate::eval::{compare, CompiledExpression};
use crate::pipeline::{self, SolutionStream};
use rivulet_core::{Bindings, Term};
use std::cmp::Ordering;

/// One compiled comparator.
pub struct Comparator {
    pub compiled: CompiledExpression,
    pub descending: bool,
}

/// Sort the full sequence (an explicit buffer point) with a stable
/// sort over the SPARQL term order. Comparator evaluation errors rank
/// the solution as unbound.
pub fn order_by(source: SolutionStream, comparators: Vec<Comparator>) -> SolutionStream {
    pipeline::from_async(async move {
        let rows = pipeline::collect(source).await?;
        let mut keyed: Vec<(Vec<Option<Term>>, Bindings)> = rows
            .into_iter()
            .map(|mu| {
                let keys = comparators
                    .iter()
                    .map(|c| match (c.compiled)(&mu) {
                        Ok(Some(term)) if !term.is_unbound() => Some(term),
                        _ => None,
                    })
                    .collect();
                (keys, mu)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| {
            for (index, comparator) in comparators.iter().enumerate() {
                let ordering = compare::order_terms(a[index].as_ref(), b[index].as_ref());
                let ordering = if comparator.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(pipeline::from_iter(
            keyed.into_iter().map(|(_, mu)| mu).collect::<Vec<_>>(),
        ))
    })
}

/// Convenience for tests and the plan builder.
pub fn comparator(compiled: CompiledExpression, descending: bool) -> Comparator {
    Comparator {
        compiled,
        descending,
    }
}
