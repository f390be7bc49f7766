//! DISTINCT / REDUCED stage.

use crate::pipeline::{self, SolutionStream};
use std::collections::HashSet;

/// Deduplicate by canonical form, preserving first-occurrence order.
/// Streaming: only the set of seen keys is retained.
pub fn distinct(source: SolutionStream) -> SolutionStream {
    let mut seen: HashSet<String> = HashSet::new();
    pipeline::filter_map(source, move |mu| seen.insert(mu.canonical()).then_some(mu))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::{Bindings, Term};

    fn mu(n: i64) -> Bindings {
        let mut b = Bindings::new();
        b.insert("x", Term::integer(n));
        b
    }

    #[tokio::test]
    async fn test_distinct_preserves_first_occurrence_order() {
        let source = pipeline::from_iter(vec![mu(2), mu(1), mu(2), mu(3), mu(1)]);
        let rows = pipeline::collect(distinct(source)).await.unwrap();
        assert_eq!(rows, vec![mu(2), mu(1), mu(3)]);
    }

    #[tokio::test]
    async fn test_distinct_is_idempotent() {
        let rows = vec![mu(1), mu(1), mu(2)];
        let once = pipeline::collect(distinct(pipeline::from_iter(rows.clone())))
            .await
            .unwrap();
        let twice = pipeline::collect(distinct(distinct(pipeline::from_iter(rows))))
            .await
            .unwrap();
        assert_eq!(once, twice);
    }
}
