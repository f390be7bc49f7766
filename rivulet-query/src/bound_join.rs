//! Bound join: batched BGP evaluation against UNION-capable graphs.
//!
//! Instead of one `eval_bgp` round trip per input mapping, the input
//! is partitioned into batches; each batch row substitutes its
//! bindings into the BGP and renames the remaining variables with a
//! row-tagged prefix, and the whole batch goes to the graph as a
//! single `eval_union` dispatch. Result mappings are demultiplexed
//! back to their rows by the prefix.
//!
//! Rows that leave no free variable after substitution cannot be
//! demultiplexed and fall back to a per-row existence check.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::pipeline::{self, SolutionStream};
use futures::StreamExt;
use rivulet_core::{Bindings, Graph, Predicate, Term, TriplePattern};
use std::sync::Arc;

/// Reserved variable-name prefix tagging batch rows: `__bj<row>_<name>`.
const ROW_PREFIX: &str = "__bj";

/// Evaluate `patterns` for every source mapping via batched dispatch.
pub fn execute(
    source: SolutionStream,
    graph: Arc<dyn Graph>,
    patterns: Vec<TriplePattern>,
    ctx: &Arc<ExecutionContext>,
) -> SolutionStream {
    let batch_size = ctx.options.bound_join_batch_size.max(1);
    let patterns = Arc::new(patterns);
    source
        .chunks(batch_size)
        .flat_map(move |chunk| process_batch(graph.clone(), patterns.clone(), chunk))
        .boxed()
}

fn process_batch(
    graph: Arc<dyn Graph>,
    patterns: Arc<Vec<TriplePattern>>,
    chunk: Vec<Result<Bindings>>,
) -> SolutionStream {
    let mut parts: Vec<SolutionStream> = Vec::new();
    let mut rows: Vec<Bindings> = Vec::new();
    for item in chunk {
        match item {
            Ok(mapping) => rows.push(mapping),
            Err(e) => parts.push(pipeline::once_err(e)),
        }
    }

    let mut bgps: Vec<Vec<TriplePattern>> = Vec::new();
    for (row, mapping) in rows.iter().enumerate() {
        let bound: Vec<TriplePattern> = patterns.iter().map(|p| mapping.bound(p)).collect();
        if bound.iter().all(|p| p.variables().is_empty()) {
            // Fully bound: a per-row existence check.
            let echo = mapping.clone();
            let results = graph.eval_bgp(&bound);
            parts.push(
                results
                    .map(move |item| match item {
                        Ok(_) => Ok(echo.clone()),
                        Err(e) => Err(e.into()),
                    })
                    .boxed(),
            );
        } else {
            bgps.push(bound.iter().map(|p| tag_row(p, row)).collect());
        }
    }

    if !bgps.is_empty() {
        let rows = Arc::new(rows);
        let results = graph.eval_union(bgps);
        parts.push(
            results
                .filter_map(move |item| {
                    let rows = rows.clone();
                    futures::future::ready(match item {
                        Ok(mapping) => demux(&mapping, &rows).map(Ok),
                        Err(e) => Some(Err(e.into())),
                    })
                })
                .boxed(),
        );
    }
    pipeline::concat(parts)
}

fn tag_variable(term: &Term, row: usize) -> Term {
    match term {
        Term::Variable(name) => Term::var(format!("{ROW_PREFIX}{row}_{name}")),
        other => other.clone(),
    }
}

fn tag_row(pattern: &TriplePattern, row: usize) -> TriplePattern {
    TriplePattern {
        subject: tag_variable(&pattern.subject, row),
        predicate: match &pattern.predicate {
            Predicate::Term(t) => Predicate::Term(tag_variable(t, row)),
            path @ Predicate::Path(_) => path.clone(),
        },
        object: tag_variable(&pattern.object, row),
    }
}

/// Recover `(row, original name)` from a tagged variable.
fn untag(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix(ROW_PREFIX)?;
    let (row, original) = rest.split_once('_')?;
    Some((row.parse().ok()?, original))
}

/// Map a bulk result mapping back to its batch row, merged with the
/// row's input bindings.
fn demux(mapping: &Bindings, rows: &[Bindings]) -> Option<Bindings> {
    let mut row_index: Option<usize> = None;
    let mut restored = Bindings::new();
    for (variable, term) in mapping.iter() {
        let (row, original) = untag(variable)?;
        if *row_index.get_or_insert(row) != row {
            return None;
        }
        restored.insert(original, term.clone());
    }
    let row = rows.get(row_index?)?;
    Some(row.union(&restored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_and_untag_round_trip() {
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("urn:p"), Term::var("o"));
        let tagged = tag_row(&pattern, 7);
        let Term::Variable(name) = &tagged.subject else {
            panic!("expected a variable");
        };
        assert_eq!(untag(name), Some((7, "s")));
    }

    #[test]
    fn test_demux_merges_row_bindings() {
        let mut input = Bindings::new();
        input.insert("s", Term::iri("urn:a"));
        let rows = vec![input.clone()];

        let mut result = Bindings::new();
        result.insert("__bj0_o", Term::integer(5));
        let merged = demux(&result, &rows).unwrap();
        assert_eq!(merged.get("s"), Some(&Term::iri("urn:a")));
        assert_eq!(merged.get("o"), Some(&Term::integer(5)));
    }
}
