//! Grouping, HAVING, and aggregate projection.
//!
//! Grouping is a full-buffer point: the source is drained, rows are
//! partitioned by the evaluated group keys, and each group becomes one
//! mapping carrying its key bindings plus a [`GroupSlice`] of the
//! member rows. Aggregate expressions downstream (SELECT aliases,
//! HAVING) read the slice.
//!
//! With no GROUP BY conditions the whole input forms one implicit
//! group, even when empty, so `SELECT (COUNT(*) AS ?n)` over nothing
//! still yields one row.

use crate::eval::{compare, CompiledExpression};
use crate::pipeline::{self, SolutionStream};
use rivulet_core::{Bindings, GroupSlice, Term};
use std::sync::Arc;

/// One compiled GROUP BY condition.
pub struct GroupKey {
    pub compiled: CompiledExpression,
    /// Variable the key value binds to on the group's output mapping
    /// (the plain grouped variable, or the AS alias).
    pub bind_as: Option<Arc<str>>,
}

/// Group the source and filter the groups through HAVING.
pub fn group_by(
    source: SolutionStream,
    keys: Vec<GroupKey>,
    having: Vec<CompiledExpression>,
) -> SolutionStream {
    pipeline::from_async(async move {
        let rows = pipeline::collect(source).await?;

        // (key terms, member rows), in first-appearance order.
        let mut groups: Vec<(Vec<Option<Term>>, Vec<Bindings>)> = Vec::new();
        if keys.is_empty() {
            groups.push((Vec::new(), rows));
        } else {
            let mut index: Vec<String> = Vec::new();
            for row in rows {
                let key_terms: Vec<Option<Term>> = keys
                    .iter()
                    .map(|key| match (key.compiled)(&row) {
                        Ok(Some(term)) if !term.is_unbound() => Some(term),
                        _ => None,
                    })
                    .collect();
                let canonical = key_terms
                    .iter()
                    .map(|t| t.as_ref().map(|t| t.to_string()).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join("\u{1f}");
                match index.iter().position(|existing| *existing == canonical) {
                    Some(position) => groups[position].1.push(row),
                    None => {
                        index.push(canonical);
                        groups.push((key_terms, vec![row]));
                    }
                }
            }
        }

        let mut output = Vec::with_capacity(groups.len());
        'groups: for (key_terms, members) in groups {
            let mut mu = Bindings::new();
            for (key, term) in keys.iter().zip(key_terms) {
                if let (Some(variable), Some(term)) = (&key.bind_as, term) {
                    mu.insert(variable.clone(), term);
                }
            }
            mu.set_group(Arc::new(GroupSlice::from_rows(&members)));
            for condition in &having {
                match condition(&mu).and_then(|value| compare::ebv_opt(value.as_ref())) {
                    Ok(true) => {}
                    Ok(false) => continue 'groups,
                    Err(e) if e.is_recoverable() => continue 'groups,
                    Err(e) => return Err(e),
                }
            }
            output.push(mu);
        }
        Ok(pipeline::from_iter(output))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{self, FunctionRegistry};
    use rivulet_core::Expression;

    fn row(g: i64, x: i64) -> Bindings {
        let mut b = Bindings::new();
        b.insert("g", Term::integer(g));
        b.insert("x", Term::integer(x));
        b
    }

    fn compiled(expr: &Expression) -> CompiledExpression {
        eval::compile(expr, &FunctionRegistry::default()).unwrap()
    }

    #[tokio::test]
    async fn test_groups_preserve_first_appearance_order() {
        let source = pipeline::from_iter(vec![row(2, 1), row(1, 2), row(2, 3)]);
        let keys = vec![GroupKey {
            compiled: compiled(&Expression::variable("g")),
            bind_as: Some(Arc::from("g")),
        }];
        let groups = pipeline::collect(group_by(source, keys, Vec::new()))
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].get("g"), Some(&Term::integer(2)));
        assert_eq!(groups[0].group().unwrap().len(), 2);
        assert_eq!(groups[1].get("g"), Some(&Term::integer(1)));
    }

    #[tokio::test]
    async fn test_implicit_group_over_empty_input() {
        let groups = pipeline::collect(group_by(pipeline::empty(), Vec::new(), Vec::new()))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].group().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_having_drops_groups() {
        let source = pipeline::from_iter(vec![row(1, 1), row(2, 10)]);
        let keys = vec![GroupKey {
            compiled: compiled(&Expression::variable("g")),
            bind_as: Some(Arc::from("g")),
        }];
        // HAVING SUM(?x) > 5
        let having = Expression::operation(
            ">",
            vec![
                Expression::Aggregate {
                    aggregation: Arc::from("sum"),
                    expression: Some(Box::new(Expression::variable("x"))),
                    distinct: false,
                    separator: None,
                },
                Expression::Term(Term::integer(5)),
            ],
        );
        let groups = pipeline::collect(group_by(source, keys, vec![compiled(&having)]))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].get("g"), Some(&Term::integer(2)));
    }
}
