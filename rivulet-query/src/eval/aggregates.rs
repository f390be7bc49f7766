//! SPARQL aggregates over grouped rows.
//!
//! Aggregate closures read the [`rivulet_core::GroupSlice`] attached
//! to grouped mappings; evaluating one against a mapping with no group
//! state is the fatal `AggregationOutsideGroup` error.
//!
//! Input handling follows the usual rules: rows where the inner
//! expression errors or is unbound contribute nothing, DISTINCT
//! deduplicates by canonical N-Triples form, empty input yields 0 for
//! COUNT/SUM/AVG and an evaluation error for MIN/MAX/SAMPLE.

use super::{compare, compile, numeric, CompiledExpression, FunctionRegistry};
use crate::error::{QueryError, Result};
use rivulet_core::{Bindings, Expression, Term};
use std::collections::HashSet;
use std::sync::Arc;

/// Collect the aggregate input values of one group.
pub(crate) fn collect_input(
    mu: &Bindings,
    inner: Option<&CompiledExpression>,
    distinct: bool,
) -> Result<Vec<Term>> {
    let group = mu
        .group()
        .ok_or(QueryError::AggregationOutsideGroup)?
        .clone();
    let mut values = Vec::new();
    if let Some(inner) = inner {
        for index in 0..group.len() {
            let row = group.row(index);
            match inner(&row) {
                Ok(Some(term)) if !term.is_unbound() => values.push(term),
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {}
                Err(e) => return Err(e),
            }
        }
    }
    if distinct {
        let mut seen = HashSet::new();
        values.retain(|term| seen.insert(term.to_string()));
    }
    Ok(values)
}

/// Compile an aggregate node.
pub fn compile_aggregate(
    aggregation: &str,
    inner: Option<&Expression>,
    distinct: bool,
    separator: Option<Arc<str>>,
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    let aggregation = aggregation.to_ascii_lowercase();
    let inner = inner.map(|e| compile(e, registry)).transpose()?;
    match aggregation.as_str() {
        "count" | "sum" | "avg" | "min" | "max" | "group_concat" | "sample" => {}
        other => return Err(QueryError::UnknownFunction(format!("aggregate {other}"))),
    }
    Ok(Arc::new(move |mu: &Bindings| {
        // COUNT(*) counts rows, not values.
        if aggregation == "count" && inner.is_none() {
            let group = mu.group().ok_or(QueryError::AggregationOutsideGroup)?;
            return Ok(Some(Term::integer(group.len() as i64)));
        }
        let values = collect_input(mu, inner.as_ref(), distinct)?;
        apply(&aggregation, &values, separator.as_deref()).map(Some)
    }))
}

fn apply(aggregation: &str, values: &[Term], separator: Option<&str>) -> Result<Term> {
    match aggregation {
        "count" => Ok(Term::integer(values.len() as i64)),
        "sum" => sum(values),
        "avg" => {
            if values.is_empty() {
                return Ok(Term::integer(0));
            }
            let total = sum(values)?;
            numeric::arithmetic("/", &total, &Term::integer(values.len() as i64))
        }
        "min" => values
            .iter()
            .min_by(|a, b| compare::order_terms(Some(a), Some(b)))
            .cloned()
            .ok_or_else(|| QueryError::expression("MIN over an empty group")),
        "max" => values
            .iter()
            .max_by(|a, b| compare::order_terms(Some(a), Some(b)))
            .cloned()
            .ok_or_else(|| QueryError::expression("MAX over an empty group")),
        "group_concat" => {
            let separator = separator.unwrap_or(" ");
            let parts: Vec<&str> = values
                .iter()
                .map(|term| match term {
                    Term::Literal(lit) => lit.value.as_ref(),
                    Term::Iri(iri) => iri.as_ref(),
                    Term::BlankNode(id) => id.as_ref(),
                    _ => "",
                })
                .collect();
            Ok(Term::literal(parts.join(separator)))
        }
        "sample" => values
            .first()
            .cloned()
            .ok_or_else(|| QueryError::expression("SAMPLE over an empty group")),
        other => Err(QueryError::UnknownFunction(format!("aggregate {other}"))),
    }
}

fn sum(values: &[Term]) -> Result<Term> {
    let mut total = Term::integer(0);
    for value in values {
        total = numeric::arithmetic("+", &total, value)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::GroupSlice;

    fn grouped(values: &[i64]) -> Bindings {
        let rows: Vec<Bindings> = values
            .iter()
            .map(|n| {
                let mut row = Bindings::new();
                row.insert("x", Term::integer(*n));
                row
            })
            .collect();
        let mut mu = Bindings::new();
        mu.set_group(Arc::new(GroupSlice::from_rows(&rows)));
        mu
    }

    fn run(aggregation: &str, distinct: bool, mu: &Bindings) -> Result<Option<Term>> {
        let registry = FunctionRegistry::default();
        let compiled = compile_aggregate(
            aggregation,
            Some(&Expression::variable("x")),
            distinct,
            None,
            &registry,
        )
        .unwrap();
        compiled(mu)
    }

    #[test]
    fn test_sum_avg_count() {
        let mu = grouped(&[1, 2, 3, 2]);
        assert_eq!(run("sum", false, &mu).unwrap(), Some(Term::integer(8)));
        assert_eq!(run("count", false, &mu).unwrap(), Some(Term::integer(4)));
        assert_eq!(run("count", true, &mu).unwrap(), Some(Term::integer(3)));
        assert_eq!(
            run("avg", false, &mu).unwrap(),
            Some(Term::typed_literal(
                "2",
                rivulet_core::vocab::xsd::DECIMAL
            ))
        );
    }

    #[test]
    fn test_aggregate_outside_group_is_fatal() {
        let mu = Bindings::new();
        let err = run("sum", false, &mu).unwrap_err();
        assert!(matches!(err, QueryError::AggregationOutsideGroup));
    }

    #[test]
    fn test_min_over_empty_group_is_recoverable() {
        let mu = grouped(&[]);
        let err = run("min", false, &mu).unwrap_err();
        assert!(err.is_recoverable());
    }
}
