//! SPARQL expression evaluation.
//!
//! Expressions compile once per occurrence into a closure over the
//! current solution mapping. The closure returns:
//! - `Ok(Some(term))`: the evaluated term,
//! - `Ok(None)`: an unbound variable lookup,
//! - `Err(QueryError::Expression(_))`: a recoverable evaluation
//!   error; BIND converts it to the `Unbound` sentinel, FILTER drops
//!   the solution, HAVING drops the group,
//! - any other `Err`: fatal (unknown function at compile time,
//!   aggregation outside a group at evaluation time).

pub mod aggregates;
pub mod compare;
pub mod custom;
pub mod datetime;
pub mod dispatch;
pub mod hash;
pub mod numeric;
pub mod rdf;
pub mod string;

use crate::error::{QueryError, Result};
use rivulet_core::{Bindings, Expression, Term};
use std::sync::Arc;

pub use custom::{CustomAggregate, CustomFunction, FunctionRegistry};

/// A compiled expression: mapping in, term out.
pub type CompiledExpression = Arc<dyn Fn(&Bindings) -> Result<Option<Term>> + Send + Sync>;

/// Compile an expression tree into a closure.
///
/// Function IRIs resolve at compile time; an unresolved IRI is the
/// fatal `UnknownFunction` error.
pub fn compile(expression: &Expression, registry: &FunctionRegistry) -> Result<CompiledExpression> {
    match expression {
        Expression::Term(Term::Variable(name)) => {
            let name = name.clone();
            Ok(Arc::new(move |mu: &Bindings| Ok(mu.get(&name).cloned())))
        }
        Expression::Term(term) => {
            let term = term.clone();
            Ok(Arc::new(move |_: &Bindings| Ok(Some(term.clone()))))
        }
        Expression::List(_) => Err(QueryError::InvalidQuery(
            "term list outside IN / NOT IN".into(),
        )),
        Expression::Operation { operator, args } => {
            dispatch::compile_operation(operator, args, registry)
        }
        Expression::Function { iri, args } => custom::compile_function(iri, args, registry),
        Expression::Aggregate {
            aggregation,
            expression,
            distinct,
            separator,
        } => aggregates::compile_aggregate(
            aggregation,
            expression.as_deref(),
            *distinct,
            separator.clone(),
            registry,
        ),
    }
}

/// Evaluate all operands strictly: errors propagate, an unbound
/// operand (or the unbound sentinel) is itself an evaluation error.
pub(crate) fn eval_strict_args(
    args: &[CompiledExpression],
    mu: &Bindings,
) -> Result<Vec<Term>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg(mu)? {
            Some(Term::Unbound) | None => {
                return Err(QueryError::expression("operand is unbound"))
            }
            Some(term) => values.push(term),
        }
    }
    Ok(values)
}
