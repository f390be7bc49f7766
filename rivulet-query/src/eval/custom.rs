//! User-supplied functions and aggregates.
//!
//! Resolution order for a function IRI: custom aggregates, then
//! custom functions; an IRI nothing resolves is the fatal
//! `UnknownFunction` error at compile time. Whatever a custom
//! implementation returns as an error is downgraded to the
//! recoverable expression-error kind, so a throwing custom function
//! inside BIND yields `Unbound` and the query continues.

use super::{aggregates, compile, eval_strict_args, CompiledExpression};
use crate::error::{QueryError, Result};
use rivulet_core::{Bindings, Expression, Term};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A custom scalar function: strict over its operands.
pub type CustomFunction = Arc<dyn Fn(&[Term]) -> Result<Term> + Send + Sync>;

/// A custom aggregate: applied to the collected input terms of one
/// group.
pub type CustomAggregate = Arc<dyn Fn(&[Term]) -> Result<Term> + Send + Sync>;

/// Registry of user-supplied functions and aggregates, keyed by IRI.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: FxHashMap<Arc<str>, CustomFunction>,
    aggregates: FxHashMap<Arc<str>, CustomAggregate>,
}

impl FunctionRegistry {
    pub fn register_function(&mut self, iri: impl AsRef<str>, function: CustomFunction) {
        self.functions.insert(Arc::from(iri.as_ref()), function);
    }

    pub fn register_aggregate(&mut self, iri: impl AsRef<str>, aggregate: CustomAggregate) {
        self.aggregates.insert(Arc::from(iri.as_ref()), aggregate);
    }

    pub fn function(&self, iri: &str) -> Option<&CustomFunction> {
        self.functions.get(iri)
    }

    pub fn aggregate(&self, iri: &str) -> Option<&CustomAggregate> {
        self.aggregates.get(iri)
    }
}

fn recoverable(err: QueryError) -> QueryError {
    if err.is_recoverable() {
        err
    } else {
        QueryError::expression(err.to_string())
    }
}

/// Compile a function-call node against the registry.
pub fn compile_function(
    iri: &str,
    args: &[Expression],
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    if let Some(aggregate) = registry.aggregate(iri).cloned() {
        let [input] = args else {
            return Err(QueryError::InvalidQuery(format!(
                "custom aggregate <{iri}> expects one argument"
            )));
        };
        let inner = compile(input, registry)?;
        return Ok(Arc::new(move |mu: &Bindings| {
            let values = aggregates::collect_input(mu, Some(&inner), false)?;
            aggregate(&values).map(Some).map_err(recoverable)
        }));
    }
    if let Some(function) = registry.function(iri).cloned() {
        let compiled: Vec<CompiledExpression> = args
            .iter()
            .map(|a| compile(a, registry))
            .collect::<Result<_>>()?;
        return Ok(Arc::new(move |mu: &Bindings| {
            let values = eval_strict_args(&compiled, mu)?;
            function(&values).map(Some).map_err(recoverable)
        }));
    }
    Err(QueryError::UnknownFunction(iri.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_function_is_fatal_at_compile() {
        let registry = FunctionRegistry::default();
        let err = match compile_function("urn:nothing", &[], &registry) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, QueryError::UnknownFunction(_)));
    }

    #[test]
    fn test_custom_function_errors_become_recoverable() {
        let mut registry = FunctionRegistry::default();
        registry.register_function(
            "urn:boom",
            Arc::new(|_args| Err(QueryError::Update("kaboom".into()))),
        );
        let compiled = compile_function(
            "urn:boom",
            &[Expression::Term(Term::literal("x"))],
            &registry,
        )
        .unwrap();
        let err = compiled(&Bindings::new()).unwrap_err();
        assert!(err.is_recoverable());
    }
}
