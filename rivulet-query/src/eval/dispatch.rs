//! Operator dispatch: routes an operation node to its implementation.
//!
//! Operator identifiers are the parser's operator strings (`"&&"`,
//! `"="`, `"str"`, ...). Logical operators, BOUND, IF, and COALESCE
//! get non-strict compilation; everything else evaluates its operands
//! left to right and fails on unbound operands.

use super::{compare, datetime, eval_strict_args, hash, numeric, rdf, string};
use super::{compile, CompiledExpression, FunctionRegistry};
use crate::error::{QueryError, Result};
use rivulet_core::{Bindings, Expression, Term};
use std::sync::Arc;

/// Compile one operation node.
pub fn compile_operation(
    operator: &str,
    args: &[Expression],
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    let op = operator.to_ascii_lowercase();
    match op.as_str() {
        "&&" | "||" => compile_logical(&op, args, registry),
        "!" => compile_not(args, registry),
        "=" | "!=" | "<" | ">" | "<=" | ">=" => compile_comparison(&op, args, registry),
        "in" | "notin" | "not in" => compile_in(&op, args, registry),
        "bound" => compile_bound(args),
        "if" => compile_if(args, registry),
        "coalesce" => compile_coalesce(args, registry),
        "+" | "-" | "*" | "/" => compile_arithmetic(&op, args, registry),
        // Strict built-ins, dispatched by family.
        "str" | "lang" | "datatype" | "langmatches" | "sameterm" | "isiri" | "isuri"
        | "isblank" | "isliteral" | "isnumeric" | "iri" | "uri" | "bnode" | "strdt"
        | "strlang" | "uuid" | "struuid" => {
            let name = op.clone();
            compile_strict(args, registry, move |values| rdf::call(&name, values))
        }
        "strlen" | "substr" | "ucase" | "lcase" | "strstarts" | "strends" | "contains"
        | "strbefore" | "strafter" | "encode_for_uri" | "concat" | "regex" | "replace" => {
            let name = op.clone();
            compile_strict(args, registry, move |values| string::call(&name, values))
        }
        "abs" | "round" | "ceil" | "floor" | "rand" => {
            let name = op.clone();
            compile_strict(args, registry, move |values| numeric::call(&name, values))
        }
        "now" | "year" | "month" | "day" | "hours" | "minutes" | "seconds" | "tz"
        | "timezone" => {
            let name = op.clone();
            compile_strict(args, registry, move |values| datetime::call(&name, values))
        }
        "md5" | "sha1" | "sha256" | "sha384" | "sha512" => {
            let name = op.clone();
            compile_strict(args, registry, move |values| hash::call(&name, values))
        }
        "exists" | "notexists" => Err(QueryError::UnsupportedPattern(
            "EXISTS inside expressions".into(),
        )),
        _ => Err(QueryError::UnknownFunction(operator.to_string())),
    }
}

fn compile_args(args: &[Expression], registry: &FunctionRegistry) -> Result<Vec<CompiledExpression>> {
    args.iter().map(|a| compile(a, registry)).collect()
}

fn expect_arity(args: &[Expression], arity: usize, operator: &str) -> Result<()> {
    if args.len() != arity {
        return Err(QueryError::InvalidQuery(format!(
            "`{operator}` expects {arity} operand(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

/// Strict wrapper: evaluate every operand, then apply.
fn compile_strict<F>(
    args: &[Expression],
    registry: &FunctionRegistry,
    apply: F,
) -> Result<CompiledExpression>
where
    F: Fn(&[Term]) -> Result<Term> + Send + Sync + 'static,
{
    let compiled = compile_args(args, registry)?;
    Ok(Arc::new(move |mu: &Bindings| {
        let values = eval_strict_args(&compiled, mu)?;
        apply(&values).map(Some)
    }))
}

/// SPARQL three-valued logic. An erroring operand only matters when
/// the other operand cannot decide the result on its own.
fn compile_logical(
    op: &str,
    args: &[Expression],
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    expect_arity(args, 2, op)?;
    let lhs = compile(&args[0], registry)?;
    let rhs = compile(&args[1], registry)?;
    let is_and = op == "&&";
    Ok(Arc::new(move |mu: &Bindings| {
        let left = lhs(mu).and_then(|v| compare::ebv_opt(v.as_ref()));
        // Short-circuit on a decisive left operand.
        match (&left, is_and) {
            (Ok(false), true) => return Ok(Some(Term::boolean(false))),
            (Ok(true), false) => return Ok(Some(Term::boolean(true))),
            _ => {}
        }
        let right = rhs(mu).and_then(|v| compare::ebv_opt(v.as_ref()));
        match (left, right, is_and) {
            (Ok(l), Ok(r), true) => Ok(Some(Term::boolean(l && r))),
            (Ok(l), Ok(r), false) => Ok(Some(Term::boolean(l || r))),
            // error && false = false, error || true = true
            (Err(_), Ok(false), true) => Ok(Some(Term::boolean(false))),
            (Err(_), Ok(true), false) => Ok(Some(Term::boolean(true))),
            (Err(e), _, _) | (_, Err(e), _) => Err(e),
        }
    }))
}

fn compile_not(args: &[Expression], registry: &FunctionRegistry) -> Result<CompiledExpression> {
    expect_arity(args, 1, "!")?;
    let inner = compile(&args[0], registry)?;
    Ok(Arc::new(move |mu: &Bindings| {
        let value = compare::ebv_opt(inner(mu)?.as_ref())?;
        Ok(Some(Term::boolean(!value)))
    }))
}

fn compile_comparison(
    op: &str,
    args: &[Expression],
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    expect_arity(args, 2, op)?;
    let lhs = compile(&args[0], registry)?;
    let rhs = compile(&args[1], registry)?;
    let op = op.to_string();
    Ok(Arc::new(move |mu: &Bindings| {
        let compiled = [&lhs, &rhs];
        let values = eval_strict_pair(&compiled, mu)?;
        compare::eval_comparison(&op, &values.0, &values.1).map(Some)
    }))
}

fn eval_strict_pair(
    args: &[&CompiledExpression; 2],
    mu: &Bindings,
) -> Result<(Term, Term)> {
    let mut out = Vec::with_capacity(2);
    for arg in args {
        match arg(mu)? {
            Some(Term::Unbound) | None => {
                return Err(QueryError::expression("operand is unbound"))
            }
            Some(term) => out.push(term),
        }
    }
    let second = out.pop().and_then(|b| out.pop().map(|a| (a, b)));
    second.ok_or_else(|| QueryError::expression("missing operand"))
}

fn compile_in(
    op: &str,
    args: &[Expression],
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    expect_arity(args, 2, op)?;
    let needle = compile(&args[0], registry)?;
    let Expression::List(candidates) = &args[1] else {
        return Err(QueryError::InvalidQuery(format!(
            "`{op}` expects a term list on the right"
        )));
    };
    let candidates = candidates.clone();
    let negated = op != "in";
    Ok(Arc::new(move |mu: &Bindings| {
        let value = match needle(mu)? {
            Some(Term::Unbound) | None => {
                return Err(QueryError::expression("operand is unbound"))
            }
            Some(term) => term,
        };
        let mut found = false;
        for candidate in &candidates {
            if compare::terms_equal(&value, candidate).unwrap_or(false) {
                found = true;
                break;
            }
        }
        Ok(Some(Term::boolean(found != negated)))
    }))
}

/// BOUND takes a variable, not a value: the sentinel still counts as
/// bound.
fn compile_bound(args: &[Expression]) -> Result<CompiledExpression> {
    expect_arity(args, 1, "bound")?;
    let Expression::Term(Term::Variable(name)) = &args[0] else {
        return Err(QueryError::InvalidQuery("BOUND expects a variable".into()));
    };
    let name = name.clone();
    Ok(Arc::new(move |mu: &Bindings| {
        Ok(Some(Term::boolean(mu.contains(&name))))
    }))
}

fn compile_if(args: &[Expression], registry: &FunctionRegistry) -> Result<CompiledExpression> {
    expect_arity(args, 3, "if")?;
    let condition = compile(&args[0], registry)?;
    let then_branch = compile(&args[1], registry)?;
    let else_branch = compile(&args[2], registry)?;
    Ok(Arc::new(move |mu: &Bindings| {
        if compare::ebv_opt(condition(mu)?.as_ref())? {
            then_branch(mu)
        } else {
            else_branch(mu)
        }
    }))
}

/// First operand that evaluates without error, errors skipped.
fn compile_coalesce(args: &[Expression], registry: &FunctionRegistry) -> Result<CompiledExpression> {
    let compiled = compile_args(args, registry)?;
    Ok(Arc::new(move |mu: &Bindings| {
        for arg in &compiled {
            match arg(mu) {
                Ok(Some(Term::Unbound)) | Ok(None) => continue,
                Ok(Some(term)) => return Ok(Some(term)),
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(QueryError::expression("COALESCE: no operand evaluated"))
    }))
}

fn compile_arithmetic(
    op: &str,
    args: &[Expression],
    registry: &FunctionRegistry,
) -> Result<CompiledExpression> {
    if op == "-" && args.len() == 1 {
        // Unary minus.
        let compiled = compile_args(args, registry)?;
        return Ok(Arc::new(move |mu: &Bindings| {
            let values = eval_strict_args(&compiled, mu)?;
            numeric::negate(&values[0]).map(Some)
        }));
    }
    expect_arity(args, 2, op)?;
    let compiled = compile_args(args, registry)?;
    let op = op.to_string();
    Ok(Arc::new(move |mu: &Bindings| {
        let values = eval_strict_args(&compiled, mu)?;
        numeric::arithmetic(&op, &values[0], &values[1]).map(Some)
    }))
}
