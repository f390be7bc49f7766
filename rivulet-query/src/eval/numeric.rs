//! Numeric operand parsing, promotion, and arithmetic.
//!
//! The numeric tower is integer → decimal → float → double; binary
//! operations promote to the higher operand type, and dividing two
//! integers produces a decimal per the SPARQL operator table.

use crate::error::{QueryError, Result};
use rand::Rng;
use rivulet_core::vocab::xsd;
use rivulet_core::Term;
use std::cmp::Ordering;

/// A parsed numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Decimal(f64),
    Float(f64),
    Double(f64),
}

impl Numeric {
    fn rank(&self) -> u8 {
        match self {
            Numeric::Integer(_) => 0,
            Numeric::Decimal(_) => 1,
            Numeric::Float(_) => 2,
            Numeric::Double(_) => 3,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Numeric::Integer(v) => *v as f64,
            Numeric::Decimal(v) | Numeric::Float(v) | Numeric::Double(v) => *v,
        }
    }
}

fn expr_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(QueryError::expression(msg))
}

/// Parse a term as a numeric operand.
pub fn parse(term: &Term) -> Result<Numeric> {
    let Term::Literal(lit) = term else {
        return expr_err(format!("not a numeric literal: {term}"));
    };
    let text = lit.value.trim();
    match lit.datatype.as_ref() {
        xsd::INTEGER => text
            .parse::<i64>()
            .map(Numeric::Integer)
            .or_else(|_| expr_err(format!("bad xsd:integer lexical form: {text}"))),
        xsd::DECIMAL => text
            .parse::<f64>()
            .map(Numeric::Decimal)
            .or_else(|_| expr_err(format!("bad xsd:decimal lexical form: {text}"))),
        xsd::FLOAT => text
            .parse::<f64>()
            .map(Numeric::Float)
            .or_else(|_| expr_err(format!("bad xsd:float lexical form: {text}"))),
        xsd::DOUBLE => text
            .parse::<f64>()
            .map(Numeric::Double)
            .or_else(|_| expr_err(format!("bad xsd:double lexical form: {text}"))),
        other => expr_err(format!("not a numeric datatype: {other}")),
    }
}

pub fn is_numeric(term: &Term) -> bool {
    parse(term).is_ok()
}

fn format_decimal(value: f64) -> String {
    if value == value.trunc() && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Render a numeric back to a typed literal.
pub fn to_term(value: Numeric) -> Term {
    match value {
        Numeric::Integer(v) => Term::integer(v),
        Numeric::Decimal(v) => Term::typed_literal(format_decimal(v), xsd::DECIMAL),
        Numeric::Float(v) => Term::typed_literal(v.to_string(), xsd::FLOAT),
        Numeric::Double(v) => Term::typed_literal(v.to_string(), xsd::DOUBLE),
    }
}

fn promote(rank: u8, value: f64) -> Numeric {
    match rank {
        1 => Numeric::Decimal(value),
        2 => Numeric::Float(value),
        _ => Numeric::Double(value),
    }
}

/// `a <op> b` with type promotion.
pub fn arithmetic(op: &str, a: &Term, b: &Term) -> Result<Term> {
    let lhs = parse(a)?;
    let rhs = parse(b)?;
    let rank = lhs.rank().max(rhs.rank());
    // Integer arithmetic stays exact; division promotes to decimal.
    if rank == 0 {
        let (Numeric::Integer(x), Numeric::Integer(y)) = (lhs, rhs) else {
            unreachable!("rank 0 implies integers");
        };
        let result = match op {
            "+" => x.checked_add(y),
            "-" => x.checked_sub(y),
            "*" => x.checked_mul(y),
            "/" => {
                if y == 0 {
                    return expr_err("division by zero");
                }
                return Ok(to_term(Numeric::Decimal(x as f64 / y as f64)));
            }
            _ => return expr_err(format!("unknown arithmetic operator `{op}`")),
        };
        return match result {
            Some(v) => Ok(Term::integer(v)),
            None => expr_err("integer overflow"),
        };
    }
    let (x, y) = (lhs.as_f64(), rhs.as_f64());
    let value = match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => {
            if y == 0.0 && rank == 1 {
                return expr_err("division by zero");
            }
            x / y
        }
        _ => return expr_err(format!("unknown arithmetic operator `{op}`")),
    };
    Ok(to_term(promote(rank, value)))
}

pub fn negate(term: &Term) -> Result<Term> {
    match parse(term)? {
        Numeric::Integer(v) => v
            .checked_neg()
            .map(Term::integer)
            .ok_or_else(|| QueryError::expression("integer overflow")),
        other => Ok(to_term(promote(other.rank(), -other.as_f64()))),
    }
}

/// Value comparison across the numeric tower; `None` for NaN.
pub fn compare(a: &Term, b: &Term) -> Result<Option<Ordering>> {
    let lhs = parse(a)?;
    let rhs = parse(b)?;
    if let (Numeric::Integer(x), Numeric::Integer(y)) = (lhs, rhs) {
        return Ok(Some(x.cmp(&y)));
    }
    Ok(lhs.as_f64().partial_cmp(&rhs.as_f64()))
}

/// Strict numeric built-ins: ABS, ROUND, CEIL, FLOOR, RAND.
pub fn call(name: &str, args: &[Term]) -> Result<Term> {
    if name == "rand" {
        if !args.is_empty() {
            return expr_err("RAND takes no arguments");
        }
        let value: f64 = rand::thread_rng().gen_range(0.0..1.0);
        return Ok(Term::typed_literal(value.to_string(), xsd::DOUBLE));
    }
    let [arg] = args else {
        return expr_err(format!("{} expects one argument", name.to_uppercase()));
    };
    let value = parse(arg)?;
    let result = match (name, value) {
        ("abs", Numeric::Integer(v)) => Numeric::Integer(v.abs()),
        ("round" | "ceil" | "floor", Numeric::Integer(v)) => Numeric::Integer(v),
        ("abs", other) => promote(other.rank(), other.as_f64().abs()),
        // SPARQL ROUND rounds half up, toward positive infinity.
        ("round", other) => promote(other.rank(), (other.as_f64() + 0.5).floor()),
        ("ceil", other) => promote(other.rank(), other.as_f64().ceil()),
        ("floor", other) => promote(other.rank(), other.as_f64().floor()),
        _ => return expr_err(format!("unknown numeric function `{name}`")),
    };
    Ok(to_term(result))
}
