//! Operand comparison, effective boolean value, and the total term
//! order used by ORDER BY and MIN/MAX.

use super::{datetime, numeric};
use crate::error::{QueryError, Result};
use rivulet_core::vocab::{rdf, xsd};
use rivulet_core::{Literal, Term};
use std::cmp::Ordering;

fn expr_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(QueryError::expression(msg))
}

/// Effective boolean value per SPARQL 17.2.2.
pub fn ebv(term: &Term) -> Result<bool> {
    match term {
        Term::Literal(lit) => match lit.datatype.as_ref() {
            xsd::BOOLEAN => match lit.value.as_ref() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => expr_err(format!("bad xsd:boolean lexical form: {other}")),
            },
            xsd::STRING | rdf::LANG_STRING => Ok(!lit.value.is_empty()),
            _ => match numeric::parse(term) {
                Ok(n) => Ok(n.as_f64() != 0.0 && !n.as_f64().is_nan()),
                Err(_) => expr_err(format!("no effective boolean value for {term}")),
            },
        },
        other => expr_err(format!("no effective boolean value for {other}")),
    }
}

/// EBV over a possibly-absent value; unbound is a type error.
pub fn ebv_opt(value: Option<&Term>) -> Result<bool> {
    match value {
        None | Some(Term::Unbound) => expr_err("operand is unbound"),
        Some(term) => ebv(term),
    }
}

fn is_plain_string(lit: &Literal) -> bool {
    lit.datatype.as_ref() == xsd::STRING
}

/// SPARQL `=` semantics: value equality for the recognized datatypes,
/// term identity otherwise. Comparing two literals of unrecognized
/// datatypes that are not identical is an error.
pub fn terms_equal(a: &Term, b: &Term) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    match (a, b) {
        (Term::Literal(la), Term::Literal(lb)) => {
            if let Ok(Some(ordering)) = numeric::compare(a, b) {
                return Ok(ordering == Ordering::Equal);
            }
            if la.datatype.as_ref() == xsd::DATE_TIME && lb.datatype.as_ref() == xsd::DATE_TIME {
                return Ok(datetime::compare(la, lb)? == Ordering::Equal);
            }
            if la.datatype == lb.datatype && la.language == lb.language {
                // Same recognized type, different lexical form.
                return Ok(false);
            }
            if (is_plain_string(la) && numeric::is_numeric(b))
                || (is_plain_string(lb) && numeric::is_numeric(a))
            {
                return Ok(false);
            }
            expr_err(format!("incomparable literals: {a} vs {b}"))
        }
        _ => Ok(false),
    }
}

/// Evaluate `a <op> b` into an `xsd:boolean` term.
///
/// Ordering operators require comparable operands (both numeric, both
/// strings, both booleans, or both dateTimes); anything else is a
/// type error that FILTER turns into a dropped solution.
pub fn eval_comparison(op: &str, a: &Term, b: &Term) -> Result<Term> {
    let result = match op {
        "=" => terms_equal(a, b)?,
        "!=" => !terms_equal(a, b)?,
        _ => {
            let ordering = partial_order(a, b)?;
            match op {
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                ">=" => ordering != Ordering::Less,
                other => return expr_err(format!("unknown comparison operator `{other}`")),
            }
        }
    };
    Ok(Term::boolean(result))
}

fn partial_order(a: &Term, b: &Term) -> Result<Ordering> {
    let (Term::Literal(la), Term::Literal(lb)) = (a, b) else {
        return expr_err(format!("operands are not comparable: {a} vs {b}"));
    };
    if let Ok(Some(ordering)) = numeric::compare(a, b) {
        return Ok(ordering);
    }
    if la.datatype.as_ref() == xsd::BOOLEAN && lb.datatype.as_ref() == xsd::BOOLEAN {
        let parse = |lit: &Literal| matches!(lit.value.as_ref(), "true" | "1");
        return Ok(parse(la).cmp(&parse(lb)));
    }
    if la.datatype.as_ref() == xsd::DATE_TIME && lb.datatype.as_ref() == xsd::DATE_TIME {
        return datetime::compare(la, lb);
    }
    if is_plain_string(la) && is_plain_string(lb) {
        return Ok(la.value.as_ref().cmp(lb.value.as_ref()));
    }
    expr_err(format!("operands are not comparable: {a} vs {b}"))
}

/// Total order over optional terms for ORDER BY: unbound, then blank
/// nodes, then IRIs, then literals; literals by value where a value
/// order exists, by lexical form and datatype otherwise.
pub fn order_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    fn class(term: Option<&Term>) -> u8 {
        match term {
            None | Some(Term::Unbound) => 0,
            Some(Term::BlankNode(_)) => 1,
            Some(Term::Iri(_)) => 2,
            Some(Term::Literal(_)) => 3,
            Some(Term::Variable(_)) => 4,
        }
    }
    let class_order = class(a).cmp(&class(b));
    if class_order != Ordering::Equal {
        return class_order;
    }
    match (a, b) {
        (Some(Term::BlankNode(x)), Some(Term::BlankNode(y))) => x.cmp(y),
        (Some(Term::Iri(x)), Some(Term::Iri(y))) => x.cmp(y),
        (Some(x @ Term::Literal(lx)), Some(y @ Term::Literal(ly))) => {
            if let Ok(Some(ordering)) = numeric::compare(x, y) {
                return ordering;
            }
            if lx.datatype.as_ref() == xsd::DATE_TIME && ly.datatype.as_ref() == xsd::DATE_TIME {
                if let Ok(ordering) = datetime::compare(lx, ly) {
                    return ordering;
                }
            }
            lx.value
                .as_ref()
                .cmp(ly.value.as_ref())
                .then_with(|| lx.datatype.as_ref().cmp(ly.datatype.as_ref()))
        }
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ebv_rules() {
        assert!(ebv(&Term::boolean(true)).unwrap());
        assert!(!ebv(&Term::literal("")).unwrap());
        assert!(ebv(&Term::literal("x")).unwrap());
        assert!(!ebv(&Term::integer(0)).unwrap());
        assert!(ebv(&Term::iri("urn:a")).is_err());
    }

    #[test]
    fn test_numeric_equality_across_types() {
        let int = Term::integer(2);
        let dec = Term::typed_literal("2.0", xsd::DECIMAL);
        assert!(terms_equal(&int, &dec).unwrap());
    }

    #[test]
    fn test_comparison_type_error() {
        assert!(eval_comparison("<", &Term::iri("urn:a"), &Term::integer(1)).is_err());
    }

    #[test]
    fn test_order_unbound_sorts_first() {
        assert_eq!(
            order_terms(None, Some(&Term::integer(1))),
            Ordering::Less
        );
        assert_eq!(
            order_terms(Some(&Term::iri("urn:a")), Some(&Term::literal("a"))),
            Ordering::Less
        );
    }
}
