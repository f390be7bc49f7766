//! RDF term predicates, accessors, and constructors.

use super::{numeric, string};
use crate::error::{QueryError, Result};
use rivulet_core::Term;
use uuid::Uuid;

fn expr_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(QueryError::expression(msg))
}

/// Strict term-level built-ins.
pub fn call(name: &str, args: &[Term]) -> Result<Term> {
    match (name, args) {
        ("str", [term]) => match term {
            Term::Literal(lit) => Ok(Term::literal(lit.value.as_ref())),
            Term::Iri(iri) => Ok(Term::literal(iri.as_ref())),
            other => expr_err(format!("STR is undefined for {other}")),
        },
        ("lang", [term]) => match term {
            Term::Literal(lit) => Ok(Term::literal(
                lit.language.as_deref().unwrap_or_default(),
            )),
            other => expr_err(format!("LANG is undefined for {other}")),
        },
        ("datatype", [term]) => match term {
            Term::Literal(lit) => Ok(Term::iri(lit.datatype.as_ref())),
            other => expr_err(format!("DATATYPE is undefined for {other}")),
        },
        ("langmatches", [tag, range]) => lang_matches(tag, range),
        ("sameterm", [a, b]) => Ok(Term::boolean(a == b)),
        ("isiri" | "isuri", [term]) => Ok(Term::boolean(term.is_iri())),
        ("isblank", [term]) => Ok(Term::boolean(term.is_blank())),
        ("isliteral", [term]) => Ok(Term::boolean(term.is_literal())),
        ("isnumeric", [term]) => Ok(Term::boolean(numeric::is_numeric(term))),
        ("iri" | "uri", [term]) => match term {
            Term::Iri(_) => Ok(term.clone()),
            Term::Literal(lit) if lit.is_string() => Ok(Term::iri(lit.value.as_ref())),
            other => expr_err(format!("IRI is undefined for {other}")),
        },
        ("bnode", []) => Ok(Term::blank(format!("b{}", Uuid::new_v4().simple()))),
        ("bnode", [label]) => match label {
            Term::Literal(lit) if lit.is_string() => Ok(Term::blank(lit.value.as_ref())),
            other => expr_err(format!("BNODE label is not a string: {other}")),
        },
        ("strdt", [lexical, datatype]) => string::strdt(lexical, datatype),
        ("strlang", [lexical, tag]) => string::strlang(lexical, tag),
        ("uuid", []) => Ok(Term::iri(format!("urn:uuid:{}", Uuid::new_v4()))),
        ("struuid", []) => Ok(Term::literal(Uuid::new_v4().to_string())),
        _ => expr_err(format!(
            "bad arguments for term function `{name}` ({} given)",
            args.len()
        )),
    }
}

/// LANGMATCHES with basic range matching (`*` and prefix rules).
fn lang_matches(tag: &Term, range: &Term) -> Result<Term> {
    let (Term::Literal(tag), Term::Literal(range)) = (tag, range) else {
        return expr_err("LANGMATCHES expects two string literals");
    };
    let tag = tag.value.to_ascii_lowercase();
    let range = range.value.to_ascii_lowercase();
    let matched = if range == "*" {
        !tag.is_empty()
    } else {
        tag == range || tag.starts_with(&format!("{range}-"))
    };
    Ok(Term::boolean(matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::vocab::xsd;

    #[test]
    fn test_str_of_iri_and_literal() {
        assert_eq!(
            call("str", &[Term::iri("urn:a")]).unwrap(),
            Term::literal("urn:a")
        );
        assert_eq!(
            call("str", &[Term::lang_literal("x", "en")]).unwrap(),
            Term::literal("x")
        );
        assert!(call("str", &[Term::blank("b0")]).is_err());
    }

    #[test]
    fn test_langmatches_prefix() {
        let tag = Term::literal("en-GB");
        assert_eq!(
            call("langmatches", &[tag.clone(), Term::literal("en")]).unwrap(),
            Term::boolean(true)
        );
        assert_eq!(
            call("langmatches", &[tag, Term::literal("fr")]).unwrap(),
            Term::boolean(false)
        );
    }

    #[test]
    fn test_datatype_of_plain_literal() {
        assert_eq!(
            call("datatype", &[Term::literal("x")]).unwrap(),
            Term::iri(xsd::STRING)
        );
    }
}
