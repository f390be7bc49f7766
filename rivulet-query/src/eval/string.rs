//! String built-ins.

use crate::error::{QueryError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use rivulet_core::vocab::xsd;
use rivulet_core::{Literal, Term};

fn expr_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(QueryError::expression(msg))
}

/// Unreserved characters survive ENCODE_FOR_URI.
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn string_literal(term: &Term) -> Result<&Literal> {
    match term {
        Term::Literal(lit) if lit.is_string() => Ok(lit),
        other => expr_err(format!("not a string literal: {other}")),
    }
}

/// Argument compatibility per SPARQL 17.4.3.1: second argument must be
/// a simple literal or share the first argument's language tag.
fn check_compatible(a: &Literal, b: &Literal) -> Result<()> {
    let compatible = match (&a.language, &b.language) {
        (_, None) => true,
        (Some(la), Some(lb)) => la == lb,
        (None, Some(_)) => false,
    };
    if compatible {
        Ok(())
    } else {
        expr_err("incompatible string literal arguments")
    }
}

/// Result literal carrying the first argument's language tag.
fn derived(from: &Literal, value: String) -> Term {
    match &from.language {
        Some(lang) => Term::lang_literal(value, lang.as_ref()),
        None => Term::literal(value),
    }
}

fn integer_arg(term: &Term) -> Result<i64> {
    match super::numeric::parse(term)? {
        super::numeric::Numeric::Integer(v) => Ok(v),
        other => Ok(other.as_f64().round() as i64),
    }
}

fn build_regex(pattern: &Term, flags: Option<&Term>) -> Result<Regex> {
    let pattern = string_literal(pattern)?;
    let mut expr = String::new();
    if let Some(flags) = flags {
        let flags = string_literal(flags)?;
        if !flags.value.is_empty() {
            for flag in flags.value.chars() {
                if !matches!(flag, 'i' | 's' | 'm' | 'x') {
                    return expr_err(format!("unsupported regex flag `{flag}`"));
                }
            }
            expr.push_str(&format!("(?{})", flags.value));
        }
    }
    expr.push_str(&pattern.value);
    Regex::new(&expr).map_err(|e| QueryError::expression(format!("bad regex: {e}")))
}

/// Strict string built-ins.
pub fn call(name: &str, args: &[Term]) -> Result<Term> {
    match (name, args) {
        ("strlen", [s]) => Ok(Term::integer(string_literal(s)?.value.chars().count() as i64)),
        ("ucase", [s]) => {
            let lit = string_literal(s)?;
            Ok(derived(lit, lit.value.to_uppercase()))
        }
        ("lcase", [s]) => {
            let lit = string_literal(s)?;
            Ok(derived(lit, lit.value.to_lowercase()))
        }
        ("substr", [s, start]) => substr(s, start, None),
        ("substr", [s, start, len]) => substr(s, start, Some(len)),
        ("strstarts", [a, b]) => {
            let (la, lb) = (string_literal(a)?, string_literal(b)?);
            check_compatible(la, lb)?;
            Ok(Term::boolean(la.value.starts_with(lb.value.as_ref())))
        }
        ("strends", [a, b]) => {
            let (la, lb) = (string_literal(a)?, string_literal(b)?);
            check_compatible(la, lb)?;
            Ok(Term::boolean(la.value.ends_with(lb.value.as_ref())))
        }
        ("contains", [a, b]) => {
            let (la, lb) = (string_literal(a)?, string_literal(b)?);
            check_compatible(la, lb)?;
            Ok(Term::boolean(la.value.contains(lb.value.as_ref())))
        }
        ("strbefore", [a, b]) => {
            let (la, lb) = (string_literal(a)?, string_literal(b)?);
            check_compatible(la, lb)?;
            match la.value.find(lb.value.as_ref()) {
                Some(index) => Ok(derived(la, la.value[..index].to_string())),
                None => Ok(Term::literal("")),
            }
        }
        ("strafter", [a, b]) => {
            let (la, lb) = (string_literal(a)?, string_literal(b)?);
            check_compatible(la, lb)?;
            match la.value.find(lb.value.as_ref()) {
                Some(index) => Ok(derived(la, la.value[index + lb.value.len()..].to_string())),
                None => Ok(Term::literal("")),
            }
        }
        ("encode_for_uri", [s]) => {
            let lit = string_literal(s)?;
            Ok(Term::literal(
                utf8_percent_encode(&lit.value, ENCODE_SET).to_string(),
            ))
        }
        ("concat", parts) => concat(parts),
        ("regex", [text, pattern]) => regex_match(text, pattern, None),
        ("regex", [text, pattern, flags]) => regex_match(text, pattern, Some(flags)),
        ("replace", [text, pattern, replacement]) => replace(text, pattern, replacement, None),
        ("replace", [text, pattern, replacement, flags]) => {
            replace(text, pattern, replacement, Some(flags))
        }
        _ => expr_err(format!(
            "bad arguments for string function `{name}` ({} given)",
            args.len()
        )),
    }
}

/// SUBSTR with SPARQL's 1-based indexing in characters.
fn substr(s: &Term, start: &Term, len: Option<&Term>) -> Result<Term> {
    let lit = string_literal(s)?;
    let start = integer_arg(start)?;
    let chars: Vec<char> = lit.value.chars().collect();
    let begin = (start - 1).max(0) as usize;
    let taken: String = match len {
        Some(len) => {
            let len = integer_arg(len)?.max(0) as usize;
            // Negative start eats into the length, per the XPath rules.
            let cut = if start < 1 {
                len.saturating_sub((1 - start) as usize)
            } else {
                len
            };
            chars.iter().skip(begin).take(cut).collect()
        }
        None => chars.iter().skip(begin).collect(),
    };
    Ok(derived(lit, taken))
}

fn concat(parts: &[Term]) -> Result<Term> {
    let mut value = String::new();
    let mut shared_lang: Option<Option<&str>> = None;
    for part in parts {
        let lit = string_literal(part)?;
        value.push_str(&lit.value);
        let lang = lit.language.as_deref();
        match &shared_lang {
            None => shared_lang = Some(lang),
            Some(existing) if *existing == lang => {}
            Some(_) => shared_lang = Some(None),
        }
    }
    Ok(match shared_lang.flatten() {
        Some(lang) => Term::lang_literal(value, lang),
        None => Term::literal(value),
    })
}

fn regex_match(text: &Term, pattern: &Term, flags: Option<&Term>) -> Result<Term> {
    let text = string_literal(text)?;
    let regex = build_regex(pattern, flags)?;
    Ok(Term::boolean(regex.is_match(&text.value)))
}

fn replace(text: &Term, pattern: &Term, replacement: &Term, flags: Option<&Term>) -> Result<Term> {
    let lit = string_literal(text)?;
    let replacement = string_literal(replacement)?;
    let regex = build_regex(pattern, flags)?;
    let replaced = regex.replace_all(&lit.value, replacement.value.as_ref());
    Ok(derived(lit, replaced.into_owned()))
}

/// STRDT / STRLANG live here although they build typed terms, since
/// their first operand is string-shaped.
pub fn strdt(lexical: &Term, datatype: &Term) -> Result<Term> {
    let lit = string_literal(lexical)?;
    if lit.language.is_some() || lit.datatype.as_ref() != xsd::STRING {
        return expr_err("STRDT expects a simple literal");
    }
    match datatype {
        Term::Iri(iri) => Ok(Term::typed_literal(lit.value.as_ref(), iri.as_ref())),
        other => expr_err(format!("STRDT datatype is not an IRI: {other}")),
    }
}

pub fn strlang(lexical: &Term, tag: &Term) -> Result<Term> {
    let lit = string_literal(lexical)?;
    if lit.language.is_some() || lit.datatype.as_ref() != xsd::STRING {
        return expr_err("STRLANG expects a simple literal");
    }
    let tag = string_literal(tag)?;
    Ok(Term::lang_literal(lit.value.as_ref(), tag.value.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ucase_preserves_language() {
        let result = call("ucase", &[Term::lang_literal("foo", "en")]).unwrap();
        assert_eq!(result, Term::lang_literal("FOO", "en"));
    }

    #[test]
    fn test_substr_one_based() {
        let result = call("substr", &[Term::literal("motor"), Term::integer(2)]).unwrap();
        assert_eq!(result, Term::literal("otor"));
        let result = call(
            "substr",
            &[Term::literal("motor"), Term::integer(2), Term::integer(3)],
        )
        .unwrap();
        assert_eq!(result, Term::literal("oto"));
    }

    #[test]
    fn test_contains_compatibility() {
        assert!(call(
            "contains",
            &[Term::literal("abc"), Term::lang_literal("b", "en")]
        )
        .is_err());
        let result = call(
            "contains",
            &[Term::lang_literal("abc", "en"), Term::literal("b")],
        )
        .unwrap();
        assert_eq!(result, Term::boolean(true));
    }

    #[test]
    fn test_regex_with_flags() {
        let result = call(
            "regex",
            &[
                Term::literal("Thomas"),
                Term::literal("^tho"),
                Term::literal("i"),
            ],
        )
        .unwrap();
        assert_eq!(result, Term::boolean(true));
    }
}
