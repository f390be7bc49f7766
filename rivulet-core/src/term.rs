//! RDF term types.
//!
//! Terms are the atoms of the data model: IRIs, blank nodes, literals,
//! and query variables, plus the synthetic [`Term::Unbound`] sentinel
//! produced when expression evaluation fails inside a BIND.
//!
//! The `Display` rendering is canonical N-Triples and doubles as the
//! engine-wide canonical form: DISTINCT, aggregate deduplication, and
//! cache keys all compare terms through it.

use crate::vocab::{rdf, xsd};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An RDF literal: lexical form, datatype IRI, optional language tag.
///
/// A plain literal carries `xsd:string`; a language-tagged literal
/// carries `rdf:langString` and its tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    /// Lexical form
    pub value: Arc<str>,
    /// Datatype IRI
    pub datatype: Arc<str>,
    /// Language tag, lowercase (only for `rdf:langString`)
    pub language: Option<Arc<str>>,
}

impl Literal {
    /// Create a plain `xsd:string` literal.
    pub fn string(value: impl AsRef<str>) -> Self {
        Self {
            value: Arc::from(value.as_ref()),
            datatype: Arc::from(xsd::STRING),
            language: None,
        }
    }

    /// Create a typed literal.
    pub fn typed(value: impl AsRef<str>, datatype: impl AsRef<str>) -> Self {
        Self {
            value: Arc::from(value.as_ref()),
            datatype: Arc::from(datatype.as_ref()),
            language: None,
        }
    }

    /// Create a language-tagged string.
    pub fn lang(value: impl AsRef<str>, language: impl AsRef<str>) -> Self {
        Self {
            value: Arc::from(value.as_ref()),
            datatype: Arc::from(rdf::LANG_STRING),
            language: Some(Arc::from(language.as_ref().to_ascii_lowercase().as_str())),
        }
    }

    /// True for `xsd:string` and `rdf:langString` literals.
    pub fn is_string(&self) -> bool {
        self.datatype.as_ref() == xsd::STRING || self.datatype.as_ref() == rdf::LANG_STRING
    }
}

/// An RDF term, query variable, or the unbound sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// IRI reference
    Iri(Arc<str>),
    /// Blank node identifier (without the `_:` prefix)
    BlankNode(Arc<str>),
    /// Literal value
    Literal(Literal),
    /// Query variable name (without the `?`/`$` prefix)
    Variable(Arc<str>),
    /// Sentinel bound by BIND when expression evaluation fails.
    ///
    /// Distinct from a variable being absent from a mapping's domain;
    /// renders as the literal `"UNBOUND"`.
    Unbound,
}

impl Term {
    /// Create an IRI term.
    pub fn iri(value: impl AsRef<str>) -> Self {
        Term::Iri(Arc::from(value.as_ref()))
    }

    /// Create a blank node term.
    pub fn blank(id: impl AsRef<str>) -> Self {
        Term::BlankNode(Arc::from(id.as_ref()))
    }

    /// Create a plain string literal term.
    pub fn literal(value: impl AsRef<str>) -> Self {
        Term::Literal(Literal::string(value))
    }

    /// Create a typed literal term.
    pub fn typed_literal(value: impl AsRef<str>, datatype: impl AsRef<str>) -> Self {
        Term::Literal(Literal::typed(value, datatype))
    }

    /// Create a language-tagged literal term.
    pub fn lang_literal(value: impl AsRef<str>, language: impl AsRef<str>) -> Self {
        Term::Literal(Literal::lang(value, language))
    }

    /// Create a variable term.
    pub fn var(name: impl AsRef<str>) -> Self {
        Term::Variable(Arc::from(name.as_ref()))
    }

    /// Create an `xsd:integer` literal term.
    pub fn integer(value: i64) -> Self {
        Term::Literal(Literal::typed(value.to_string(), xsd::INTEGER))
    }

    /// Create an `xsd:double` literal term.
    pub fn double(value: f64) -> Self {
        Term::Literal(Literal::typed(value.to_string(), xsd::DOUBLE))
    }

    /// Create an `xsd:float` literal term.
    pub fn float(value: f64) -> Self {
        Term::Literal(Literal::typed(value.to_string(), xsd::FLOAT))
    }

    /// Create an `xsd:boolean` literal term.
    pub fn boolean(value: bool) -> Self {
        Term::Literal(Literal::typed(if value { "true" } else { "false" }, xsd::BOOLEAN))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, Term::Unbound)
    }

    /// Variable name, if this is a variable.
    pub fn as_variable(&self) -> Option<&Arc<str>> {
        match self {
            Term::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// IRI value, if this is an IRI.
    pub fn as_iri(&self) -> Option<&Arc<str>> {
        match self {
            Term::Iri(value) => Some(value),
            _ => None,
        }
    }

    /// Literal, if this is a literal.
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

fn escape_into(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            _ => fmt::Write::write_char(f, c)?,
        }
    }
    Ok(())
}

impl fmt::Display for Term {
    /// Canonical N-Triples rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(id) => write!(f, "_:{id}"),
            Term::Variable(name) => write!(f, "?{name}"),
            Term::Unbound => f.write_str("\"UNBOUND\""),
            Term::Literal(lit) => {
                f.write_str("\"")?;
                escape_into(f, &lit.value)?;
                f.write_str("\"")?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")
                } else if lit.datatype.as_ref() != xsd::STRING {
                    write!(f, "^^<{}>", lit.datatype)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Wire representation with the `termType` discriminator of §6.
#[derive(Serialize, Deserialize)]
#[serde(tag = "termType")]
enum TermRepr {
    NamedNode {
        value: String,
    },
    BlankNode {
        value: String,
    },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Variable {
        value: String,
    },
}

impl From<TermRepr> for Term {
    fn from(repr: TermRepr) -> Self {
        match repr {
            TermRepr::NamedNode { value } => Term::iri(value),
            TermRepr::BlankNode { value } => Term::blank(value),
            TermRepr::Variable { value } => Term::var(value),
            TermRepr::Literal {
                value,
                datatype,
                language,
            } => match (language, datatype) {
                (Some(lang), _) if !lang.is_empty() => Term::lang_literal(value, lang),
                (_, Some(dt)) => Term::typed_literal(value, dt),
                _ => Term::literal(value),
            },
        }
    }
}

impl From<Term> for TermRepr {
    fn from(term: Term) -> Self {
        match term {
            Term::Iri(value) => TermRepr::NamedNode {
                value: value.to_string(),
            },
            Term::BlankNode(value) => TermRepr::BlankNode {
                value: value.to_string(),
            },
            Term::Variable(value) => TermRepr::Variable {
                value: value.to_string(),
            },
            Term::Unbound => TermRepr::Literal {
                value: "UNBOUND".to_string(),
                datatype: None,
                language: None,
            },
            Term::Literal(lit) => TermRepr::Literal {
                value: lit.value.to_string(),
                language: lit.language.as_ref().map(|l| l.to_string()),
                datatype: if lit.language.is_some() || lit.datatype.as_ref() == xsd::STRING {
                    None
                } else {
                    Some(lit.datatype.to_string())
                },
            },
        }
    }
}

impl Serialize for Term {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TermRepr::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Term {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        TermRepr::deserialize(deserializer).map(Term::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_literal_rendering() {
        assert_eq!(Term::literal("hi").to_string(), "\"hi\"");
        assert_eq!(
            Term::lang_literal("Thomas", "EN").to_string(),
            "\"Thomas\"@en"
        );
        assert_eq!(
            Term::integer(42).to_string(),
            "\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
        assert_eq!(Term::literal("a\"b\n").to_string(), "\"a\\\"b\\n\"");
    }

    #[test]
    fn test_unbound_renders_as_literal() {
        assert_eq!(Term::Unbound.to_string(), "\"UNBOUND\"");
    }

    #[test]
    fn test_term_json_round_trip() {
        let json = serde_json::json!({ "termType": "NamedNode", "value": "http://ex.org/a" });
        let term: Term = serde_json::from_value(json).unwrap();
        assert_eq!(term, Term::iri("http://ex.org/a"));

        let json = serde_json::json!({ "termType": "Literal", "value": "x", "language": "en" });
        let term: Term = serde_json::from_value(json).unwrap();
        assert_eq!(term, Term::lang_literal("x", "en"));
    }
}
