//! Triples, quads, and triple patterns.
//!
//! [`Triple`] and [`Quad`] are concrete data tuples produced by graphs
//! and update templates. [`TriplePattern`] is the query-side shape: any
//! position may hold a variable, and the predicate position may hold a
//! property path expression instead of a term.

use crate::term::Term;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A concrete RDF triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// True when no position holds a variable or the unbound sentinel.
    pub fn is_ground(&self) -> bool {
        !matches!(self.subject, Term::Variable(_) | Term::Unbound)
            && !matches!(self.predicate, Term::Variable(_) | Term::Unbound)
            && !matches!(self.object, Term::Variable(_) | Term::Unbound)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// A triple plus the graph it belongs to (`None` = default graph).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quad {
    pub triple: Triple,
    pub graph: Option<Arc<str>>,
}

impl Quad {
    pub fn new(triple: Triple, graph: Option<Arc<str>>) -> Self {
        Self { triple, graph }
    }
}

/// A single negated-property-set member: `!(:p | ^:q)` holds two of
/// these, the second with `inverse` set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NegatedLink {
    pub iri: Arc<str>,
    pub inverse: bool,
}

/// SPARQL 1.1 property path expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyPath {
    /// Plain predicate IRI
    Link(Arc<str>),
    /// `^path`
    Inverse(Box<PropertyPath>),
    /// `p1 / p2 / ...`
    Sequence(Vec<PropertyPath>),
    /// `p1 | p2 | ...`
    Alternative(Vec<PropertyPath>),
    /// `path*`
    ZeroOrMore(Box<PropertyPath>),
    /// `path+`
    OneOrMore(Box<PropertyPath>),
    /// `path?`
    ZeroOrOne(Box<PropertyPath>),
    /// `!(:p | ^:q | ...)`
    NegatedPropertySet(Vec<NegatedLink>),
}

impl PropertyPath {
    pub fn link(iri: impl AsRef<str>) -> Self {
        PropertyPath::Link(Arc::from(iri.as_ref()))
    }
}

/// Predicate position of a triple pattern: a term or a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    Term(Term),
    Path(PropertyPath),
}

impl Predicate {
    /// The plain term, if this is not a path.
    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Predicate::Term(t) => Some(t),
            Predicate::Path(_) => None,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, Predicate::Path(_))
    }
}

impl From<Term> for Predicate {
    fn from(term: Term) -> Self {
        Predicate::Term(term)
    }
}

/// A triple pattern; variables act as wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Predicate,
    pub object: Term,
}

impl TriplePattern {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate: Predicate::Term(predicate),
            object,
        }
    }

    pub fn with_path(subject: Term, path: PropertyPath, object: Term) -> Self {
        Self {
            subject,
            predicate: Predicate::Path(path),
            object,
        }
    }

    /// Variable names appearing in this pattern, in position order.
    pub fn variables(&self) -> Vec<Arc<str>> {
        let mut vars = Vec::new();
        if let Term::Variable(v) = &self.subject {
            vars.push(v.clone());
        }
        if let Predicate::Term(Term::Variable(v)) = &self.predicate {
            vars.push(v.clone());
        }
        if let Term::Variable(v) = &self.object {
            if !vars.contains(v) {
                vars.push(v.clone());
            }
        }
        vars
    }

    /// True when no position holds a variable.
    pub fn is_ground(&self) -> bool {
        self.variables().is_empty()
    }

    /// Match a concrete triple, treating variables as wildcards.
    ///
    /// Patterns with a path predicate never match directly; paths are
    /// evaluated by the path stage.
    pub fn matches(&self, triple: &Triple) -> bool {
        fn position_matches(pattern: &Term, data: &Term) -> bool {
            matches!(pattern, Term::Variable(_)) || pattern == data
        }
        let predicate = match &self.predicate {
            Predicate::Term(t) => t,
            Predicate::Path(_) => return false,
        };
        position_matches(&self.subject, &triple.subject)
            && position_matches(predicate, &triple.predicate)
            && position_matches(&self.object, &triple.object)
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::Term(p) => write!(f, "{} {} {}", self.subject, p, self.object),
            Predicate::Path(path) => {
                write!(f, "{} {:?} {}", self.subject, path, self.object)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_wildcards() {
        let pattern = TriplePattern::new(
            Term::var("s"),
            Term::iri("http://ex.org/p"),
            Term::var("o"),
        );
        let triple = Triple::new(
            Term::iri("http://ex.org/a"),
            Term::iri("http://ex.org/p"),
            Term::literal("x"),
        );
        assert!(pattern.matches(&triple));

        let other = Triple::new(
            Term::iri("http://ex.org/a"),
            Term::iri("http://ex.org/q"),
            Term::literal("x"),
        );
        assert!(!pattern.matches(&other));
    }

    #[test]
    fn test_pattern_variables_deduped() {
        let pattern = TriplePattern::new(Term::var("x"), Term::var("p"), Term::var("x"));
        assert_eq!(
            pattern.variables(),
            vec![Arc::<str>::from("x"), Arc::<str>::from("p")]
        );
    }
}
