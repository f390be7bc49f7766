//! Solution mappings.
//!
//! A [`Bindings`] value is the solution mapping µ of the SPARQL algebra:
//! a finite map from variable names to terms. Keys never carry the
//! `?` prefix; values are never variables (the [`Term::Unbound`]
//! sentinel is the one internal exception).
//!
//! Grouped rows produced by GROUP BY travel in an explicit
//! [`GroupSlice`] slot rather than a string-keyed property bag, so
//! aggregate evaluation is typed and `AggregationOutsideGroup` is just
//! "the slot is `None`".

use crate::term::Term;
use crate::triple::{Predicate, Triple, TriplePattern};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Collected rows of one GROUP BY group.
///
/// One term list per variable, row-aligned (`None` where the row left
/// the variable unbound), so aggregate expressions can be re-evaluated
/// per row. `len` is the number of rows in the group (the COUNT(*)
/// answer).
#[derive(Debug, Clone, Default)]
pub struct GroupSlice {
    columns: FxHashMap<Arc<str>, Vec<Option<Term>>>,
    len: usize,
}

impl GroupSlice {
    /// Collect a group from its member rows.
    pub fn from_rows(rows: &[Bindings]) -> Self {
        let mut columns: FxHashMap<Arc<str>, Vec<Option<Term>>> = FxHashMap::default();
        for (index, row) in rows.iter().enumerate() {
            for (var, term) in row.iter() {
                if term.is_unbound() {
                    continue;
                }
                let column = columns
                    .entry(var.clone())
                    .or_insert_with(|| vec![None; rows.len()]);
                column[index] = Some(term.clone());
            }
        }
        Self {
            columns,
            len: rows.len(),
        }
    }

    /// Bound terms collected for a variable, in row order.
    pub fn column(&self, variable: &str) -> Vec<Term> {
        self.columns
            .get(variable)
            .map(|col| col.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Reconstruct row `index` as a mapping over the bound variables.
    pub fn row(&self, index: usize) -> Bindings {
        let mut row = Bindings::new();
        for (var, column) in &self.columns {
            if let Some(Some(term)) = column.get(index) {
                row.insert(var.clone(), term.clone());
            }
        }
        row
    }

    /// Number of rows in the group.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A solution mapping µ: variable name → term.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: FxHashMap<Arc<str>, Term>,
    group: Option<Arc<GroupSlice>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(variable, term)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Arc<str>, Term)>) -> Self {
        Self {
            map: pairs.into_iter().collect(),
            group: None,
        }
    }

    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.map.get(variable)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.map.contains_key(variable)
    }

    /// Bind a variable, replacing any previous value.
    pub fn insert(&mut self, variable: impl Into<Arc<str>>, term: Term) {
        self.map.insert(variable.into(), term);
    }

    pub fn remove(&mut self, variable: &str) -> Option<Term> {
        self.map.remove(variable)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Term)> {
        self.map.iter()
    }

    /// Domain of the mapping.
    pub fn variables(&self) -> impl Iterator<Item = &Arc<str>> {
        self.map.keys()
    }

    /// Grouped rows, when this mapping represents a GROUP BY group.
    pub fn group(&self) -> Option<&Arc<GroupSlice>> {
        self.group.as_ref()
    }

    pub fn set_group(&mut self, group: Arc<GroupSlice>) {
        self.group = Some(group);
    }

    /// `self ∪ other`; on conflicting variables the right operand wins.
    pub fn union(&self, other: &Bindings) -> Bindings {
        let mut merged = self.clone();
        for (var, term) in other.iter() {
            merged.map.insert(var.clone(), term.clone());
        }
        if merged.group.is_none() {
            merged.group = other.group.clone();
        }
        merged
    }

    /// Compatible extension: `None` when the mappings disagree on a
    /// shared variable.
    pub fn merge(&self, other: &Bindings) -> Option<Bindings> {
        for (var, term) in other.iter() {
            if let Some(existing) = self.map.get(var) {
                if existing != term {
                    return None;
                }
            }
        }
        Some(self.union(other))
    }

    /// True when every binding of `self` is present in `other`.
    pub fn is_subset(&self, other: &Bindings) -> bool {
        self.iter().all(|(var, term)| other.get(var) == Some(term))
    }

    /// Bindings present, with equal terms, in both mappings.
    pub fn intersection(&self, other: &Bindings) -> Bindings {
        Bindings {
            map: self
                .iter()
                .filter(|(var, term)| other.get(var) == Some(term))
                .map(|(var, term)| (var.clone(), term.clone()))
                .collect(),
            group: None,
        }
    }

    /// Bindings of `self` absent from (or differing in) `other`.
    pub fn difference(&self, other: &Bindings) -> Bindings {
        Bindings {
            map: self
                .iter()
                .filter(|(var, term)| other.get(var) != Some(term))
                .map(|(var, term)| (var.clone(), term.clone()))
                .collect(),
            group: None,
        }
    }

    /// True when the mappings share at least one variable.
    pub fn shares_variable_with(&self, other: &Bindings) -> bool {
        self.map.keys().any(|var| other.contains(var))
    }

    /// Substitute the variables of a pattern that this mapping binds.
    ///
    /// The unbound sentinel never substitutes into patterns.
    pub fn bound(&self, pattern: &TriplePattern) -> TriplePattern {
        let substitute = |term: &Term| -> Term {
            if let Term::Variable(name) = term {
                match self.map.get(name.as_ref()) {
                    Some(value) if !value.is_variable() && !value.is_unbound() => value.clone(),
                    _ => term.clone(),
                }
            } else {
                term.clone()
            }
        };
        TriplePattern {
            subject: substitute(&pattern.subject),
            predicate: match &pattern.predicate {
                Predicate::Term(t) => Predicate::Term(substitute(t)),
                path @ Predicate::Path(_) => path.clone(),
            },
            object: substitute(&pattern.object),
        }
    }

    /// Instantiate a pattern into a concrete triple; `None` when any
    /// position stays variable or unbound.
    pub fn instantiate(&self, pattern: &TriplePattern) -> Option<Triple> {
        let bound = self.bound(pattern);
        let triple = Triple::new(
            bound.subject,
            bound.predicate.as_term()?.clone(),
            bound.object,
        );
        triple.is_ground().then_some(triple)
    }

    /// Canonical rendering: sorted `?var=term` pairs. The dedup key for
    /// DISTINCT and cache bookkeeping.
    pub fn canonical(&self) -> String {
        let mut pairs: Vec<String> = self
            .iter()
            .map(|(var, term)| format!("?{var}={term}"))
            .collect();
        pairs.sort_unstable();
        pairs.join(";")
    }

    /// Keep only the given variables.
    pub fn project(&self, variables: &[Arc<str>]) -> Bindings {
        Bindings {
            map: self
                .iter()
                .filter(|(var, _)| variables.iter().any(|keep| keep == *var))
                .map(|(var, term)| (var.clone(), term.clone()))
                .collect(),
            group: self.group.clone(),
        }
    }
}

impl PartialEq for Bindings {
    /// Same domain, pointwise-equal terms. Group state is evaluator
    /// plumbing and does not participate.
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl Eq for Bindings {}

impl FromIterator<(Arc<str>, Term)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Arc<str>, Term)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mu(pairs: &[(&str, Term)]) -> Bindings {
        pairs
            .iter()
            .map(|(v, t)| (Arc::<str>::from(*v), t.clone()))
            .collect()
    }

    #[test]
    fn test_union_right_overwrites() {
        let left = mu(&[("x", Term::integer(1)), ("y", Term::integer(2))]);
        let right = mu(&[("x", Term::integer(9))]);
        let merged = left.union(&right);
        assert_eq!(merged.get("x"), Some(&Term::integer(9)));
        assert_eq!(merged.get("y"), Some(&Term::integer(2)));
    }

    #[test]
    fn test_merge_rejects_conflicts() {
        let left = mu(&[("x", Term::integer(1))]);
        let right = mu(&[("x", Term::integer(2))]);
        assert!(left.merge(&right).is_none());
        assert!(left.merge(&left.clone()).is_some());
    }

    #[test]
    fn test_subset_and_difference() {
        let small = mu(&[("x", Term::integer(1))]);
        let big = mu(&[("x", Term::integer(1)), ("y", Term::integer(2))]);
        assert!(small.is_subset(&big));
        assert!(!big.is_subset(&small));
        assert_eq!(big.difference(&small), mu(&[("y", Term::integer(2))]));
        assert_eq!(big.intersection(&small), small);
    }

    #[test]
    fn test_bound_substitutes_only_bound_vars() {
        let pattern = TriplePattern::new(Term::var("s"), Term::iri("http://ex.org/p"), Term::var("o"));
        let input = mu(&[("s", Term::iri("http://ex.org/a"))]);
        let bound = input.bound(&pattern);
        assert_eq!(bound.subject, Term::iri("http://ex.org/a"));
        assert_eq!(bound.object, Term::var("o"));
    }

    #[test]
    fn test_group_slice_skips_unbound() {
        let rows = vec![
            mu(&[("x", Term::integer(1))]),
            mu(&[("x", Term::Unbound)]),
            mu(&[("y", Term::integer(3))]),
        ];
        let slice = GroupSlice::from_rows(&rows);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.column("x"), vec![Term::integer(1)]);
        assert_eq!(slice.column("y"), vec![Term::integer(3)]);
        assert!(slice.column("z").is_empty());
        assert_eq!(slice.row(0).get("x"), Some(&Term::integer(1)));
        assert!(slice.row(1).is_empty());
    }
}
