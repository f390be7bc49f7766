//! Full-text search magic triples.
//!
//! A keyword search is written as ordinary triple patterns under the
//! reserved search namespace, grouped by the searched variable:
//!
//! ```sparql
//! ?title rivulet:search "neural networks" .
//! ?title rivulet:minRelevance "0.25" .
//! ?title rivulet:relevance ?score .
//! ```
//!
//! The BGP stage extracts these into [`FullTextQuery`] values (one per
//! searched variable, carrying the real triple pattern the variable
//! appears in) and applies them as join stages after BGP evaluation.

use crate::error::{QueryError, Result};
use rivulet_core::{FullTextOptions, Predicate, Term, TriplePattern};
use std::sync::Arc;

/// Reserved namespace for search predicates.
pub const SEARCH_NAMESPACE: &str = "https://rivulet-rdf.dev/search#";

/// One extracted keyword search.
#[derive(Debug, Clone)]
pub struct FullTextQuery {
    /// The real triple pattern the searched variable appears in.
    pub pattern: TriplePattern,
    /// The searched variable.
    pub variable: Arc<str>,
    pub keywords: Vec<String>,
    pub options: FullTextOptions,
    /// Bind the relevance score (`xsd:float`) to this variable.
    pub score_variable: Option<Arc<str>>,
    /// Bind the 0-based rank (`xsd:integer`) to this variable.
    pub rank_variable: Option<Arc<str>>,
}

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(QueryError::InvalidQuery(msg.into()))
}

fn literal_value<'a>(triple: &'a TriplePattern, what: &str) -> Result<&'a str> {
    match &triple.object {
        Term::Literal(lit) => Ok(&lit.value),
        other => invalid(format!("{what} expects a literal object, got {other}")),
    }
}

fn float_value(triple: &TriplePattern, what: &str) -> Result<f64> {
    let text = literal_value(triple, what)?;
    text.parse()
        .map_err(|_| QueryError::InvalidQuery(format!("{what} is not a number: {text}")))
}

fn rank_value(triple: &TriplePattern, what: &str) -> Result<usize> {
    let text = literal_value(triple, what)?;
    text.parse()
        .map_err(|_| QueryError::InvalidQuery(format!("{what} is not a non-negative integer: {text}")))
}

fn variable_object(triple: &TriplePattern, what: &str) -> Result<Arc<str>> {
    match &triple.object {
        Term::Variable(name) => Ok(name.clone()),
        other => invalid(format!("{what} expects a variable object, got {other}")),
    }
}

/// Split a BGP into classic triples and full-text queries.
pub fn extract(triples: Vec<TriplePattern>) -> Result<(Vec<TriplePattern>, Vec<FullTextQuery>)> {
    let mut classic = Vec::new();
    let mut magic: Vec<(Arc<str>, TriplePattern)> = Vec::new();
    for triple in triples {
        let is_magic = matches!(
            &triple.predicate,
            Predicate::Term(Term::Iri(iri)) if iri.starts_with(SEARCH_NAMESPACE)
        );
        if !is_magic {
            classic.push(triple);
            continue;
        }
        match &triple.subject {
            Term::Variable(name) => magic.push((name.clone(), triple)),
            other => {
                return invalid(format!(
                    "search magic triple subject is not a variable: {other}"
                ))
            }
        }
    }
    if magic.is_empty() {
        return Ok((classic, Vec::new()));
    }

    let mut queries = Vec::new();
    let mut grouped: Vec<(Arc<str>, Vec<TriplePattern>)> = Vec::new();
    for (variable, triple) in magic {
        match grouped.iter_mut().find(|(v, _)| *v == variable) {
            Some((_, list)) => list.push(triple),
            None => grouped.push((variable, vec![triple])),
        }
    }

    for (variable, magic_triples) in grouped {
        // The real pattern the searched variable appears in leaves the
        // classic BGP; the search joins its matches back in.
        let position = classic
            .iter()
            .position(|t| t.variables().contains(&variable));
        let Some(position) = position else {
            return invalid(format!(
                "searched variable ?{variable} does not appear in any triple pattern"
            ));
        };
        let pattern = classic.remove(position);

        let mut query = FullTextQuery {
            pattern,
            variable: variable.clone(),
            keywords: Vec::new(),
            options: FullTextOptions::default(),
            score_variable: None,
            rank_variable: None,
        };
        for triple in &magic_triples {
            let Predicate::Term(Term::Iri(predicate)) = &triple.predicate else {
                unreachable!("magic triples carry IRI predicates");
            };
            match &predicate[SEARCH_NAMESPACE.len()..] {
                "search" => {
                    let text = literal_value(triple, "search")?;
                    query
                        .keywords
                        .extend(text.split_whitespace().map(str::to_string));
                }
                "matchAllTerms" => {
                    query.options.match_all = literal_value(triple, "matchAllTerms")? == "true";
                }
                "minRelevance" => {
                    query.options.min_score = Some(float_value(triple, "minRelevance")?)
                }
                "maxRelevance" => {
                    query.options.max_score = Some(float_value(triple, "maxRelevance")?)
                }
                "minRank" => query.options.min_rank = Some(rank_value(triple, "minRank")?),
                "maxRank" => query.options.max_rank = Some(rank_value(triple, "maxRank")?),
                "relevance" => query.score_variable = Some(variable_object(triple, "relevance")?),
                "rank" => query.rank_variable = Some(variable_object(triple, "rank")?),
                other => return invalid(format!("unknown search predicate `{other}`")),
            }
        }
        if query.keywords.is_empty() {
            return invalid(format!("?{variable}: search requires at least one keyword"));
        }
        if let (Some(min), Some(max)) = (query.options.min_score, query.options.max_score) {
            if min > max {
                return invalid("minRelevance exceeds maxRelevance");
            }
        }
        if let (Some(min), Some(max)) = (query.options.min_rank, query.options.max_rank) {
            if min > max {
                return invalid("minRank exceeds maxRank");
            }
        }
        queries.push(query);
    }
    Ok((classic, queries))
}
