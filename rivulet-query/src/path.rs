//! Property-path evaluation via Glushkov automata.
//!
//! A path expression is normalized (inverses pushed down to links),
//! linearized into positions, and compiled into a Glushkov automaton:
//! `first`/`last`/`follow` sets over positions, each position carrying
//! a predicate symbol and a traversal direction. Evaluation alternates
//! automaton state advancement with single-step `find` lookups,
//! breadth first, with a visited set per source binding for cycle
//! detection (optionally depth-bounded by option or hint).

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::hints;
use crate::pipeline::{self, SolutionStream};
use futures::StreamExt;
use rivulet_core::{
    Bindings, Graph, NegatedLink, Predicate, PropertyPath, Term, TriplePattern,
};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;

/// One linearized path symbol.
#[derive(Debug, Clone)]
enum Symbol {
    /// Follow (or, inverted, arrive by) this predicate.
    Link { iri: Arc<str>, inverse: bool },
    /// Negated property set: traverse forward edges whose predicate is
    /// not in `forward`, and backward edges whose predicate is not in
    /// `inverse`; a `None` side is not traversed at all.
    Negated {
        forward: Option<Vec<Arc<str>>>,
        inverse: Option<Vec<Arc<str>>>,
    },
}

/// Normalized path: inverses appear only on atoms.
enum Norm {
    Atom(Symbol),
    Seq(Vec<Norm>),
    Alt(Vec<Norm>),
    Star(Box<Norm>),
    Plus(Box<Norm>),
    Opt(Box<Norm>),
}

fn negated_symbol(links: &[NegatedLink], inverted: bool) -> Symbol {
    let mut forward: Option<Vec<Arc<str>>> = None;
    let mut inverse: Option<Vec<Arc<str>>> = None;
    for link in links {
        let side = if link.inverse != inverted {
            &mut inverse
        } else {
            &mut forward
        };
        side.get_or_insert_with(Vec::new).push(link.iri.clone());
    }
    Symbol::Negated { forward, inverse }
}

/// Push inverse operators down to the atoms; `^(a/b)` becomes `^b/^a`.
fn normalize(path: &PropertyPath, inverted: bool) -> Norm {
    match path {
        PropertyPath::Link(iri) => Norm::Atom(Symbol::Link {
            iri: iri.clone(),
            inverse: inverted,
        }),
        PropertyPath::Inverse(inner) => normalize(inner, !inverted),
        PropertyPath::Sequence(items) => {
            let mut parts: Vec<Norm> = items.iter().map(|p| normalize(p, inverted)).collect();
            if inverted {
                parts.reverse();
            }
            Norm::Seq(parts)
        }
        PropertyPath::Alternative(items) => {
            Norm::Alt(items.iter().map(|p| normalize(p, inverted)).collect())
        }
        PropertyPath::ZeroOrMore(inner) => Norm::Star(Box::new(normalize(inner, inverted))),
        PropertyPath::OneOrMore(inner) => Norm::Plus(Box::new(normalize(inner, inverted))),
        PropertyPath::ZeroOrOne(inner) => Norm::Opt(Box::new(normalize(inner, inverted))),
        PropertyPath::NegatedPropertySet(links) => Norm::Atom(negated_symbol(links, inverted)),
    }
}

/// A compiled Glushkov automaton.
pub struct PathAutomaton {
    symbols: Vec<Symbol>,
    first: Vec<usize>,
    last: FxHashSet<usize>,
    follow: Vec<Vec<usize>>,
    nullable: bool,
}

/// first/last/nullable of one subexpression during construction.
struct Frag {
    nullable: bool,
    first: Vec<usize>,
    last: Vec<usize>,
}

struct Builder {
    symbols: Vec<Symbol>,
    follow: Vec<Vec<usize>>,
}

impl Builder {
    fn position(&mut self, symbol: Symbol) -> Frag {
        let id = self.symbols.len();
        self.symbols.push(symbol);
        self.follow.push(Vec::new());
        Frag {
            nullable: false,
            first: vec![id],
            last: vec![id],
        }
    }

    fn connect(&mut self, from: &[usize], to: &[usize]) {
        for &p in from {
            for &q in to {
                if !self.follow[p].contains(&q) {
                    self.follow[p].push(q);
                }
            }
        }
    }

    fn build(&mut self, norm: &Norm) -> Frag {
        match norm {
            Norm::Atom(symbol) => self.position(symbol.clone()),
            Norm::Seq(parts) => {
                let mut frag = Frag {
                    nullable: true,
                    first: Vec::new(),
                    last: Vec::new(),
                };
                for part in parts {
                    let next = self.build(part);
                    self.connect(&frag.last, &next.first);
                    if frag.nullable {
                        frag.first.extend_from_slice(&next.first);
                    }
                    if next.nullable {
                        frag.last.extend_from_slice(&next.last);
                    } else {
                        frag.last = next.last;
                    }
                    frag.nullable = frag.nullable && next.nullable;
                }
                frag
            }
            Norm::Alt(parts) => {
                let mut frag = Frag {
                    nullable: false,
                    first: Vec::new(),
                    last: Vec::new(),
                };
                for part in parts {
                    let branch = self.build(part);
                    frag.nullable = frag.nullable || branch.nullable;
                    frag.first.extend_from_slice(&branch.first);
                    frag.last.extend_from_slice(&branch.last);
                }
                frag
            }
            Norm::Star(inner) => {
                let mut frag = self.build(inner);
                self.connect(&frag.last.clone(), &frag.first.clone());
                frag.nullable = true;
                frag
            }
            Norm::Plus(inner) => {
                let frag = self.build(inner);
                self.connect(&frag.last.clone(), &frag.first.clone());
                frag
            }
            Norm::Opt(inner) => {
                let mut frag = self.build(inner);
                frag.nullable = true;
                frag
            }
        }
    }
}

impl PathAutomaton {
    /// Compile a path expression.
    pub fn compile(path: &PropertyPath) -> Self {
        Self::from_norm(normalize(path, false))
    }

    /// Compile the reversed path (object-to-subject walks).
    pub fn compile_reversed(path: &PropertyPath) -> Self {
        Self::from_norm(normalize(path, true))
    }

    fn from_norm(norm: Norm) -> Self {
        let mut builder = Builder {
            symbols: Vec::new(),
            follow: Vec::new(),
        };
        let frag = builder.build(&norm);
        PathAutomaton {
            symbols: builder.symbols,
            first: frag.first,
            last: frag.last.into_iter().collect(),
            follow: builder.follow,
            nullable: frag.nullable,
        }
    }

    /// Zero-length walks are accepted.
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    fn targets(&self, state: Option<usize>) -> &[usize] {
        match state {
            None => &self.first,
            Some(position) => &self.follow[position],
        }
    }

    fn accepting(&self, state: Option<usize>) -> bool {
        match state {
            None => self.nullable,
            Some(position) => self.last.contains(&position),
        }
    }
}

const STEP_VAR: &str = "__path_step";

/// One automaton step from `node` through `symbol`.
async fn step(
    graph: &Arc<dyn Graph>,
    symbol: &Symbol,
    node: &Term,
) -> Result<Vec<Term>> {
    let mut out = Vec::new();
    match symbol {
        Symbol::Link { iri, inverse } => {
            let pattern = if *inverse {
                TriplePattern::new(Term::var(STEP_VAR), Term::iri(iri.as_ref()), node.clone())
            } else {
                TriplePattern::new(node.clone(), Term::iri(iri.as_ref()), Term::var(STEP_VAR))
            };
            let mut found = graph.find(&pattern).await?;
            while let Some(item) = found.next().await {
                let triple = item?;
                out.push(if *inverse {
                    triple.subject
                } else {
                    triple.object
                });
            }
        }
        Symbol::Negated { forward, inverse } => {
            if let Some(excluded) = forward {
                let pattern =
                    TriplePattern::new(node.clone(), Term::var("__path_p"), Term::var(STEP_VAR));
                let mut found = graph.find(&pattern).await?;
                while let Some(item) = found.next().await {
                    let triple = item?;
                    let skip = matches!(&triple.predicate, Term::Iri(p) if excluded.contains(p));
                    if !skip {
                        out.push(triple.object);
                    }
                }
            }
            if let Some(excluded) = inverse {
                let pattern =
                    TriplePattern::new(Term::var(STEP_VAR), Term::var("__path_p"), node.clone());
                let mut found = graph.find(&pattern).await?;
                while let Some(item) = found.next().await {
                    let triple = item?;
                    let skip = matches!(&triple.predicate, Term::Iri(p) if excluded.contains(p));
                    if !skip {
                        out.push(triple.subject);
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Breadth-first walk from `start`; returns the distinct accepting
/// endpoints. `max_depth` bounds the number of automaton steps.
async fn walk(
    graph: &Arc<dyn Graph>,
    automaton: &PathAutomaton,
    start: &Term,
    max_depth: Option<usize>,
) -> Result<Vec<Term>> {
    let mut endpoints: Vec<Term> = Vec::new();
    let mut seen_endpoints: FxHashSet<String> = FxHashSet::default();
    let mut visited: FxHashSet<(String, Option<usize>)> = FxHashSet::default();
    let mut queue: VecDeque<(Term, Option<usize>, usize)> = VecDeque::new();

    visited.insert((start.to_string(), None));
    queue.push_back((start.clone(), None, 0));
    if automaton.accepting(None) && seen_endpoints.insert(start.to_string()) {
        endpoints.push(start.clone());
    }

    while let Some((node, state, depth)) = queue.pop_front() {
        if let Some(limit) = max_depth {
            if depth >= limit {
                continue;
            }
        }
        for &position in automaton.targets(state) {
            let symbol = &automaton.symbols[position];
            for next in step(graph, symbol, &node).await? {
                if automaton.accepting(Some(position))
                    && seen_endpoints.insert(next.to_string())
                {
                    endpoints.push(next.clone());
                }
                if visited.insert((next.to_string(), Some(position))) {
                    queue.push_back((next, Some(position), depth + 1));
                }
            }
        }
    }
    Ok(endpoints)
}

/// Distinct subject and object terms of the graph; the candidate
/// sources when both path endpoints are unbound.
async fn graph_nodes(graph: &Arc<dyn Graph>) -> Result<Vec<Term>> {
    let pattern = TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"));
    let mut found = graph.find(&pattern).await?;
    let mut nodes = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    while let Some(item) = found.next().await {
        let triple = item?;
        for term in [triple.subject, triple.object] {
            if seen.insert(term.to_string()) {
                nodes.push(term);
            }
        }
    }
    Ok(nodes)
}

/// Join a path pattern into the solution stream: for each input
/// mapping, produce one extension per accepting walk between the
/// (possibly bound) endpoints.
pub fn join(
    source: SolutionStream,
    graph: Arc<dyn Graph>,
    pattern: TriplePattern,
    ctx: Arc<ExecutionContext>,
) -> SolutionStream {
    let Predicate::Path(path) = pattern.predicate.clone() else {
        return pipeline::once_err(QueryError::InvalidQuery(
            "path stage got a plain predicate".into(),
        ));
    };
    let forward = Arc::new(PathAutomaton::compile(&path));
    let backward = Arc::new(PathAutomaton::compile_reversed(&path));
    let subject = pattern.subject.clone();
    let object = pattern.object.clone();

    pipeline::flat_map(source, move |mu| {
        let graph = graph.clone();
        let forward = forward.clone();
        let backward = backward.clone();
        let max_depth = hints::integer_hint(&ctx, hints::HINT_MAX_PATH_DEPTH)
            .or(ctx.options.max_path_depth);
        let subject = resolve_endpoint(&subject, &mu);
        let object = resolve_endpoint(&object, &mu);
        let input = mu.clone();
        pipeline::from_async(async move {
            let rows = eval_endpoints(
                &graph, &forward, &backward, &subject, &object, max_depth,
            )
            .await?;
            let extended = rows.into_iter().map(move |row| input.union(&row));
            Ok(pipeline::from_iter(extended.collect::<Vec<_>>()))
        })
    })
}

/// An endpoint is either a bound term or a variable to bind.
enum Endpoint {
    Bound(Term),
    Free(Arc<str>),
}

fn resolve_endpoint(term: &Term, mu: &Bindings) -> Endpoint {
    match term {
        Term::Variable(name) => match mu.get(name) {
            Some(value) if !value.is_unbound() => Endpoint::Bound(value.clone()),
            _ => Endpoint::Free(name.clone()),
        },
        other => Endpoint::Bound(other.clone()),
    }
}

async fn eval_endpoints(
    graph: &Arc<dyn Graph>,
    forward: &PathAutomaton,
    backward: &PathAutomaton,
    subject: &Endpoint,
    object: &Endpoint,
    max_depth: Option<usize>,
) -> Result<Vec<Bindings>> {
    match (subject, object) {
        (Endpoint::Bound(s), Endpoint::Bound(o)) => {
            let reachable = walk(graph, forward, s, max_depth).await?;
            Ok(if reachable.contains(o) {
                vec![Bindings::new()]
            } else {
                Vec::new()
            })
        }
        (Endpoint::Bound(s), Endpoint::Free(object_var)) => {
            let reachable = walk(graph, forward, s, max_depth).await?;
            Ok(reachable
                .into_iter()
                .map(|end| {
                    let mut row = Bindings::new();
                    row.insert(object_var.clone(), end);
                    row
                })
                .collect())
        }
        (Endpoint::Free(subject_var), Endpoint::Bound(o)) => {
            // Walk the reversed automaton from the object.
            let reachable = walk(graph, backward, o, max_depth).await?;
            Ok(reachable
                .into_iter()
                .map(|end| {
                    let mut row = Bindings::new();
                    row.insert(subject_var.clone(), end);
                    row
                })
                .collect())
        }
        (Endpoint::Free(subject_var), Endpoint::Free(object_var)) => {
            let mut rows = Vec::new();
            for start in graph_nodes(graph).await? {
                for end in walk(graph, forward, &start, max_depth).await? {
                    if subject_var == object_var && start != end {
                        continue;
                    }
                    let mut row = Bindings::new();
                    row.insert(subject_var.clone(), start.clone());
                    row.insert(object_var.clone(), end);
                    rows.push(row);
                }
            }
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(iri: &str) -> PropertyPath {
        PropertyPath::link(iri)
    }

    #[test]
    fn test_sequence_automaton_shape() {
        let path = PropertyPath::Sequence(vec![link("urn:a"), link("urn:b")]);
        let automaton = PathAutomaton::compile(&path);
        assert!(!automaton.nullable());
        assert_eq!(automaton.first, vec![0]);
        assert!(automaton.last.contains(&1));
        assert_eq!(automaton.follow[0], vec![1]);
        assert!(automaton.follow[1].is_empty());
    }

    #[test]
    fn test_star_is_nullable_and_loops() {
        let path = PropertyPath::ZeroOrMore(Box::new(link("urn:a")));
        let automaton = PathAutomaton::compile(&path);
        assert!(automaton.nullable());
        assert_eq!(automaton.follow[0], vec![0]);
    }

    #[test]
    fn test_inverse_of_sequence_reverses_order() {
        let path = PropertyPath::Inverse(Box::new(PropertyPath::Sequence(vec![
            link("urn:a"),
            link("urn:b"),
        ])));
        let automaton = PathAutomaton::compile(&path);
        // ^(a/b) = ^b/^a: the first position must be the inverted b.
        match &automaton.symbols[automaton.first[0]] {
            Symbol::Link { iri, inverse } => {
                assert_eq!(iri.as_ref(), "urn:b");
                assert!(*inverse);
            }
            other => panic!("unexpected symbol {other:?}"),
        }
    }

    #[test]
    fn test_negated_set_sides() {
        let path = PropertyPath::NegatedPropertySet(vec![
            NegatedLink {
                iri: Arc::from("urn:a"),
                inverse: false,
            },
            NegatedLink {
                iri: Arc::from("urn:b"),
                inverse: true,
            },
        ]);
        let automaton = PathAutomaton::compile(&path);
        match &automaton.symbols[0] {
            Symbol::Negated { forward, inverse } => {
                assert_eq!(forward.as_deref(), Some(&[Arc::<str>::from("urn:a")][..]));
                assert_eq!(inverse.as_deref(), Some(&[Arc::<str>::from("urn:b")][..]));
            }
            other => panic!("unexpected symbol {other:?}"),
        }
    }

    #[test]
    fn test_alternative_merges_first_sets() {
        let path = PropertyPath::Alternative(vec![link("urn:a"), link("urn:b")]);
        let automaton = PathAutomaton::compile(&path);
        assert_eq!(automaton.first.len(), 2);
        assert_eq!(automaton.last.len(), 2);
    }
}
