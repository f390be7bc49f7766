//! The parsed-query algebra tree.
//!
//! An external SPARQL parser produces this tree (directly, or through
//! the JSON adapter in [`crate::parse`]); the plan builder walks it.
//! Node shapes follow the JSON tree of the engine contract: a `query`
//! node with modifiers, pattern nodes (`bgp`, `group`, `optional`,
//! `union`, `minus`, `graph`, `service`, `filter`, `bind`, `values`),
//! expression nodes, and update operations.

use crate::bindings::Bindings;
use crate::term::Term;
use crate::triple::{Quad, TriplePattern};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Query form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Construct,
    Ask,
    Describe,
}

/// One SELECT projection entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `SELECT *`
    Wildcard,
    /// `SELECT ?x`
    Variable(Arc<str>),
    /// `SELECT (expr AS ?x)`
    Expression {
        expression: Expression,
        variable: Arc<str>,
    },
}

/// FROM / FROM NAMED clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromClause {
    pub default: Vec<Arc<str>>,
    pub named: Vec<Arc<str>>,
}

/// One GROUP BY condition, optionally aliased (`GROUP BY (expr AS ?g)`).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupCondition {
    pub expression: Expression,
    pub variable: Option<Arc<str>>,
}

/// One ORDER BY comparator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderComparator {
    pub expression: Expression,
    pub descending: bool,
}

/// A parsed query.
#[derive(Debug, Clone)]
pub struct Query {
    pub query_type: QueryType,
    /// SELECT projection (ignored for other query forms)
    pub variables: Vec<Projection>,
    pub where_clause: Vec<Pattern>,
    pub group: Vec<GroupCondition>,
    pub having: Vec<Expression>,
    pub order: Vec<OrderComparator>,
    pub distinct: bool,
    pub reduced: bool,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub from: Option<FromClause>,
    /// CONSTRUCT template
    pub template: Vec<TriplePattern>,
    /// DESCRIBE targets (IRIs or variables)
    pub describes: Vec<Term>,
    pub prefixes: FxHashMap<Arc<str>, Arc<str>>,
}

impl Query {
    /// A bare query of the given form with empty clauses.
    pub fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            variables: Vec::new(),
            where_clause: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            distinct: false,
            reduced: false,
            offset: None,
            limit: None,
            from: None,
            template: Vec::new(),
            describes: Vec::new(),
            prefixes: FxHashMap::default(),
        }
    }

    /// `SELECT <vars> WHERE { <patterns> }`
    pub fn select(
        variables: impl IntoIterator<Item = Projection>,
        where_clause: Vec<Pattern>,
    ) -> Self {
        let mut query = Self::new(QueryType::Select);
        query.variables = variables.into_iter().collect();
        query.where_clause = where_clause;
        query
    }

    pub fn has_limit_or_offset(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }
}

/// Discriminator for pattern dispatch in the plan builder's stage
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Bgp,
    Group,
    Optional,
    Union,
    Minus,
    Graph,
    Service,
    Filter,
    Bind,
    Values,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternKind::Bgp => "bgp",
            PatternKind::Group => "group",
            PatternKind::Optional => "optional",
            PatternKind::Union => "union",
            PatternKind::Minus => "minus",
            PatternKind::Graph => "graph",
            PatternKind::Service => "service",
            PatternKind::Filter => "filter",
            PatternKind::Bind => "bind",
            PatternKind::Values => "values",
        };
        f.write_str(name)
    }
}

/// A VALUES row; variables absent from the map are UNDEF.
pub type ValuesRow = FxHashMap<Arc<str>, Term>;

/// A graph pattern node.
#[derive(Debug, Clone)]
pub enum Pattern {
    Bgp {
        triples: Vec<TriplePattern>,
    },
    Group {
        patterns: Vec<Pattern>,
    },
    Optional {
        patterns: Vec<Pattern>,
    },
    /// Each element is one UNION branch.
    Union {
        patterns: Vec<Pattern>,
    },
    Minus {
        patterns: Vec<Pattern>,
    },
    Graph {
        name: Term,
        patterns: Vec<Pattern>,
    },
    Service {
        name: Term,
        silent: bool,
        patterns: Vec<Pattern>,
    },
    Filter {
        expression: Expression,
    },
    Bind {
        expression: Expression,
        variable: Arc<str>,
    },
    Values {
        rows: Vec<ValuesRow>,
    },
}

impl Pattern {
    pub fn kind(&self) -> PatternKind {
        match self {
            Pattern::Bgp { .. } => PatternKind::Bgp,
            Pattern::Group { .. } => PatternKind::Group,
            Pattern::Optional { .. } => PatternKind::Optional,
            Pattern::Union { .. } => PatternKind::Union,
            Pattern::Minus { .. } => PatternKind::Minus,
            Pattern::Graph { .. } => PatternKind::Graph,
            Pattern::Service { .. } => PatternKind::Service,
            Pattern::Filter { .. } => PatternKind::Filter,
            Pattern::Bind { .. } => PatternKind::Bind,
            Pattern::Values { .. } => PatternKind::Values,
        }
    }

    /// Substitute bound variables of a mapping into this pattern,
    /// recursively. Used by the VALUES rewriting pass.
    pub fn substitute(&self, row: &Bindings) -> Pattern {
        let substitute_all = |patterns: &[Pattern]| -> Vec<Pattern> {
            patterns.iter().map(|p| p.substitute(row)).collect()
        };
        match self {
            Pattern::Bgp { triples } => Pattern::Bgp {
                triples: triples.iter().map(|t| row.bound(t)).collect(),
            },
            Pattern::Group { patterns } => Pattern::Group {
                patterns: substitute_all(patterns),
            },
            Pattern::Optional { patterns } => Pattern::Optional {
                patterns: substitute_all(patterns),
            },
            Pattern::Union { patterns } => Pattern::Union {
                patterns: substitute_all(patterns),
            },
            Pattern::Minus { patterns } => Pattern::Minus {
                patterns: substitute_all(patterns),
            },
            Pattern::Graph { name, patterns } => Pattern::Graph {
                name: substitute_term(name, row),
                patterns: substitute_all(patterns),
            },
            Pattern::Service {
                name,
                silent,
                patterns,
            } => Pattern::Service {
                name: substitute_term(name, row),
                silent: *silent,
                patterns: substitute_all(patterns),
            },
            Pattern::Filter { expression } => Pattern::Filter {
                expression: expression.substitute(row),
            },
            Pattern::Bind {
                expression,
                variable,
            } => Pattern::Bind {
                expression: expression.substitute(row),
                variable: variable.clone(),
            },
            Pattern::Values { rows } => Pattern::Values { rows: rows.clone() },
        }
    }
}

fn substitute_term(term: &Term, row: &Bindings) -> Term {
    if let Term::Variable(name) = term {
        if let Some(value) = row.get(name) {
            if !value.is_variable() && !value.is_unbound() {
                return value.clone();
            }
        }
    }
    term.clone()
}

/// An expression node evaluated by the expression evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant term or a variable lookup.
    Term(Term),
    /// A term list (operand of IN / NOT IN).
    List(Vec<Term>),
    /// Built-in operator application, dispatched by operator name.
    Operation {
        operator: Arc<str>,
        args: Vec<Expression>,
    },
    /// Call of a function identified by IRI (custom or extension).
    Function {
        iri: Arc<str>,
        args: Vec<Expression>,
    },
    /// Aggregate application; `expression` is `None` for `COUNT(*)`.
    Aggregate {
        aggregation: Arc<str>,
        expression: Option<Box<Expression>>,
        distinct: bool,
        separator: Option<Arc<str>>,
    },
}

impl Expression {
    pub fn variable(name: impl AsRef<str>) -> Self {
        Expression::Term(Term::var(name))
    }

    pub fn operation(operator: impl AsRef<str>, args: Vec<Expression>) -> Self {
        Expression::Operation {
            operator: Arc::from(operator.as_ref()),
            args,
        }
    }

    /// Variables referenced anywhere in the expression.
    pub fn variables(&self) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Arc<str>>) {
        match self {
            Expression::Term(Term::Variable(name)) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expression::Term(_) | Expression::List(_) => {}
            Expression::Operation { args, .. } | Expression::Function { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            Expression::Aggregate { expression, .. } => {
                if let Some(inner) = expression {
                    inner.collect_variables(out);
                }
            }
        }
    }

    /// True when the expression contains an aggregate node.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expression::Aggregate { .. } => true,
            Expression::Term(_) | Expression::List(_) => false,
            Expression::Operation { args, .. } | Expression::Function { args, .. } => {
                args.iter().any(Expression::has_aggregate)
            }
        }
    }

    /// Substitute bound variables of a mapping into the expression.
    pub fn substitute(&self, row: &Bindings) -> Expression {
        match self {
            Expression::Term(term) => Expression::Term(substitute_term(term, row)),
            Expression::List(terms) => Expression::List(terms.clone()),
            Expression::Operation { operator, args } => Expression::Operation {
                operator: operator.clone(),
                args: args.iter().map(|a| a.substitute(row)).collect(),
            },
            Expression::Function { iri, args } => Expression::Function {
                iri: iri.clone(),
                args: args.iter().map(|a| a.substitute(row)).collect(),
            },
            Expression::Aggregate {
                aggregation,
                expression,
                distinct,
                separator,
            } => Expression::Aggregate {
                aggregation: aggregation.clone(),
                expression: expression
                    .as_ref()
                    .map(|inner| Box::new(inner.substitute(row))),
                distinct: *distinct,
                separator: separator.clone(),
            },
        }
    }
}

/// Target of CLEAR / DROP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphTarget {
    Default,
    Named(Arc<str>),
    AllNamed,
    All,
}

/// Source or destination of COPY / MOVE / ADD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphRefTarget {
    Default,
    Named(Arc<str>),
}

/// A quad pattern in a DELETE/INSERT template; the graph position may
/// hold a variable bound by the WHERE clause.
#[derive(Debug, Clone)]
pub struct QuadPattern {
    pub pattern: TriplePattern,
    pub graph: Option<Term>,
}

/// One SPARQL Update operation.
#[derive(Debug, Clone)]
pub enum Update {
    InsertData {
        quads: Vec<Quad>,
    },
    DeleteData {
        quads: Vec<Quad>,
    },
    /// `DELETE { ... } INSERT { ... } WHERE { ... }`
    Modify {
        delete: Vec<QuadPattern>,
        insert: Vec<QuadPattern>,
        where_clause: Vec<Pattern>,
        using: Option<FromClause>,
    },
    Load {
        source: Arc<str>,
        destination: Option<Arc<str>>,
        silent: bool,
    },
    Create {
        graph: Arc<str>,
        silent: bool,
    },
    Drop {
        target: GraphTarget,
        silent: bool,
    },
    Clear {
        target: GraphTarget,
        silent: bool,
    },
    Copy {
        source: GraphRefTarget,
        destination: GraphRefTarget,
        silent: bool,
    },
    Move {
        source: GraphRefTarget,
        destination: GraphRefTarget,
        silent: bool,
    },
    Add {
        source: GraphRefTarget,
        destination: GraphRefTarget,
        silent: bool,
    },
}

/// A full update request: operations executed in order.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub updates: Vec<Update>,
    pub prefixes: FxHashMap<Arc<str>, Arc<str>>,
}
