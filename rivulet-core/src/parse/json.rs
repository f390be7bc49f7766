//! JSON-shaped algebra tree adapter.
//!
//! External SPARQL parsers emit a JSON tree with `type` / `termType` /
//! `queryType` discriminators; this module lifts it into the typed
//! algebra. Only tree shapes, not SPARQL text, are handled here.

use crate::algebra::{
    Expression, FromClause, GraphRefTarget, GraphTarget, GroupCondition, OrderComparator, Pattern,
    Projection, Query, QueryType, QuadPattern, Update, UpdateRequest, ValuesRow,
};
use crate::term::Term;
use crate::triple::{NegatedLink, Predicate, PropertyPath, Quad, Triple, TriplePattern};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Malformed JSON query tree.
#[derive(Error, Debug)]
#[error("malformed query tree: {0}")]
pub struct JsonError(pub String);

type Result<T> = std::result::Result<T, JsonError>;

fn err<T>(msg: impl Into<String>) -> Result<T> {
    Err(JsonError(msg.into()))
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| JsonError(format!("missing field `{name}`")))
}

fn string_field<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    field(value, name)?
        .as_str()
        .ok_or_else(|| JsonError(format!("field `{name}` is not a string")))
}

fn array_field<'a>(value: &'a Value, name: &str) -> Result<&'a [Value]> {
    field(value, name)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| JsonError(format!("field `{name}` is not an array")))
}

fn opt_array<'a>(value: &'a Value, name: &str) -> Result<&'a [Value]> {
    match value.get(name) {
        None | Some(Value::Null) => Ok(&[]),
        Some(v) => v
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| JsonError(format!("field `{name}` is not an array"))),
    }
}

fn parse_term(value: &Value) -> Result<Term> {
    serde_json::from_value::<Term>(value.clone())
        .map_err(|e| JsonError(format!("bad term: {e}")))
}

fn strip_var_marker(name: &str) -> &str {
    name.strip_prefix(['?', '$']).unwrap_or(name)
}

/// Parse a `query` node into the typed [`Query`].
pub fn parse_query(value: &Value) -> Result<Query> {
    if value.get("type").and_then(Value::as_str) != Some("query") {
        return err("expected a `query` node");
    }
    let query_type = match string_field(value, "queryType")? {
        "SELECT" => QueryType::Select,
        "CONSTRUCT" => QueryType::Construct,
        "ASK" => QueryType::Ask,
        "DESCRIBE" => QueryType::Describe,
        other => return err(format!("unsupported query type `{other}`")),
    };
    let mut query = Query::new(query_type);

    match query_type {
        QueryType::Select => {
            for item in opt_array(value, "variables")? {
                query.variables.push(parse_projection(item)?);
            }
        }
        QueryType::Describe => {
            for item in opt_array(value, "variables")? {
                query.describes.push(parse_term(item)?);
            }
        }
        QueryType::Construct | QueryType::Ask => {}
    }
    for item in opt_array(value, "where")? {
        query.where_clause.push(parse_pattern(item)?);
    }
    for item in opt_array(value, "template")? {
        query.template.push(parse_triple_pattern(item)?);
    }
    for item in opt_array(value, "group")? {
        query.group.push(GroupCondition {
            expression: parse_expression(field(item, "expression")?)?,
            variable: item
                .get("variable")
                .map(parse_term)
                .transpose()?
                .and_then(|t| t.as_variable().cloned()),
        });
    }
    for item in opt_array(value, "having")? {
        query.having.push(parse_expression(item)?);
    }
    for item in opt_array(value, "order")? {
        query.order.push(OrderComparator {
            expression: parse_expression(field(item, "expression")?)?,
            descending: item
                .get("descending")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }
    query.distinct = value.get("distinct").and_then(Value::as_bool).unwrap_or(false);
    query.reduced = value.get("reduced").and_then(Value::as_bool).unwrap_or(false);
    query.offset = value.get("offset").and_then(Value::as_u64).map(|n| n as usize);
    query.limit = value.get("limit").and_then(Value::as_u64).map(|n| n as usize);
    if let Some(from) = value.get("from") {
        query.from = Some(parse_from(from)?);
    }
    if let Some(prefixes) = value.get("prefixes").and_then(Value::as_object) {
        for (prefix, iri) in prefixes {
            if let Some(iri) = iri.as_str() {
                query
                    .prefixes
                    .insert(Arc::from(prefix.as_str()), Arc::from(iri));
            }
        }
    }
    Ok(query)
}

fn parse_projection(value: &Value) -> Result<Projection> {
    if value.get("termType").and_then(Value::as_str) == Some("Wildcard")
        || value.as_str() == Some("*")
    {
        return Ok(Projection::Wildcard);
    }
    if let Some(expression) = value.get("expression") {
        let variable = parse_term(field(value, "variable")?)?;
        let Some(name) = variable.as_variable() else {
            return err("projection alias is not a variable");
        };
        return Ok(Projection::Expression {
            expression: parse_expression(expression)?,
            variable: name.clone(),
        });
    }
    match parse_term(value)? {
        Term::Variable(name) => Ok(Projection::Variable(name)),
        other => err(format!("bad projection entry: {other}")),
    }
}

fn parse_from(value: &Value) -> Result<FromClause> {
    let mut from = FromClause::default();
    for item in opt_array(value, "default")? {
        match parse_term(item)? {
            Term::Iri(iri) => from.default.push(iri),
            other => return err(format!("FROM graph is not an IRI: {other}")),
        }
    }
    for item in opt_array(value, "named")? {
        match parse_term(item)? {
            Term::Iri(iri) => from.named.push(iri),
            other => return err(format!("FROM NAMED graph is not an IRI: {other}")),
        }
    }
    Ok(from)
}

fn parse_pattern(value: &Value) -> Result<Pattern> {
    match string_field(value, "type")? {
        "bgp" => {
            let mut triples = Vec::new();
            for item in array_field(value, "triples")? {
                triples.push(parse_triple_pattern(item)?);
            }
            Ok(Pattern::Bgp { triples })
        }
        "group" => Ok(Pattern::Group {
            patterns: parse_patterns(value)?,
        }),
        "optional" => Ok(Pattern::Optional {
            patterns: parse_patterns(value)?,
        }),
        "union" => Ok(Pattern::Union {
            patterns: parse_patterns(value)?,
        }),
        "minus" => Ok(Pattern::Minus {
            patterns: parse_patterns(value)?,
        }),
        "graph" => Ok(Pattern::Graph {
            name: parse_term(field(value, "name")?)?,
            patterns: parse_patterns(value)?,
        }),
        "service" => Ok(Pattern::Service {
            name: parse_term(field(value, "name")?)?,
            silent: value.get("silent").and_then(Value::as_bool).unwrap_or(false),
            patterns: parse_patterns(value)?,
        }),
        "filter" => Ok(Pattern::Filter {
            expression: parse_expression(field(value, "expression")?)?,
        }),
        "bind" => {
            let variable = parse_term(field(value, "variable")?)?;
            let Some(name) = variable.as_variable() else {
                return err("BIND target is not a variable");
            };
            Ok(Pattern::Bind {
                expression: parse_expression(field(value, "expression")?)?,
                variable: name.clone(),
            })
        }
        "values" => {
            let mut rows = Vec::new();
            for row in array_field(value, "values")? {
                let Some(object) = row.as_object() else {
                    return err("VALUES row is not an object");
                };
                let mut parsed: ValuesRow = FxHashMap::default();
                for (var, term) in object {
                    if term.is_null() {
                        continue; // UNDEF
                    }
                    parsed.insert(Arc::from(strip_var_marker(var)), parse_term(term)?);
                }
                rows.push(parsed);
            }
            Ok(Pattern::Values { rows })
        }
        other => err(format!("unknown pattern type `{other}`")),
    }
}

fn parse_patterns(value: &Value) -> Result<Vec<Pattern>> {
    array_field(value, "patterns")?
        .iter()
        .map(parse_pattern)
        .collect()
}

fn parse_triple_pattern(value: &Value) -> Result<TriplePattern> {
    let subject = parse_term(field(value, "subject")?)?;
    let object = parse_term(field(value, "object")?)?;
    let predicate_value = field(value, "predicate")?;
    let predicate = if predicate_value.get("type").and_then(Value::as_str) == Some("path") {
        Predicate::Path(parse_path(predicate_value)?)
    } else {
        Predicate::Term(parse_term(predicate_value)?)
    };
    Ok(TriplePattern {
        subject,
        predicate,
        object,
    })
}

fn parse_path(value: &Value) -> Result<PropertyPath> {
    if value.get("type").and_then(Value::as_str) != Some("path") {
        return match parse_term(value)? {
            Term::Iri(iri) => Ok(PropertyPath::Link(iri)),
            other => err(format!("path atom is not an IRI: {other}")),
        };
    }
    let items: Vec<PropertyPath> = array_field(value, "items")?
        .iter()
        .map(parse_path)
        .collect::<Result<_>>()?;
    let single = |mut items: Vec<PropertyPath>| -> Result<Box<PropertyPath>> {
        if items.len() != 1 {
            return err("unary path operator expects one operand");
        }
        Ok(Box::new(items.remove(0)))
    };
    match string_field(value, "pathType")? {
        "/" => Ok(PropertyPath::Sequence(items)),
        "|" => Ok(PropertyPath::Alternative(items)),
        "^" => Ok(PropertyPath::Inverse(single(items)?)),
        "*" => Ok(PropertyPath::ZeroOrMore(single(items)?)),
        "+" => Ok(PropertyPath::OneOrMore(single(items)?)),
        "?" => Ok(PropertyPath::ZeroOrOne(single(items)?)),
        "!" => {
            let mut links = Vec::new();
            for item in items {
                flatten_negated(&item, false, &mut links)?;
            }
            Ok(PropertyPath::NegatedPropertySet(links))
        }
        other => err(format!("unknown path operator `{other}`")),
    }
}

fn flatten_negated(path: &PropertyPath, inverse: bool, out: &mut Vec<NegatedLink>) -> Result<()> {
    match path {
        PropertyPath::Link(iri) => {
            out.push(NegatedLink {
                iri: iri.clone(),
                inverse,
            });
            Ok(())
        }
        PropertyPath::Inverse(inner) => flatten_negated(inner, !inverse, out),
        PropertyPath::Alternative(items) => {
            for item in items {
                flatten_negated(item, inverse, out)?;
            }
            Ok(())
        }
        other => err(format!(
            "negated property set only takes (inverse) IRIs, got {other:?}"
        )),
    }
}

fn parse_expression(value: &Value) -> Result<Expression> {
    if let Some(entries) = value.as_array() {
        return Ok(Expression::List(
            entries.iter().map(parse_term).collect::<Result<_>>()?,
        ));
    }
    match value.get("type").and_then(Value::as_str) {
        Some("operation") => Ok(Expression::Operation {
            operator: Arc::from(string_field(value, "operator")?),
            args: array_field(value, "args")?
                .iter()
                .map(parse_expression)
                .collect::<Result<_>>()?,
        }),
        Some("functionCall") => {
            let function = field(value, "function")?;
            let iri = match function.as_str() {
                Some(iri) => Arc::from(iri),
                None => match parse_term(function)? {
                    Term::Iri(iri) => iri,
                    other => return err(format!("function name is not an IRI: {other}")),
                },
            };
            Ok(Expression::Function {
                iri,
                args: array_field(value, "args")?
                    .iter()
                    .map(parse_expression)
                    .collect::<Result<_>>()?,
            })
        }
        Some("aggregate") => {
            let expression = match value.get("expression") {
                None | Some(Value::Null) => None,
                Some(v) if v.get("termType").and_then(Value::as_str) == Some("Wildcard") => None,
                Some(v) => Some(Box::new(parse_expression(v)?)),
            };
            Ok(Expression::Aggregate {
                aggregation: Arc::from(string_field(value, "aggregation")?.to_ascii_lowercase().as_str()),
                expression,
                distinct: value.get("distinct").and_then(Value::as_bool).unwrap_or(false),
                separator: value
                    .get("separator")
                    .and_then(Value::as_str)
                    .map(Arc::from),
            })
        }
        _ => Ok(Expression::Term(parse_term(value)?)),
    }
}

/// Parse an `update` node into the typed [`UpdateRequest`].
pub fn parse_update(value: &Value) -> Result<UpdateRequest> {
    if value.get("type").and_then(Value::as_str) != Some("update") {
        return err("expected an `update` node");
    }
    let mut request = UpdateRequest::default();
    if let Some(prefixes) = value.get("prefixes").and_then(Value::as_object) {
        for (prefix, iri) in prefixes {
            if let Some(iri) = iri.as_str() {
                request
                    .prefixes
                    .insert(Arc::from(prefix.as_str()), Arc::from(iri));
            }
        }
    }
    for item in array_field(value, "updates")? {
        request.updates.push(parse_one_update(item)?);
    }
    Ok(request)
}

fn parse_one_update(value: &Value) -> Result<Update> {
    if let Some(update_type) = value.get("updateType").and_then(Value::as_str) {
        return match update_type {
            "insert" => Ok(Update::InsertData {
                quads: parse_quads(opt_array(value, "insert")?)?,
            }),
            "delete" => Ok(Update::DeleteData {
                quads: parse_quads(opt_array(value, "delete")?)?,
            }),
            "insertdelete" | "deletewhere" => {
                let mut where_clause = Vec::new();
                for p in opt_array(value, "where")? {
                    where_clause.push(parse_pattern(p)?);
                }
                let delete = parse_quad_patterns(opt_array(value, "delete")?)?;
                let insert = parse_quad_patterns(opt_array(value, "insert")?)?;
                let using = value.get("using").map(parse_from).transpose()?;
                // DELETE WHERE { P } deletes exactly what P matches.
                let where_clause = if update_type == "deletewhere" && where_clause.is_empty() {
                    vec![Pattern::Bgp {
                        triples: delete.iter().map(|q| q.pattern.clone()).collect(),
                    }]
                } else {
                    where_clause
                };
                Ok(Update::Modify {
                    delete,
                    insert,
                    where_clause,
                    using,
                })
            }
            other => err(format!("unknown updateType `{other}`")),
        };
    }
    let silent = value.get("silent").and_then(Value::as_bool).unwrap_or(false);
    match string_field(value, "type")? {
        "load" => Ok(Update::Load {
            source: parse_iri(field(value, "source")?)?,
            destination: value
                .get("destination")
                .filter(|v| !v.is_null())
                .map(parse_iri)
                .transpose()?,
            silent,
        }),
        "create" => Ok(Update::Create {
            graph: parse_iri(field(value, "graph")?)?,
            silent,
        }),
        "drop" => Ok(Update::Drop {
            target: parse_graph_target(field(value, "graph")?)?,
            silent,
        }),
        "clear" => Ok(Update::Clear {
            target: parse_graph_target(field(value, "graph")?)?,
            silent,
        }),
        "copy" => Ok(Update::Copy {
            source: parse_graph_ref(field(value, "source")?)?,
            destination: parse_graph_ref(field(value, "destination")?)?,
            silent,
        }),
        "move" => Ok(Update::Move {
            source: parse_graph_ref(field(value, "source")?)?,
            destination: parse_graph_ref(field(value, "destination")?)?,
            silent,
        }),
        "add" => Ok(Update::Add {
            source: parse_graph_ref(field(value, "source")?)?,
            destination: parse_graph_ref(field(value, "destination")?)?,
            silent,
        }),
        other => err(format!("unknown update type `{other}`")),
    }
}

fn parse_iri(value: &Value) -> Result<Arc<str>> {
    if let Some(s) = value.as_str() {
        return Ok(Arc::from(s));
    }
    // Accept a wrapping object: { graph: <term> } or a bare term.
    let candidate = value.get("graph").or(value.get("name")).unwrap_or(value);
    match parse_term(candidate)? {
        Term::Iri(iri) => Ok(iri),
        other => err(format!("expected an IRI, got {other}")),
    }
}

fn parse_graph_target(value: &Value) -> Result<GraphTarget> {
    if value.get("default").and_then(Value::as_bool) == Some(true) {
        return Ok(GraphTarget::Default);
    }
    if value.get("named").and_then(Value::as_bool) == Some(true) {
        return Ok(GraphTarget::AllNamed);
    }
    if value.get("all").and_then(Value::as_bool) == Some(true) {
        return Ok(GraphTarget::All);
    }
    Ok(GraphTarget::Named(parse_iri(value)?))
}

fn parse_graph_ref(value: &Value) -> Result<GraphRefTarget> {
    if value.get("default").and_then(Value::as_bool) == Some(true) {
        return Ok(GraphRefTarget::Default);
    }
    Ok(GraphRefTarget::Named(parse_iri(value)?))
}

fn parse_quads(values: &[Value]) -> Result<Vec<Quad>> {
    let mut quads = Vec::new();
    for pattern in parse_quad_patterns(values)? {
        let graph = match pattern.graph {
            None => None,
            Some(Term::Iri(iri)) => Some(iri),
            Some(other) => return err(format!("data graph is not an IRI: {other}")),
        };
        let triple = pattern.pattern;
        let (Predicate::Term(predicate), subject, object) =
            (triple.predicate, triple.subject, triple.object)
        else {
            return err("data block contains a property path");
        };
        let quad = Quad::new(Triple::new(subject, predicate, object), graph);
        if !quad.triple.is_ground() {
            return err(format!("data block contains variables: {}", quad.triple));
        }
        quads.push(quad);
    }
    Ok(quads)
}

fn parse_quad_patterns(values: &[Value]) -> Result<Vec<QuadPattern>> {
    let mut out = Vec::new();
    for block in values {
        let graph = match string_field(block, "type")? {
            "bgp" => None,
            "graph" => Some(parse_term(field(block, "name")?)?),
            other => return err(format!("unexpected quad block `{other}`")),
        };
        for item in array_field(block, "triples")? {
            out.push(QuadPattern {
                pattern: parse_triple_pattern(item)?,
                graph: graph.clone(),
            });
        }
    }
    Ok(out)
}
