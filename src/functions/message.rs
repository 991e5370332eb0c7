//! Message-level functions: body, headers, variables, exchange properties,
//! the exception, identifiers and system lookups.

use super::{strip_quotes, Dispatch};
use crate::context::Exchange;
use crate::convert::TargetType;
use crate::errors::{Result, SimpleError};
use crate::expression::Expression;
use crate::ognl::{is_ognl, kind_of, split_root, OgnlPath};
use serde_json::{json, Map, Value};

pub(super) fn resolve(d: &Dispatch) -> Result<Option<Expression>> {
    if let Some(e) = direct(d.function) {
        return Ok(Some(e));
    }
    if let Some(e) = body_or_header(d)? {
        return Ok(Some(e));
    }
    if let Some(e) = variables(d)? {
        return Ok(Some(e));
    }
    if let Some(rest) = d.remainder("camelContext") {
        let path = path(d, rest, "camelContext.OGNL")?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            let root = json!({ "name": ex.context_name() });
            path.navigate(ex.property_accessor(), root)
        })));
    }
    if let Some(rest) = d.remainder("exception") {
        let path = path(d, rest, "exception.OGNL")?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            let root = ex.exception().cloned().unwrap_or(Value::Null);
            path.navigate(ex.property_accessor(), root)
        })));
    }
    if let Some(rest) = d.remainder("exchangeProperty") {
        let key = keyed(d, rest, "exchangeProperty.OGNL")?;
        return Ok(Some(keyed_lookup(d.function, key, |ex, name| {
            ex.property(name).cloned()
        })?));
    }
    if let Some(key) = d.remainder("sys.") {
        let key = key.to_string();
        return Ok(Some(Expression::function(d.function, move |ex| {
            Ok(ex.system_property(&key).map_or(Value::Null, Value::String))
        })));
    }
    if let Some(key) = ["sysenv.", "sysenv:", "env.", "env:"]
        .iter()
        .find_map(|p| d.remainder(p))
    {
        let key = key.to_string();
        return Ok(Some(Expression::function(d.function, move |ex| {
            Ok(ex.system_environment(&key).map_or(Value::Null, Value::String))
        })));
    }
    if let Some(rest) = d.remainder("exchange") {
        let path = path(d, rest, "exchange.OGNL")?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            path.navigate(ex.property_accessor(), exchange_view(ex))
        })));
    }
    Ok(None)
}

pub(crate) fn body() -> Expression {
    Expression::function("body", |ex| Ok(ex.body().clone()))
}

/// Names that map straight to one value.
fn direct(function: &str) -> Option<Expression> {
    let f = |read: fn(&mut dyn Exchange) -> Value| {
        Some(Expression::function(function, move |ex| Ok(read(ex))))
    };
    match function {
        "body" | "in.body" => Some(body()),
        "bodyType" => f(|ex| Value::from(kind_of(ex.body()))),
        "id" => f(|ex| text(ex.message_id())),
        "messageTimestamp" => f(|ex| {
            ex.created()
                .map_or(Value::Null, |t| Value::from(t.timestamp_millis()))
        }),
        "exchangeId" => f(|ex| Value::from(ex.exchange_id())),
        "exchange" => f(|ex| exchange_view(ex)),
        "exception" => f(|ex| ex.exception().cloned().unwrap_or(Value::Null)),
        "exception.message" => f(|ex| {
            ex.exception()
                .and_then(|e| e.get("message").cloned())
                .unwrap_or(Value::Null)
        }),
        "threadId" => f(|_| thread_id()),
        "threadName" => f(|_| {
            Value::from(std::thread::current().name().unwrap_or("unnamed"))
        }),
        "hostname" => f(|ex| ex.host_name().map_or(Value::Null, Value::String)),
        "camelId" => f(|ex| text(ex.context_name())),
        "routeId" => f(|ex| text(ex.route_id())),
        "stepId" => f(|ex| text(ex.step_id())),
        "variables" => f(|ex| ex.variables()),
        "null" => Some(Expression::constant(Value::Null)),
        _ => None,
    }
}

fn body_or_header(d: &Dispatch) -> Result<Option<Expression>> {
    for (prefix, mandatory) in [("bodyAs(", false), ("mandatoryBodyAs(", true)] {
        let Some(rest) = d.remainder(prefix) else {
            continue;
        };
        let syntax = if mandatory { "mandatoryBodyAs(type)" } else { "bodyAs(type)" };
        let (type_name, after) = rest.split_once(')').ok_or_else(|| d.invalid(syntax))?;
        let type_name = strip_quotes(type_name).to_string();
        let path = if after.is_empty() {
            None
        } else {
            Some(path(d, after, &format!("{syntax}.OGNL"))?)
        };
        return Ok(Some(Expression::function(d.function, move |ex| {
            let target = ex
                .resolve_type(&type_name)
                .ok_or_else(|| SimpleError::UnknownType {
                    name: type_name.clone(),
                })?;
            let body = ex.body().clone();
            let value = if mandatory {
                if body.is_null() {
                    return Err(SimpleError::evaluation(format!(
                        "No body available of type: {target}"
                    )));
                }
                ex.type_converter().convert(&body, target)?
            } else {
                ex.type_converter()
                    .try_convert(&body, target)
                    .unwrap_or(Value::Null)
            };
            match &path {
                Some(p) => p.navigate(ex.property_accessor(), value),
                None => Ok(value),
            }
        })));
    }

    if let Some(rest) = d.remainder("body").or_else(|| d.remainder("in.body")) {
        let path = path(d, rest, "body.OGNL")?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            path.navigate(ex.property_accessor(), ex.body().clone())
        })));
    }

    if let Some(rest) = d.remainder("headerAs(") {
        let (key, target) = typed_key(d, rest, "headerAs(key, type)")?;
        return Ok(Some(typed_lookup(d.function, key, target, |ex, k| {
            ex.header(k).cloned()
        })));
    }

    match d.function {
        "headers" | "in.headers" => {
            return Ok(Some(Expression::function(d.function, |ex| Ok(ex.headers()))))
        }
        "headers.size" | "headers.size()" | "headers.length" | "headers.length()" => {
            return Ok(Some(Expression::function(d.function, |ex| {
                Ok(Value::from(size_of(&ex.headers())))
            })))
        }
        _ => {}
    }

    let header = ["in.headers", "in.header", "headers", "header"]
        .iter()
        .find_map(|p| d.remainder(p));
    if let Some(rest) = header {
        let key = keyed(d, rest, "header.name[key]")?;
        return Ok(Some(keyed_lookup(d.function, key, |ex, name| {
            ex.header(name).cloned()
        })?));
    }
    Ok(None)
}

fn variables(d: &Dispatch) -> Result<Option<Expression>> {
    if let Some(rest) = d.remainder("variableAs(") {
        let (key, target) = typed_key(d, rest, "variableAs(key, type)")?;
        return Ok(Some(typed_lookup(d.function, key, target, |ex, k| {
            ex.variable(k).cloned()
        })));
    }
    if matches!(d.function, "variables.size" | "variables.size()") {
        return Ok(Some(Expression::function(d.function, |ex| {
            Ok(Value::from(size_of(&ex.variables())))
        })));
    }
    let Some(rest) = d.remainder("variables").or_else(|| d.remainder("variable")) else {
        return Ok(None);
    };
    let key = keyed(d, rest, "variable.name[key]")?;
    Ok(Some(keyed_lookup(d.function, key, |ex, name| {
        ex.variable(name).cloned()
    })?))
}

/// `.key`, `:key`, `?key`, `[key]` and `['key']` all name the same entry.
fn keyed(d: &Dispatch, rest: &str, syntax: &str) -> Result<String> {
    let rest = rest
        .strip_prefix(['.', ':', '?'])
        .unwrap_or(rest);
    let rest = rest
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(rest);
    let key = strip_quotes(rest);
    if key.is_empty() {
        return Err(d.invalid(syntax));
    }
    if is_ognl(key) && OgnlPath::parse(key).is_err() {
        return Err(d.invalid(syntax));
    }
    Ok(key.to_string())
}

/// A keyed read, walking any path after the leading name.
fn keyed_lookup(
    name: &str,
    key: String,
    read: fn(&dyn Exchange, &str) -> Option<Value>,
) -> Result<Expression> {
    if !is_ognl(&key) {
        return Ok(Expression::function(name, move |ex| {
            Ok(read(ex, &key).unwrap_or(Value::Null))
        }));
    }
    let (root, rest) = split_root(&key);
    let root = root.to_string();
    let path = OgnlPath::parse(rest)?;
    Ok(Expression::function(name, move |ex| {
        let value = read(ex, &root).unwrap_or(Value::Null);
        path.navigate(ex.property_accessor(), value)
    }))
}

fn typed_key(d: &Dispatch, rest: &str, syntax: &str) -> Result<(String, String)> {
    let (inside, after) = rest.split_once(')').ok_or_else(|| d.invalid(syntax))?;
    let (key, target) = inside.split_once(',').ok_or_else(|| d.invalid(syntax))?;
    let (key, target) = (strip_quotes(key), strip_quotes(target));
    if key.is_empty() || target.is_empty() || !after.is_empty() {
        return Err(d.invalid(syntax));
    }
    Ok((key.to_string(), target.to_string()))
}

fn typed_lookup(
    name: &str,
    key: String,
    target: String,
    read: fn(&dyn Exchange, &str) -> Option<Value>,
) -> Expression {
    Expression::function(name, move |ex| {
        let target_type: TargetType = ex
            .resolve_type(&target)
            .ok_or_else(|| SimpleError::UnknownType {
                name: target.clone(),
            })?;
        let value = read(ex, &key).unwrap_or(Value::Null);
        Ok(ex
            .type_converter()
            .try_convert(&value, target_type)
            .unwrap_or(Value::Null))
    })
}

/// Parse an OGNL remainder, reporting failures as a syntax hint.
fn path(d: &Dispatch, rest: &str, syntax: &str) -> Result<OgnlPath> {
    if !rest.starts_with(['.', '?', '[']) {
        return Err(d.invalid(syntax));
    }
    OgnlPath::parse(rest).map_err(|_| d.invalid(syntax))
}

/// Snapshot of the exchange used for `${exchange}` and its paths.
fn exchange_view(ex: &dyn Exchange) -> Value {
    let mut view = Map::new();
    view.insert("exchangeId".into(), Value::from(ex.exchange_id()));
    view.insert("messageId".into(), text(ex.message_id()));
    view.insert("body".into(), ex.body().clone());
    view.insert("headers".into(), ex.headers());
    view.insert("properties".into(), ex.properties());
    view.insert("variables".into(), ex.variables());
    view.insert(
        "exception".into(),
        ex.exception().cloned().unwrap_or(Value::Null),
    );
    view.insert("routeId".into(), text(ex.route_id()));
    view.insert("contextName".into(), text(ex.context_name()));
    Value::Object(view)
}

fn size_of(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 0,
    }
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn thread_id() -> Value {
    let raw = format!("{:?}", std::thread::current().id());
    raw.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .parse::<u64>()
        .map_or(Value::String(raw.clone()), Value::from)
}
