//! Registry lookups (`bean:`, `properties:`, `ref:`, `type:`) and the small
//! utility functions: `random`, `skip`, `collate`, `messageHistory` and the
//! single-argument helpers such as `uppercase(exp)` or `iif(p,a,b)`.

use super::{message, split_args, strip_quotes, Dispatch};
use crate::convert::{as_i64, as_text, is_empty, iterate};
use crate::errors::{Result, SimpleError};
use crate::expression::Expression;
use crate::parser::Mode;
use itertools::Itertools;
use rand::Rng;
use serde_json::Value;

pub(super) fn resolve_lookups(d: &Dispatch) -> Result<Option<Expression>> {
    if let Some(rest) = d.remainder("bean:") {
        let (name, method) = bean_target(rest);
        if name.is_empty() {
            return Err(d.invalid("bean:name.method"));
        }
        let (name, method) = (name.to_string(), method.map(str::to_string));
        return Ok(Some(Expression::function(d.function, move |ex| {
            let bean = ex.lookup_bean(&name).ok_or_else(|| {
                SimpleError::evaluation(format!("No bean could be found in the registry for: {name}"))
            })?;
            match &method {
                Some(m) => ex.property_accessor().invoke(&bean, m),
                None => Ok(bean),
            }
        })));
    }
    if let Some(rest) = d.remainder("properties:") {
        let (key, default) = match rest.split_once(':') {
            Some((key, default)) => (key.trim().to_string(), Some(default.to_string())),
            None => (rest.trim().to_string(), None),
        };
        return Ok(Some(Expression::function(d.function, move |ex| {
            ex.resolve_placeholder(&key)
                .or_else(|| default.clone())
                .map(Value::String)
                .ok_or_else(|| {
                    SimpleError::evaluation(format!("Property with key [{key}] not found in properties"))
                })
        })));
    }
    if let Some(name) = d.remainder("ref:") {
        let name = name.trim().to_string();
        return Ok(Some(Expression::function(d.function, move |ex| {
            Ok(ex.lookup_bean(&name).unwrap_or(Value::Null))
        })));
    }
    if let Some(name) = d.remainder("type:") {
        let name = name.trim().to_string();
        return Ok(Some(Expression::function(d.function, move |ex| {
            if let Some(constant) = ex.type_constant(&name) {
                return Ok(constant);
            }
            ex.resolve_type(&name)
                .map(|t| Value::from(t.name()))
                .ok_or_else(|| SimpleError::UnknownType { name: name.clone() })
        })));
    }
    Ok(None)
}

/// `name?method=m`, `name::m`, `name.m` or a plain `name`.
fn bean_target(text: &str) -> (&str, Option<&str>) {
    let text = text.trim();
    if let Some((name, method)) = text.split_once("?method=") {
        return (name, Some(method));
    }
    if let Some((name, method)) = text.split_once("::") {
        return (name, Some(method));
    }
    match text.split_once('.') {
        Some((name, method)) => (name, Some(method)),
        None => (text, None),
    }
}

pub(super) fn resolve(d: &Dispatch) -> Result<Option<Expression>> {
    if let Some(args) = call(d, "random", "random(min,max)} or ${random(max)")? {
        return random(d, args).map(Some);
    }
    if let Some(args) = call(d, "skip", "skip(number)")? {
        let count = number_argument(d, args, "skip(number)")?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            let n = positive(&count.evaluate_value(ex)?, "skip")?;
            Ok(Value::Array(iterate(ex.body()).into_iter().skip(n).collect()))
        })));
    }
    if let Some(args) = call(d, "collate", "collate(group)")? {
        let size = number_argument(d, args, "collate(group)")?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            let n = positive(&size.evaluate_value(ex)?, "collate")?.max(1);
            let groups = iterate(ex.body()).into_iter().chunks(n);
            Ok(Value::Array(
                groups.into_iter().map(|g| Value::Array(g.collect())).collect(),
            ))
        })));
    }
    if d.function == "messageHistory" {
        return Ok(Some(history(d, true)));
    }
    if let Some(arg) = call(d, "messageHistory", "messageHistory(boolean)")? {
        let detailed = match strip_quotes(arg) {
            "" => true,
            s if s.eq_ignore_ascii_case("true") => true,
            s if s.eq_ignore_ascii_case("false") => false,
            _ => return Err(d.invalid("messageHistory(boolean)")),
        };
        return Ok(Some(history(d, detailed)));
    }
    let unary: [(&str, fn(Value) -> Value); 6] = [
        ("uppercase", |v| text_map(v, |s| s.to_uppercase())),
        ("lowercase", |v| text_map(v, |s| s.to_lowercase())),
        ("trim", |v| text_map(v, |s| s.trim().to_string())),
        ("length", |v| Value::from(as_text(&v).map_or(0, |s| s.len()))),
        ("size", |v| {
            Value::from(match &v {
                Value::Null => 0,
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => 1,
            })
        }),
        ("isEmpty", |v| {
            Value::Bool(match &v {
                Value::String(s) => s.trim().is_empty(),
                other => is_empty(other),
            })
        }),
    ];
    for (name, apply) in unary {
        if let Some(arg) = call(d, name, &format!("{name}(exp)"))? {
            let inner = d.argument_or_body(arg)?;
            return Ok(Some(Expression::function(d.function, move |ex| {
                Ok(apply(inner.evaluate_value(ex)?))
            })));
        }
    }
    if let Some(arg) = call(d, "not", "not(exp)")? {
        let predicate = if arg.trim().is_empty() {
            message::body().into_predicate()
        } else {
            d.argument(arg, Mode::Predicate)?.into_predicate()
        };
        return Ok(Some(Expression::function(d.function, move |ex| {
            Ok(Value::Bool(!predicate.matches(ex)?))
        })));
    }
    if let Some(args) = call(d, "replace", "replace(from,to,expression)")? {
        return replace(d, args).map(Some);
    }
    if let Some(args) = call(d, "iif", "iif(predicate,trueExpression,falseExpression)")? {
        let parts = split_args(args);
        let [condition, yes, no] = parts.as_slice() else {
            return Err(d.invalid("iif(predicate,trueExpression,falseExpression)"));
        };
        let condition = d.argument(condition, Mode::Predicate)?.into_predicate();
        let yes = d.argument(yes, Mode::Expression)?;
        let no = d.argument(no, Mode::Expression)?;
        return Ok(Some(Expression::function(d.function, move |ex| {
            if condition.matches(ex)? {
                yes.evaluate_value(ex)
            } else {
                no.evaluate_value(ex)
            }
        })));
    }
    Ok(None)
}

/// Argument text of `name(...)`. A missing closing parenthesis is a syntax
/// error.
fn call<'s>(d: &Dispatch<'s, '_>, name: &str, syntax: &str) -> Result<Option<&'s str>> {
    let Some(rest) = d
        .function
        .strip_prefix(name)
        .and_then(|r| r.strip_prefix('('))
    else {
        return Ok(None);
    };
    rest.trim_end()
        .strip_suffix(')')
        .map(Some)
        .ok_or_else(|| d.invalid(syntax))
}

fn random(d: &Dispatch, args: &str) -> Result<Expression> {
    let syntax = "random(min,max)} or ${random(max)";
    let parts = split_args(args);
    let (min, max) = match parts.as_slice() {
        [max] if !max.is_empty() => (Expression::constant(0), d.argument(max, Mode::Expression)?),
        [min, max] if !min.is_empty() && !max.is_empty() => (
            d.argument(min, Mode::Expression)?,
            d.argument(max, Mode::Expression)?,
        ),
        _ => return Err(d.invalid(syntax)),
    };
    Ok(Expression::function(d.function, move |ex| {
        let bound = |v: Value| {
            as_i64(&v).ok_or_else(|| SimpleError::Conversion {
                value: v.to_string(),
                target: "Long",
            })
        };
        let lo = bound(min.evaluate_value(ex)?)?;
        let hi = bound(max.evaluate_value(ex)?)?;
        if lo >= hi {
            return Err(SimpleError::evaluation(format!(
                "random({lo},{hi}): min must be less than max"
            )));
        }
        Ok(Value::from(rand::rng().random_range(lo..hi)))
    }))
}

fn replace(d: &Dispatch, args: &str) -> Result<Expression> {
    let syntax = "replace(from,to,expression)";
    let parts = split_args(args);
    let (from, to, source) = match parts.as_slice() {
        [from, to] => (from, to, None),
        [from, to, source] => (from, to, Some(source.as_str())),
        _ => return Err(d.invalid(syntax)),
    };
    let literal = |s: &str| {
        let s = strip_quotes(s);
        if s == "&empty;" { String::new() } else { s.to_string() }
    };
    let (from, to) = (literal(from.as_str()), literal(to.as_str()));
    if from.is_empty() {
        return Err(d.invalid(syntax));
    }
    let source = d.argument_or_body(source.unwrap_or_default())?;
    Ok(Expression::function(d.function, move |ex| {
        Ok(text_map(source.evaluate_value(ex)?, |s| s.replace(&from, &to)))
    }))
}

fn number_argument(d: &Dispatch, arg: &str, syntax: &str) -> Result<Expression> {
    if arg.trim().is_empty() {
        return Err(d.invalid(syntax));
    }
    d.argument(arg, Mode::Expression)
}

fn positive(value: &Value, function: &str) -> Result<usize> {
    as_i64(value)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            SimpleError::evaluation(format!("{function} expects a non-negative number, was: {value}"))
        })
}

fn history(d: &Dispatch, detailed: bool) -> Expression {
    Expression::function(d.function, move |ex| {
        Ok(ex.message_history(detailed).map_or(Value::Null, Value::String))
    })
}

fn text_map(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(f(&s)),
        other => as_text(&other).map_or(Value::Null, |s| Value::String(f(&s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefaultExchange;
    use crate::SimpleLanguage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval(text: &str, ex: &mut DefaultExchange) -> Result<Value> {
        SimpleLanguage::new().parse_expression(text)?.evaluate_value(ex)
    }

    #[test]
    fn bean_forms() {
        assert_eq!(bean_target("orders?method=size"), ("orders", Some("size")));
        assert_eq!(bean_target("orders::keys"), ("orders", Some("keys")));
        assert_eq!(bean_target("orders.size"), ("orders", Some("size")));
        assert_eq!(bean_target("orders"), ("orders", None));

        let mut ex = DefaultExchange::new().with_bean("orders", json!([1, 2, 3]));
        assert_eq!(eval("${bean:orders}", &mut ex).unwrap(), json!([1, 2, 3]));
        assert_eq!(eval("${bean:orders.size}", &mut ex).unwrap(), json!(3));
        assert_eq!(eval("${ref:missing}", &mut ex).unwrap(), Value::Null);
        assert!(eval("${bean:missing}", &mut ex).is_err());
    }

    #[test]
    fn placeholders_and_types() {
        let mut ex = DefaultExchange::new()
            .with_placeholder("app.name", "orders")
            .with_type_constant("Limits.MAX", json!(10));
        assert_eq!(eval("${properties:app.name}", &mut ex).unwrap(), json!("orders"));
        assert_eq!(eval("${properties:app.port:8080}", &mut ex).unwrap(), json!("8080"));
        assert!(eval("${properties:app.port}", &mut ex).is_err());
        assert_eq!(eval("${type:Limits.MAX}", &mut ex).unwrap(), json!(10));
        assert_eq!(eval("${type:java.lang.String}", &mut ex).unwrap(), json!("String"));
        assert!(matches!(
            eval("${type:com.acme.Widget}", &mut ex),
            Err(SimpleError::UnknownType { .. })
        ));
    }

    #[test]
    fn random_stays_in_bounds() {
        let mut ex = DefaultExchange::new();
        for _ in 0..50 {
            let n = eval("${random(3,6)}", &mut ex).unwrap().as_i64().unwrap();
            assert!((3..6).contains(&n));
            let n = eval("${random(2)}", &mut ex).unwrap().as_i64().unwrap();
            assert!((0..2).contains(&n));
        }
        let err = SimpleLanguage::new().parse_expression("${random(1,2,3)}").unwrap_err();
        assert!(err.to_string().contains("Valid syntax: ${random(min,max)} or ${random(max)}"));
    }

    #[test]
    fn skip_and_collate_the_body() {
        let mut ex = DefaultExchange::new().with_body(json!([1, 2, 3, 4, 5]));
        assert_eq!(eval("${skip(2)}", &mut ex).unwrap(), json!([3, 4, 5]));
        assert_eq!(eval("${collate(2)}", &mut ex).unwrap(), json!([[1, 2], [3, 4], [5]]));
        assert!(SimpleLanguage::new().parse_expression("${skip()}").is_err());
    }

    #[test]
    fn message_history() {
        let mut ex = DefaultExchange::new().with_route("route-a", None);
        assert_eq!(eval("${messageHistory(false)}", &mut ex).unwrap(), json!("route-a"));
        let detailed = eval("${messageHistory}", &mut ex).unwrap();
        assert!(detailed.as_str().unwrap().contains("[1] route-a"));
    }

    #[test]
    fn text_helpers_default_to_the_body() {
        let mut ex = DefaultExchange::new()
            .with_body("  Hello World  ")
            .with_header("tags", json!(["a", "b"]));
        assert_eq!(eval("${trim()}", &mut ex).unwrap(), json!("Hello World"));
        assert_eq!(eval("${uppercase('abc')}", &mut ex).unwrap(), json!("ABC"));
        assert_eq!(eval("${size(${header.tags})}", &mut ex).unwrap(), json!(2));
        assert_eq!(eval("${isEmpty(${header.missing})}", &mut ex).unwrap(), json!(true));
        assert_eq!(eval("${length('abcd')}", &mut ex).unwrap(), json!(4));
    }

    #[test]
    fn replace_not_and_iif() {
        let mut ex = DefaultExchange::new()
            .with_body("a-b-c")
            .with_header("n", 5);
        assert_eq!(eval("${replace(-,+)}", &mut ex).unwrap(), json!("a+b+c"));
        assert_eq!(eval("${replace('-','&empty;')}", &mut ex).unwrap(), json!("abc"));
        assert_eq!(eval("${not(${header.n} > 3)}", &mut ex).unwrap(), json!(false));
        assert_eq!(
            eval("${iif(${header.n} > 3,big,small)}", &mut ex).unwrap(),
            json!("big")
        );
        assert!(SimpleLanguage::new().parse_expression("${replace(a)}").is_err());
    }
}
