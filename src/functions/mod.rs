//! Function dispatch: the text inside a `${...}` block becomes a compiled
//! [`Expression`].
//!
//! Built-in families are tried in a fixed order, each keyed on a text prefix.
//! Custom functions registered in a [`Registry`] are called as `$name(args)`.

mod date;
mod file;
mod message;
mod misc;

use crate::errors::{Result, SimpleError};
use crate::expression::Expression;
use crate::parser::{self, reanchor, Mode, Scope};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Trait for pluggable functions callable as `${$name(arg, ...)}`.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn arity(&self) -> RangeInclusive<usize>;
    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtins::First);
        registry.register(builtins::Unique);
        registry.register(builtins::OrDefault);
        registry.register(builtins::FromJson);
        registry
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let map = Arc::make_mut(&mut self.inner);
        map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.keys().copied()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("functions", &names).finish()
    }
}

pub mod builtins {
    use super::*;
    use crate::convert::{as_text, iterate, truthy};
    use crate::ognl::{JsonPropertyAccessor, OgnlPath};
    use itertools::Itertools;

    /// First element of a collection (or comma list); scalars pass through.
    pub struct First;
    impl Function for First {
        fn name(&self) -> &'static str {
            "first"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let v = args.first().unwrap_or(&Value::Null);
            Ok(iterate(v).into_iter().next().unwrap_or(Value::Null))
        }
    }

    /// Distinct elements, first occurrence wins.
    pub struct Unique;
    impl Function for Unique {
        fn name(&self) -> &'static str {
            "unique"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let distinct = iterate(args.first().unwrap_or(&Value::Null))
                .into_iter()
                .unique_by(|v| v.to_string())
                .collect();
            Ok(Value::Array(distinct))
        }
    }

    pub struct OrDefault;
    impl Function for OrDefault {
        fn name(&self) -> &'static str {
            "or_default"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            2..=2
        }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let a = args.first().unwrap_or(&Value::Null);
            if truthy(a) {
                return Ok(a.clone());
            }
            Ok(args.get(1).cloned().unwrap_or(Value::Null))
        }
    }

    /// Parse JSON text and walk a path into it: `$from_json(${body}, items[0].id)`.
    pub struct FromJson;
    impl Function for FromJson {
        fn name(&self) -> &'static str {
            "from_json"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            2..=2
        }
        fn call(&self, args: &[Value]) -> Result<Value> {
            let json = args.first().and_then(as_text).unwrap_or_default();
            let path = args.get(1).and_then(as_text).unwrap_or_default();
            let doc: Value = serde_json::from_str(&json)
                .map_err(|e| SimpleError::evaluation(format!("Invalid JSON: {e}")))?;
            OgnlPath::parse(&path)?.navigate(&JsonPropertyAccessor, doc)
        }
    }
}

/// One dispatch of function text.
pub(crate) struct Dispatch<'s, 'a> {
    pub scope: &'s Scope<'a>,
    pub function: &'s str,
    pub index: usize,
    pub strict: bool,
}

impl<'s> Dispatch<'s, '_> {
    /// `text` after `prefix`, only when something follows the prefix.
    pub fn remainder(&self, prefix: &str) -> Option<&'s str> {
        self.function
            .strip_prefix(prefix)
            .filter(|rest| !rest.is_empty())
    }

    pub fn invalid(&self, syntax: &str) -> SimpleError {
        SimpleError::syntax(
            self.index,
            format!("Valid syntax: ${{{syntax}}} was: {}", self.function),
        )
    }

    /// Compile an argument as a nested simple expression; a fully quoted
    /// argument is a plain string.
    pub fn argument(&self, text: &str, mode: Mode) -> Result<Expression> {
        let text = text.trim();
        if let Some(inner) = unquote(text) {
            return Ok(Expression::constant(inner));
        }
        let scope = self.scope.nested(text);
        parser::compile(text, mode, &scope).map_err(|e| reanchor(e, self.index))
    }

    /// Argument compiled as an expression, or the body when empty.
    pub fn argument_or_body(&self, text: &str) -> Result<Expression> {
        if text.trim().is_empty() {
            return Ok(message::body());
        }
        self.argument(text, Mode::Expression)
    }
}

/// Resolve function text in strict mode, through the leaf cache when one is
/// available.
pub(crate) fn resolve_cached(scope: &Scope, text: &str, index: usize) -> Result<Expression> {
    let cache = scope.cache.filter(|_| scope.options().cache_enabled);
    if let Some(hit) = cache.and_then(|c| c.get(text).map(|e| e.value().clone())) {
        tracing::trace!(function = text, "function cache hit");
        return Ok(hit);
    }
    let expression = resolve(scope, text, index, true)?.ok_or_else(|| SimpleError::UnknownFunction {
        function: text.to_string(),
        index,
    })?;
    if let Some(cache) = cache {
        cache.insert(text.to_string(), expression.clone());
    }
    Ok(expression)
}

/// Compile function text. Unknown text is an error in strict mode and `None`
/// otherwise.
pub(crate) fn resolve(scope: &Scope, text: &str, index: usize, strict: bool) -> Result<Option<Expression>> {
    let d = Dispatch {
        scope,
        function: text,
        index,
        strict,
    };
    let families: [fn(&Dispatch) -> Result<Option<Expression>>; 6] = [
        custom,
        message::resolve,
        file::resolve,
        date::resolve,
        misc::resolve_lookups,
        misc::resolve,
    ];
    for family in families {
        if let Some(expression) = family(&d)? {
            tracing::trace!(function = text, "resolved function");
            return Ok(Some(expression));
        }
    }
    if strict {
        return Err(SimpleError::UnknownFunction {
            function: text.to_string(),
            index,
        });
    }
    Ok(None)
}

/// `$name(args)` against the registry; `$name()` passes the body.
fn custom(d: &Dispatch) -> Result<Option<Expression>> {
    let Some((name, args)) = d
        .function
        .strip_prefix('$')
        .and_then(|rest| rest.split_once('('))
    else {
        return Ok(None);
    };
    let Some(f) = d.scope.core.registry.get(name) else {
        return Ok(None);
    };
    let Some(args) = args.trim_end().strip_suffix(')') else {
        return Err(d.invalid(&format!("${name}(args)")));
    };
    let args = if args.trim().is_empty() {
        vec![message::body()]
    } else {
        split_args(args)
            .iter()
            .map(|a| d.argument(a, Mode::Expression))
            .collect::<Result<Vec<_>>>()?
    };
    let arity = f.arity();
    if !arity.contains(&args.len()) {
        return Err(SimpleError::syntax(
            d.index,
            format!(
                "Function ${name} takes {} to {} arguments but was given {}",
                arity.start(),
                arity.end(),
                args.len()
            ),
        ));
    }
    Ok(Some(Expression::function(format!("${name}"), move |ex| {
        let values = args
            .iter()
            .map(|a| a.evaluate_value(ex))
            .collect::<Result<Vec<_>>>()?;
        f.call(&values)
    })))
}

/// Split on top-level commas, ignoring commas inside quotes, parentheses or
/// `${}` blocks. Parts are trimmed.
pub(crate) fn split_args(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '{') => depth += 1,
            (None, ')' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Inner text of a string wrapped in matching single or double quotes.
pub(crate) fn unquote(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if text.len() < 2 || !matches!(first, '\'' | '"') || !text.ends_with(first) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    (!inner.contains(first)).then_some(inner)
}

/// Quotes removed when present, otherwise the text itself.
pub(crate) fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    unquote(text).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefaultExchange;
    use crate::engine::LanguageCore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn core() -> Arc<LanguageCore> {
        Arc::new(LanguageCore::new(Registry::with_builtins(), Default::default()))
    }

    fn eval(text: &str, ex: &mut DefaultExchange) -> Result<Value> {
        let core = core();
        let scope = Scope::new(&core, None, text, 0);
        resolve_cached(&scope, text, 0)?.evaluate_value(ex)
    }

    #[test]
    fn splits_respecting_nesting() {
        assert_eq!(split_args("a, 'b,c', ${x(1,2)}"), vec!["a", "'b,c'", "${x(1,2)}"]);
        assert_eq!(split_args("f(a,b),c"), vec!["f(a,b)", "c"]);
        assert_eq!(split_args(""), Vec::<String>::new());
        assert_eq!(split_args("a,"), vec!["a", ""]);
    }

    #[test]
    fn quotes() {
        assert_eq!(unquote("'abc'"), Some("abc"));
        assert_eq!(unquote("\"\""), Some(""));
        assert_eq!(unquote("'a'b'"), None);
        assert_eq!(strip_quotes(" plain "), "plain");
    }

    #[test]
    fn custom_functions_receive_evaluated_arguments() {
        let mut ex = DefaultExchange::new().with_body("Hello").with_header("who", "World");
        assert_eq!(eval("$first(${header.who})", &mut ex).unwrap(), json!("World"));
        assert_eq!(eval("$first()", &mut ex).unwrap(), json!("Hello"));
        assert_eq!(eval("$or_default(${header.missing}, 'none')", &mut ex).unwrap(), json!("none"));
        assert_eq!(
            eval("$from_json('{\"a\":[1,2]}', a[1])", &mut ex).unwrap(),
            json!(2)
        );

        let mut ex = DefaultExchange::new().with_header("tags", json!(["b", "a", "b"]));
        assert_eq!(eval("$unique(${header.tags})", &mut ex).unwrap(), json!(["b", "a"]));
        assert_eq!(eval("$first(${header.tags})", &mut ex).unwrap(), json!("b"));
    }

    #[test]
    fn custom_function_arity_is_checked() {
        let mut ex = DefaultExchange::new();
        let err = eval("$first(a, b)", &mut ex).unwrap_err();
        assert!(err.to_string().contains("takes 1 to 1 arguments"));
    }

    #[test]
    fn unknown_text_strict_and_lenient() {
        let core = core();
        let scope = Scope::new(&core, None, "bogus", 0);
        assert!(matches!(
            resolve(&scope, "bogus", 2, true),
            Err(SimpleError::UnknownFunction { index: 2, .. })
        ));
        assert!(resolve(&scope, "bogus", 2, false).unwrap().is_none());
    }
}
