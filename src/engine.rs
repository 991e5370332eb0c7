//! [`SimpleLanguage`]: the public entry point that compiles expression text.

use crate::config::SimpleOptions;
use crate::errors::Result;
use crate::expression::{Expression, Predicate};
use crate::functions::{self, Registry};
use crate::parser::{self, Mode, Scope};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Immutable state every compiled expression may need again at evaluation
/// time, when a deferred block is re-dispatched.
#[derive(Debug, Default)]
pub(crate) struct LanguageCore {
    pub registry: Registry,
    pub options: SimpleOptions,
}

impl LanguageCore {
    pub fn new(registry: Registry, options: SimpleOptions) -> Self {
        Self { registry, options }
    }
}

/// Compiles simple expressions and predicates.
///
/// Compiled results are cached by their source text and shared between
/// threads, so one language instance is meant to live as long as the routes
/// that use it.
///
/// ```
/// use simple_lang::{DefaultExchange, SimpleLanguage};
///
/// let lang = SimpleLanguage::new();
/// let mut ex = DefaultExchange::new().with_header("n", 5);
/// let e = lang.parse_expression("${header.n} > 3 ? big : small").unwrap();
/// assert_eq!(e.evaluate_string(&mut ex).unwrap(), "big");
/// ```
#[derive(Debug)]
pub struct SimpleLanguage {
    core: Arc<LanguageCore>,
    functions: DashMap<String, Expression>,
    expressions: DashMap<String, Expression>,
    predicates: DashMap<String, Predicate>,
}

impl Default for SimpleLanguage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleLanguage {
    /// Default options and the built-in custom functions.
    pub fn new() -> Self {
        Self::with_registry(Registry::with_builtins(), SimpleOptions::default())
    }

    pub fn with_options(options: SimpleOptions) -> Self {
        Self::with_registry(Registry::with_builtins(), options)
    }

    pub fn with_registry(registry: Registry, options: SimpleOptions) -> Self {
        Self {
            core: Arc::new(LanguageCore::new(registry, options)),
            functions: DashMap::new(),
            expressions: DashMap::new(),
            predicates: DashMap::new(),
        }
    }

    pub fn options(&self) -> &SimpleOptions {
        &self.core.options
    }

    pub fn registry(&self) -> &Registry {
        &self.core.registry
    }

    /// Compile `text` as an expression: a template with embedded `${}`
    /// functions, or operator grammar when a ternary, elvis, chain or
    /// assignment operator appears at the top level.
    pub fn parse_expression(&self, text: &str) -> Result<Expression> {
        if let Some(hit) = self.cached(&self.expressions, text) {
            debug!(expression = text, "expression cache hit");
            return Ok(hit);
        }
        let expression = parser::compile(text, Mode::Expression, &self.scope(text))
            .map_err(|e| e.in_expression(text))?;
        debug!(expression = text, compiled = ?expression, "compiled expression");
        if self.options().cache_enabled {
            self.expressions.insert(text.to_string(), expression.clone());
        }
        Ok(expression)
    }

    /// Compile `text` as a predicate; operators are always recognised.
    pub fn parse_predicate(&self, text: &str) -> Result<Predicate> {
        if let Some(hit) = self.cached(&self.predicates, text) {
            debug!(predicate = text, "predicate cache hit");
            return Ok(hit);
        }
        let predicate = parser::compile(text, Mode::Predicate, &self.scope(text))
            .map_err(|e| e.in_expression(text))?
            .into_predicate();
        debug!(predicate = text, compiled = ?predicate, "compiled predicate");
        if self.options().cache_enabled {
            self.predicates.insert(text.to_string(), predicate.clone());
        }
        Ok(predicate)
    }

    /// Dispatch the text of a single function, without the surrounding `${}`.
    ///
    /// Unknown text is an error in strict mode and `Ok(None)` otherwise.
    pub fn resolve_function(&self, text: &str, strict: bool) -> Result<Option<Expression>> {
        let scope = self.scope(text);
        functions::resolve(&scope, text.trim(), 0, strict).map_err(|e| e.in_expression(text))
    }

    pub fn clear_cache(&self) {
        self.functions.clear();
        self.expressions.clear();
        self.predicates.clear();
    }

    fn scope<'a>(&'a self, text: &'a str) -> Scope<'a> {
        Scope::new(&self.core, Some(&self.functions), text, 0)
    }

    fn cached<T: Clone>(&self, cache: &DashMap<String, T>, text: &str) -> Option<T> {
        if !self.options().cache_enabled {
            return None;
        }
        let hit = cache.get(text).map(|e| e.value().clone());
        if hit.is_none() {
            debug!(text, "cache miss");
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefaultExchange;
    use crate::errors::SimpleError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn caches_by_source_text() {
        let lang = SimpleLanguage::new();
        lang.parse_expression("Hello ${header.name}").unwrap();
        lang.parse_expression("Hello ${header.name}").unwrap();
        lang.parse_predicate("${header.n} > 1").unwrap();
        assert_eq!(lang.expressions.len(), 1);
        assert_eq!(lang.predicates.len(), 1);
        assert!(lang.functions.contains_key("header.name"));
        assert!(lang.functions.contains_key("header.n"));

        lang.clear_cache();
        assert!(lang.expressions.is_empty());
    }

    #[test]
    fn cache_can_be_disabled() {
        let lang = SimpleLanguage::with_options(SimpleOptions::default().without_cache());
        let mut ex = DefaultExchange::new().with_header("name", "World");
        let e = lang.parse_expression("Hello ${header.name}").unwrap();
        assert_eq!(e.evaluate_string(&mut ex).unwrap(), "Hello World");
        assert!(lang.expressions.is_empty());
        assert!(lang.functions.is_empty());
    }

    #[test]
    fn syntax_errors_carry_the_expression() {
        let err = SimpleLanguage::new()
            .parse_predicate("${header.foo} ==")
            .unwrap_err();
        match &err {
            SimpleError::IllegalSyntax { expression, .. } => {
                assert_eq!(expression, "${header.foo} ==")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.diagnostic().is_some());
    }

    #[test]
    fn resolves_single_functions() {
        let lang = SimpleLanguage::new();
        let mut ex = DefaultExchange::new().with_body(json!({"id": 7}));
        let e = lang.resolve_function("body.id", true).unwrap().unwrap();
        assert_eq!(e.evaluate_value(&mut ex).unwrap(), json!(7));
        assert!(lang.resolve_function("no such thing", false).unwrap().is_none());
        assert!(lang.resolve_function("no such thing", true).is_err());
    }
}
