//! Compiled, immutable expressions and predicates.

use crate::comparison::{self, cmp_values};
use crate::context::{BodyGuard, Exchange};
use crate::convert::{as_text, truthy, TargetType};
use crate::engine::LanguageCore;
use crate::errors::{Result, SimpleError};
use crate::functions;
use crate::grammar::{BinaryOperator, LogicalOperator};
use crate::parser::Scope;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub(crate) type FunctionFn = dyn Fn(&mut dyn Exchange) -> Result<Value> + Send + Sync;

/// A compiled expression. Cheap to clone and safe to share between threads;
/// evaluation never mutates it.
#[derive(Clone)]
pub struct Expression {
    inner: Arc<ExprKind>,
}

pub(crate) enum ExprKind {
    Constant(Value),
    /// Children evaluated to text and joined; null children contribute nothing.
    Concat(Vec<Expression>),
    Function {
        name: String,
        f: Arc<FunctionFn>,
    },
    /// Function text assembled at evaluation time and dispatched afresh.
    Deferred(Deferred),
    Binary {
        op: BinaryOperator,
        left: Expression,
        right: Expression,
        index: usize,
        pattern: Option<Regex>,
        range: Option<(i64, i64)>,
    },
    Logical {
        op: LogicalOperator,
        left: Expression,
        right: Expression,
    },
    Elvis {
        left: Expression,
        right: Expression,
    },
    Chain {
        null_safe: bool,
        left: Expression,
        stages: Vec<Expression>,
    },
    Assign {
        name: Expression,
        value: Expression,
    },
    Ternary {
        condition: Predicate,
        when_true: Expression,
        when_false: Expression,
    },
}

pub(crate) struct Deferred {
    pub parts: Vec<Expression>,
    pub core: Arc<LanguageCore>,
    pub source: Arc<str>,
    pub index: usize,
    pub depth: usize,
}

impl Expression {
    pub(crate) fn new(kind: ExprKind) -> Self {
        Self {
            inner: Arc::new(kind),
        }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::new(ExprKind::Constant(value.into()))
    }

    /// Wrap a closure as a leaf function expression.
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn Exchange) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(ExprKind::Function {
            name: name.into(),
            f: Arc::new(f),
        })
    }

    pub(crate) fn as_constant(&self) -> Option<&Value> {
        match &*self.inner {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Evaluate and convert the result to `target`.
    pub fn evaluate(&self, exchange: &mut dyn Exchange, target: TargetType) -> Result<Value> {
        let value = self.value(exchange)?;
        if target == TargetType::Object {
            return Ok(value);
        }
        exchange.type_converter().convert(&value, target)
    }

    /// Evaluate without conversion.
    pub fn evaluate_value(&self, exchange: &mut dyn Exchange) -> Result<Value> {
        self.value(exchange)
    }

    /// Evaluate and render as text; null renders as the empty string.
    pub fn evaluate_string(&self, exchange: &mut dyn Exchange) -> Result<String> {
        Ok(as_text(&self.value(exchange)?).unwrap_or_default())
    }

    pub fn into_predicate(self) -> Predicate {
        Predicate { expression: self }
    }

    fn value(&self, ex: &mut dyn Exchange) -> Result<Value> {
        match &*self.inner {
            ExprKind::Constant(v) => Ok(v.clone()),
            ExprKind::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    if let Some(text) = as_text(&part.value(ex)?) {
                        out.push_str(&text);
                    }
                }
                Ok(Value::String(out))
            }
            ExprKind::Function { f, .. } => f(ex),
            ExprKind::Deferred(d) => d.evaluate(ex),
            ExprKind::Binary {
                op,
                left,
                right,
                index,
                pattern,
                range,
            } => {
                let l = left.value(ex)?;
                let r = right.value(ex)?;
                binary(*op, &l, &r, ex, *index, pattern.as_ref(), *range).map(Value::Bool)
            }
            ExprKind::Logical { op, left, right } => {
                let l = matches_value(&left.value(ex)?);
                let out = match op {
                    LogicalOperator::And => l && matches_value(&right.value(ex)?),
                    LogicalOperator::Or => l || matches_value(&right.value(ex)?),
                };
                Ok(Value::Bool(out))
            }
            ExprKind::Elvis { left, right } => {
                let l = left.value(ex)?;
                if truthy(&l) {
                    Ok(l)
                } else {
                    right.value(ex)
                }
            }
            ExprKind::Chain {
                null_safe,
                left,
                stages,
            } => {
                let carried = left.value(ex)?;
                if carried.is_null() && *null_safe {
                    return Ok(Value::Null);
                }
                let mut guard = BodyGuard::install(ex, carried);
                let mut last = Value::Null;
                for stage in stages {
                    last = stage.value(guard.exchange())?;
                    if last.is_null() && *null_safe {
                        return Ok(Value::Null);
                    }
                    guard.set_body(last.clone());
                }
                Ok(last)
            }
            ExprKind::Assign { name, value } => {
                let key = as_text(&name.value(ex)?).unwrap_or_default();
                let key = key.trim();
                let key = key.strip_prefix('$').unwrap_or(key);
                if key.is_empty() {
                    return Err(SimpleError::evaluation("Assignment has no variable name"));
                }
                let v = value.value(ex)?;
                ex.set_variable(key, v);
                Ok(Value::Null)
            }
            ExprKind::Ternary {
                condition,
                when_true,
                when_false,
            } => {
                if condition.matches(ex)? {
                    when_true.value(ex)
                } else {
                    when_false.value(ex)
                }
            }
        }
    }
}

impl Deferred {
    fn evaluate(&self, ex: &mut dyn Exchange) -> Result<Value> {
        let mut text = String::new();
        for part in &self.parts {
            if let Some(t) = as_text(&part.value(ex)?) {
                text.push_str(&t);
            }
        }
        tracing::trace!(function = %text, "re-dispatching assembled function");
        let scope = Scope::new(&self.core, None, &self.source, self.depth + 1);
        let resolved = functions::resolve(&scope, text.trim(), self.index, true)
            .map_err(|e| self.illegal(e))?;
        match resolved {
            Some(expression) => expression.value(ex),
            None => Err(self.illegal(SimpleError::UnknownFunction {
                function: text,
                index: self.index,
            })),
        }
    }

    fn illegal(&self, err: SimpleError) -> SimpleError {
        match err {
            SimpleError::Syntax { message, .. } => SimpleError::IllegalSyntax {
                expression: self.source.to_string(),
                index: Some(self.index),
                message,
            },
            SimpleError::UnknownFunction { .. }
            | SimpleError::InvalidOgnl { .. }
            | SimpleError::InvalidRange { .. } => SimpleError::IllegalSyntax {
                expression: self.source.to_string(),
                index: Some(self.index),
                message: err.to_string(),
            },
            other => other,
        }
    }
}

fn binary(
    op: BinaryOperator,
    l: &Value,
    r: &Value,
    ex: &dyn Exchange,
    index: usize,
    pattern: Option<&Regex>,
    range: Option<(i64, i64)>,
) -> Result<bool> {
    if let Some(positive) = op.negated() {
        return binary(positive, l, r, ex, index, pattern, range).map(|b| !b);
    }
    Ok(match op {
        BinaryOperator::Equals => comparison::equals(l, r, false),
        BinaryOperator::EqualsIgnoreCase => comparison::equals(l, r, true),
        BinaryOperator::GreaterThan => cmp_values(l, r, |o| o == Ordering::Greater),
        BinaryOperator::GreaterThanOrEquals => cmp_values(l, r, |o| o != Ordering::Less),
        BinaryOperator::LessThan => cmp_values(l, r, |o| o == Ordering::Less),
        BinaryOperator::LessThanOrEquals => cmp_values(l, r, |o| o != Ordering::Greater),
        BinaryOperator::Contains => comparison::contains(l, r, false),
        BinaryOperator::ContainsIgnoreCase => comparison::contains(l, r, true),
        BinaryOperator::StartsWith => comparison::starts_with(l, r),
        BinaryOperator::EndsWith => comparison::ends_with(l, r),
        BinaryOperator::In => comparison::is_in(l, r),
        BinaryOperator::Is => {
            let name = as_text(r).unwrap_or_default();
            let target = ex
                .resolve_type(&name)
                .ok_or(SimpleError::UnknownType { name })?;
            target.is_instance(l)
        }
        BinaryOperator::Regex => {
            let Some(text) = as_text(l) else {
                return Ok(false);
            };
            match pattern {
                Some(re) => re.is_match(&text),
                None => {
                    let source = as_text(r).unwrap_or_default();
                    comparison::full_match(&source)
                        .map_err(|e| SimpleError::evaluation(format!("Invalid regex {source}: {e}")))?
                        .is_match(&text)
                }
            }
        }
        BinaryOperator::Range => {
            let bounds = match range {
                Some(bounds) => bounds,
                None => {
                    let text = as_text(r).unwrap_or_default();
                    comparison::parse_range(&text)
                        .ok_or(SimpleError::InvalidRange { value: text, index })?
                }
            };
            comparison::in_range(l, bounds)
        }
        // negated forms are folded above
        _ => false,
    })
}

/// Predicate truthiness: the elvis rule, plus the text `false` in any case.
pub fn matches_value(value: &Value) -> bool {
    match value {
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => false,
        other => truthy(other),
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            ExprKind::Constant(v) => write!(f, "Constant({v})"),
            ExprKind::Concat(parts) => f.debug_tuple("Concat").field(parts).finish(),
            ExprKind::Function { name, .. } => write!(f, "Function({name})"),
            ExprKind::Deferred(d) => f.debug_tuple("Deferred").field(&d.parts).finish(),
            ExprKind::Binary { op, left, right, .. } => {
                write!(f, "Binary({left:?} {} {right:?})", op.symbol())
            }
            ExprKind::Logical { op, left, right } => {
                write!(f, "Logical({left:?} {} {right:?})", op.symbol())
            }
            ExprKind::Elvis { left, right } => write!(f, "Elvis({left:?} ?: {right:?})"),
            ExprKind::Chain { left, stages, .. } => {
                f.debug_struct("Chain").field("left", left).field("stages", stages).finish()
            }
            ExprKind::Assign { name, value } => write!(f, "Assign({name:?} := {value:?})"),
            ExprKind::Ternary {
                condition,
                when_true,
                when_false,
            } => write!(f, "Ternary({:?} ? {when_true:?} : {when_false:?})", condition.expression),
        }
    }
}

/// An expression used as a condition.
#[derive(Clone, Debug)]
pub struct Predicate {
    expression: Expression,
}

impl Predicate {
    pub fn matches(&self, exchange: &mut dyn Exchange) -> Result<bool> {
        Ok(matches_value(&self.expression.value(exchange)?))
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefaultExchange;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn body() -> Expression {
        Expression::function("body", |ex| Ok(ex.body().clone()))
    }

    fn failing() -> Expression {
        Expression::function("boom", |_| Err(SimpleError::evaluation("boom")))
    }

    #[test]
    fn elvis_follows_truthiness() {
        for (left, expected) in [
            (json!(null), json!("x")),
            (json!(""), json!("x")),
            (json!(0), json!("x")),
            (json!("y"), json!("y")),
        ] {
            let e = Expression::new(ExprKind::Elvis {
                left: Expression::constant(left),
                right: Expression::constant("x"),
            });
            let mut ex = DefaultExchange::new();
            assert_eq!(e.evaluate_value(&mut ex).unwrap(), expected);
        }
    }

    #[test]
    fn ternary_takes_one_branch() {
        let e = Expression::new(ExprKind::Ternary {
            condition: Expression::constant(true).into_predicate(),
            when_true: Expression::constant("yes"),
            when_false: failing(),
        });
        let mut ex = DefaultExchange::new();
        assert_eq!(e.evaluate_value(&mut ex).unwrap(), json!("yes"));
    }

    #[test]
    fn chain_restores_body_after_failure() {
        let e = Expression::new(ExprKind::Chain {
            null_safe: false,
            left: Expression::constant("tmp"),
            stages: vec![body(), failing()],
        });
        let mut ex = DefaultExchange::new().with_body("orig");
        assert!(e.evaluate_value(&mut ex).is_err());
        assert_eq!(ex.body(), &json!("orig"));
    }

    #[test]
    fn null_safe_chain_short_circuits() {
        let e = Expression::new(ExprKind::Chain {
            null_safe: true,
            left: Expression::constant(Value::Null),
            stages: vec![failing()],
        });
        let mut ex = DefaultExchange::new();
        assert_eq!(e.evaluate_value(&mut ex).unwrap(), Value::Null);
    }

    #[test]
    fn predicate_treats_false_text_as_false() {
        let mut ex = DefaultExchange::new();
        assert!(!Expression::constant("FALSE").into_predicate().matches(&mut ex).unwrap());
        assert!(Expression::constant("no").into_predicate().matches(&mut ex).unwrap());
    }

    #[test]
    fn conversion_applies_to_target() {
        let mut ex = DefaultExchange::new();
        let e = Expression::constant("42");
        assert_eq!(e.evaluate(&mut ex, TargetType::Integer).unwrap(), json!(42));
        assert!(e.evaluate(&mut ex, TargetType::Boolean).is_err());
    }
}
