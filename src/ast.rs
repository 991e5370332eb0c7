//! Parsed node tree. Lives only until [`SimpleNode::create_expression`] has
//! produced the compiled form.

use crate::comparison;
use crate::errors::{Result, SimpleError};
use crate::expression::{Deferred, ExprKind, Expression};
use crate::functions;
use crate::grammar::{BinaryOperator, LogicalOperator, OtherOperator};
use crate::parser::Scope;
use serde_json::{Number, Value};
use std::fmt;

type Operand = Option<Box<SimpleNode>>;

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleNode {
    Literal {
        index: usize,
        text: String,
        /// The quote character the text was written in, if any.
        quote: Option<char>,
    },
    Composite {
        index: usize,
        children: Vec<SimpleNode>,
    },
    Function(FunctionBlock),
    Binary {
        index: usize,
        op: BinaryOperator,
        left: Operand,
        right: Operand,
    },
    Logical {
        index: usize,
        op: LogicalOperator,
        left: Operand,
        right: Operand,
    },
    /// Elvis.
    Other {
        index: usize,
        op: OtherOperator,
        left: Operand,
        right: Operand,
    },
    Chain {
        index: usize,
        null_safe: bool,
        left: Operand,
        stages: Vec<SimpleNode>,
    },
    Init {
        index: usize,
        left: Operand,
        right: Operand,
    },
    Ternary {
        index: usize,
        condition: Box<SimpleNode>,
        when_true: Box<SimpleNode>,
        when_false: Box<SimpleNode>,
    },
    Numeric {
        index: usize,
        value: Number,
    },
    Boolean {
        index: usize,
        value: bool,
    },
    Null {
        index: usize,
    },
}

/// The contents of one `${...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBlock {
    pub index: usize,
    pub depth: usize,
    pub children: Vec<SimpleNode>,
}

impl FunctionBlock {
    /// The function text when the block is a single unquoted literal.
    pub fn simple_text(&self) -> Option<&str> {
        match self.children.as_slice() {
            [SimpleNode::Literal { text, quote: None, .. }] => Some(text),
            _ => None,
        }
    }
}

impl SimpleNode {
    pub fn index(&self) -> usize {
        match self {
            SimpleNode::Function(block) => block.index,
            SimpleNode::Literal { index, .. }
            | SimpleNode::Composite { index, .. }
            | SimpleNode::Binary { index, .. }
            | SimpleNode::Logical { index, .. }
            | SimpleNode::Other { index, .. }
            | SimpleNode::Chain { index, .. }
            | SimpleNode::Init { index, .. }
            | SimpleNode::Ternary { index, .. }
            | SimpleNode::Numeric { index, .. }
            | SimpleNode::Boolean { index, .. }
            | SimpleNode::Null { index } => *index,
        }
    }

    pub(crate) fn literal(index: usize, text: impl Into<String>) -> Self {
        SimpleNode::Literal {
            index,
            text: text.into(),
            quote: None,
        }
    }

    pub(crate) fn create_expression(&self, scope: &Scope) -> Result<Expression> {
        Ok(match self {
            SimpleNode::Literal { text, .. } => Expression::constant(text.as_str()),
            SimpleNode::Numeric { value, .. } => Expression::constant(Value::Number(value.clone())),
            SimpleNode::Boolean { value, .. } => Expression::constant(*value),
            SimpleNode::Null { .. } => Expression::constant(Value::Null),
            SimpleNode::Composite { children, .. } => {
                Expression::new(ExprKind::Concat(build_all(children, scope)?))
            }
            SimpleNode::Function(block) => block.create_expression(scope)?,
            SimpleNode::Binary {
                index,
                op,
                left,
                right,
            } => {
                let (l, r) = operands(op.symbol(), "Binary", *index, left, right)?;
                let left = l.create_expression(scope)?;
                let right_expr = r.create_expression(scope)?;
                let constant = right_expr.as_constant().and_then(crate::convert::as_text);
                let mut pattern = None;
                let mut range = None;
                match (op, constant) {
                    (BinaryOperator::Range | BinaryOperator::NotRange, Some(text)) => {
                        range = Some(comparison::parse_range(&text).ok_or(
                            SimpleError::InvalidRange {
                                value: text,
                                index: r.index(),
                            },
                        )?);
                    }
                    (BinaryOperator::Regex | BinaryOperator::NotRegex, Some(text)) => {
                        pattern = Some(comparison::full_match(&text).map_err(|e| {
                            SimpleError::syntax(r.index(), format!("Invalid regex {text}: {e}"))
                        })?);
                    }
                    _ => {}
                }
                Expression::new(ExprKind::Binary {
                    op: *op,
                    left,
                    right: right_expr,
                    index: r.index(),
                    pattern,
                    range,
                })
            }
            SimpleNode::Logical {
                index,
                op,
                left,
                right,
            } => {
                let (l, r) = operands(op.symbol(), "Logical", *index, left, right)?;
                Expression::new(ExprKind::Logical {
                    op: *op,
                    left: l.create_expression(scope)?,
                    right: r.create_expression(scope)?,
                })
            }
            SimpleNode::Other {
                index,
                op,
                left,
                right,
            } => {
                let (l, r) = operands(op.symbol(), "Other", *index, left, right)?;
                let left = l.create_expression(scope)?;
                let right = r.create_expression(scope)?;
                match op {
                    OtherOperator::Elvis => Expression::new(ExprKind::Elvis { left, right }),
                    OtherOperator::Chain | OtherOperator::ChainNullSafe => {
                        Expression::new(ExprKind::Chain {
                            null_safe: *op == OtherOperator::ChainNullSafe,
                            left,
                            stages: vec![right],
                        })
                    }
                }
            }
            SimpleNode::Chain {
                index,
                null_safe,
                left,
                stages,
            } => {
                let symbol = if *null_safe { "?->" } else { "->" };
                let Some(left) = left else {
                    return Err(missing("Other", symbol, "left", *index));
                };
                if stages.is_empty() {
                    return Err(missing("Other", symbol, "right", *index));
                }
                Expression::new(ExprKind::Chain {
                    null_safe: *null_safe,
                    left: left.create_expression(scope)?,
                    stages: build_all(stages, scope)?,
                })
            }
            SimpleNode::Init { index, left, right } => {
                let (l, r) = operands(":=", "Init", *index, left, right)?;
                Expression::new(ExprKind::Assign {
                    name: l.create_expression(scope)?,
                    value: r.create_expression(scope)?,
                })
            }
            SimpleNode::Ternary {
                condition,
                when_true,
                when_false,
                ..
            } => Expression::new(ExprKind::Ternary {
                condition: condition.create_expression(scope)?.into_predicate(),
                when_true: when_true.create_expression(scope)?,
                when_false: when_false.create_expression(scope)?,
            }),
        })
    }
}

impl FunctionBlock {
    fn create_expression(&self, scope: &Scope) -> Result<Expression> {
        if let Some(text) = self.simple_text() {
            return functions::resolve_cached(scope, text.trim(), self.index);
        }
        if let [only @ SimpleNode::Ternary { .. }] = self.children.as_slice() {
            return only.create_expression(scope);
        }
        // `name(...${x}...)` compiles its arguments itself, keeping their types
        let text: String = self.children.iter().map(|c| c.to_string()).collect();
        if is_call(&text) {
            if let Some(expression) = functions::resolve(scope, text.trim(), self.index, false)? {
                return Ok(expression);
            }
        }
        Ok(Expression::new(ExprKind::Deferred(Deferred {
            parts: build_all(&self.children, scope)?,
            core: scope.core.clone(),
            source: scope.source.into(),
            index: self.index,
            depth: self.depth,
        })))
    }
}

fn is_call(text: &str) -> bool {
    let text = text.trim();
    let Some((name, _)) = text.split_once('(') else {
        return false;
    };
    !name.is_empty()
        && text.ends_with(')')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '$' | '_'))
}

fn build_all(nodes: &[SimpleNode], scope: &Scope) -> Result<Vec<Expression>> {
    nodes.iter().map(|n| n.create_expression(scope)).collect()
}

fn operands<'n>(
    symbol: &str,
    family: &str,
    index: usize,
    left: &'n Operand,
    right: &'n Operand,
) -> Result<(&'n SimpleNode, &'n SimpleNode)> {
    let l = left
        .as_deref()
        .ok_or_else(|| missing(family, symbol, "left", index))?;
    let r = right
        .as_deref()
        .ok_or_else(|| missing(family, symbol, "right", index))?;
    Ok((l, r))
}

fn missing(family: &str, symbol: &str, side: &str, index: usize) -> SimpleError {
    SimpleError::syntax(
        index,
        format!("{family} operator {symbol} has no {side} hand side token"),
    )
}

impl fmt::Display for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |f: &mut fmt::Formatter<'_>, n: &Operand| match n {
            Some(n) => write!(f, "{n}"),
            None => Ok(()),
        };
        match self {
            SimpleNode::Literal { text, quote: Some(q), .. } => write!(f, "{q}{text}{q}"),
            SimpleNode::Literal { text, .. } => f.write_str(text),
            SimpleNode::Composite { children, .. } => children.iter().try_for_each(|c| write!(f, "{c}")),
            SimpleNode::Function(block) => {
                f.write_str("${")?;
                block.children.iter().try_for_each(|c| write!(f, "{c}"))?;
                f.write_str("}")
            }
            SimpleNode::Binary { op, left, right, .. } => {
                side(f, left)?;
                write!(f, " {} ", op.symbol())?;
                side(f, right)
            }
            SimpleNode::Logical { op, left, right, .. } => {
                side(f, left)?;
                write!(f, " {} ", op.symbol())?;
                side(f, right)
            }
            SimpleNode::Other { op, left, right, .. } => {
                side(f, left)?;
                write!(f, " {} ", op.symbol())?;
                side(f, right)
            }
            SimpleNode::Chain {
                null_safe,
                left,
                stages,
                ..
            } => {
                side(f, left)?;
                let symbol = if *null_safe { "?->" } else { "->" };
                stages.iter().try_for_each(|s| write!(f, " {symbol} {s}"))
            }
            SimpleNode::Init { left, right, .. } => {
                side(f, left)?;
                f.write_str(" := ")?;
                side(f, right)
            }
            SimpleNode::Ternary {
                condition,
                when_true,
                when_false,
                ..
            } => write!(f, "{condition} ? {when_true} : {when_false}"),
            SimpleNode::Numeric { value, .. } => write!(f, "{value}"),
            SimpleNode::Boolean { value, .. } => write!(f, "{value}"),
            SimpleNode::Null { .. } => f.write_str("null"),
        }
    }
}
