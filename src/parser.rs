//! Token stream to [`SimpleNode`] tree.
//!
//! Parsing runs in two passes. Tokens are first grouped into items (text runs,
//! quoted spans, nested `${}` blocks, operators and ternary markers) with
//! block and quote balance checked. The items are then split by operator
//! precedence, loosest first: assignment, ternary, logical, elvis/chain and
//! finally the binary comparisons around single operands.
//!
//! Text parsed as an expression only switches to operator grammar when a
//! ternary, elvis, chain or assignment operator appears outside any block or
//! quote. Otherwise it is a template: literal text with embedded functions.

use crate::ast::{FunctionBlock, SimpleNode};
use crate::config::SimpleOptions;
use crate::convert::parse_number;
use crate::engine::LanguageCore;
use crate::errors::{Result, SimpleError};
use crate::expression::Expression;
use crate::grammar::{comparison_symbols, LogicalOperator, OperatorKind, OtherOperator, TernaryMarker};
use crate::tokenizer::{tokenize, Token, TokenKind, TokenizerOptions};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Expression,
    Predicate,
}

/// What a parse needs from its language: options, custom functions, the leaf
/// function cache, and the text errors should be anchored to.
pub(crate) struct Scope<'a> {
    pub core: &'a Arc<LanguageCore>,
    pub cache: Option<&'a DashMap<String, Expression>>,
    pub source: &'a str,
    pub depth: usize,
}

impl<'a> Scope<'a> {
    pub fn new(
        core: &'a Arc<LanguageCore>,
        cache: Option<&'a DashMap<String, Expression>>,
        source: &'a str,
        depth: usize,
    ) -> Self {
        Self {
            core,
            cache,
            source,
            depth,
        }
    }

    pub fn options(&self) -> &SimpleOptions {
        &self.core.options
    }

    /// Scope for text embedded one level deeper than this one.
    pub fn nested<'b>(&'b self, source: &'b str) -> Scope<'b> {
        Scope {
            core: self.core,
            cache: self.cache,
            source,
            depth: self.depth + 1,
        }
    }
}

pub(crate) fn compile(text: &str, mode: Mode, scope: &Scope) -> Result<Expression> {
    parse(text, mode, scope)?.create_expression(scope)
}

pub(crate) fn parse(text: &str, mode: Mode, scope: &Scope) -> Result<SimpleNode> {
    let opts = TokenizerOptions {
        allow_escape: scope.options().allow_escape,
        assignment_alias: mode == Mode::Predicate,
    };
    let tokens = tokenize(text, opts)?;
    let operators = mode == Mode::Predicate || has_top_level_operator(&tokens);
    let mut grouper = Grouper {
        tokens: &tokens,
        pos: 0,
        base_depth: scope.depth,
        max_depth: scope.options().max_nesting_depth,
    };
    let level = if operators {
        Level::Operators
    } else {
        Level::Template
    };
    let items = grouper.items(level, 0)?;
    let parser = SpanParser { scope, mode };
    if !operators {
        return parser.template(&items);
    }
    let items = trim(&items);
    if items.is_empty() {
        return Ok(match mode {
            Mode::Predicate => SimpleNode::Boolean {
                index: 0,
                value: false,
            },
            Mode::Expression => SimpleNode::literal(0, ""),
        });
    }
    parser.node(items, mode == Mode::Predicate)
}

/// Ternary, elvis, chain or assignment outside any block or quote. A `:`
/// only counts once a `?` has opened a ternary before it.
fn has_top_level_operator(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<TokenKind> = None;
    let mut question = false;
    for t in tokens {
        match t.kind {
            TokenKind::FunctionStart => depth += 1,
            TokenKind::FunctionEnd => depth = depth.saturating_sub(1),
            TokenKind::SingleQuote | TokenKind::DoubleQuote if depth == 0 => match quote {
                None => quote = Some(t.kind),
                Some(q) if q == t.kind => quote = None,
                Some(_) => {}
            },
            TokenKind::Ternary(TernaryMarker::Colon) if depth == 0 && quote.is_none() => {
                if question {
                    return true;
                }
            }
            TokenKind::Ternary(TernaryMarker::Question) if depth == 0 && quote.is_none() => {
                question = true;
            }
            TokenKind::Operator(OperatorKind::Other(_) | OperatorKind::Assignment)
                if depth == 0 && quote.is_none() =>
            {
                return true
            }
            _ => {}
        }
    }
    false
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Text { index: usize, text: String },
    Space { index: usize, text: String },
    Quoted { index: usize, quote: char, items: Vec<Item> },
    Block { index: usize, depth: usize, items: Vec<Item> },
    Op { index: usize, kind: OperatorKind, text: String },
    Marker { index: usize, marker: TernaryMarker },
}

impl Item {
    fn index(&self) -> usize {
        match self {
            Item::Text { index, .. }
            | Item::Space { index, .. }
            | Item::Quoted { index, .. }
            | Item::Block { index, .. }
            | Item::Op { index, .. }
            | Item::Marker { index, .. } => *index,
        }
    }

    fn raw_into(&self, out: &mut String) {
        match self {
            Item::Text { text, .. } | Item::Space { text, .. } | Item::Op { text, .. } => {
                out.push_str(text)
            }
            Item::Quoted { quote, items, .. } => {
                out.push(*quote);
                items.iter().for_each(|i| i.raw_into(out));
                out.push(*quote);
            }
            Item::Block { items, .. } => {
                out.push_str("${");
                items.iter().for_each(|i| i.raw_into(out));
                out.push('}');
            }
            Item::Marker { marker, .. } => out.push(marker.symbol()),
        }
    }

    fn is_space(&self) -> bool {
        matches!(self, Item::Space { .. })
    }

    fn op(&self) -> Option<OperatorKind> {
        match self {
            Item::Op { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    fn marker(&self) -> Option<TernaryMarker> {
        match self {
            Item::Marker { marker, .. } => Some(*marker),
            _ => None,
        }
    }
}

fn raw(items: &[Item]) -> String {
    let mut out = String::new();
    items.iter().for_each(|i| i.raw_into(&mut out));
    out
}

fn trim(items: &[Item]) -> &[Item] {
    let start = items.iter().position(|i| !i.is_space()).unwrap_or(items.len());
    let end = items.iter().rposition(|i| !i.is_space()).map_or(start, |e| e + 1);
    &items[start..end.max(start)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Template,
    Operators,
    Block,
    Quote(TokenKind),
}

struct Grouper<'t> {
    tokens: &'t [Token],
    pos: usize,
    base_depth: usize,
    max_depth: usize,
}

impl Grouper<'_> {
    fn items(&mut self, level: Level, depth: usize) -> Result<Vec<Item>> {
        let mut out = Vec::new();
        while let Some(tok) = self.tokens.get(self.pos) {
            self.pos += 1;
            match tok.kind {
                TokenKind::FunctionStart => {
                    let depth = depth + 1;
                    if self.base_depth + depth > self.max_depth {
                        return Err(SimpleError::syntax(
                            tok.index,
                            format!("Maximum nesting depth of {} exceeded", self.max_depth),
                        ));
                    }
                    let items = self.items(Level::Block, depth)?;
                    out.push(Item::Block {
                        index: tok.index,
                        depth: self.base_depth + depth,
                        items,
                    });
                }
                TokenKind::FunctionEnd if level == Level::Block => return Ok(out),
                TokenKind::SingleQuote | TokenKind::DoubleQuote => match level {
                    Level::Quote(kind) if kind == tok.kind => return Ok(out),
                    Level::Operators | Level::Block if self.has_close(tok.kind) => {
                        let items = self.items(Level::Quote(tok.kind), depth)?;
                        out.push(Item::Quoted {
                            index: tok.index,
                            quote: if tok.kind == TokenKind::SingleQuote { '\'' } else { '"' },
                            items,
                        });
                    }
                    Level::Operators => {
                        let which = if tok.kind == TokenKind::SingleQuote {
                            "single"
                        } else {
                            "double"
                        };
                        return Err(SimpleError::syntax(
                            tok.index,
                            format!("{which} quote has no ending quote"),
                        ));
                    }
                    _ => push_text(&mut out, tok),
                },
                TokenKind::Whitespace if matches!(level, Level::Operators | Level::Block) => {
                    out.push(Item::Space {
                        index: tok.index,
                        text: tok.text.clone(),
                    })
                }
                TokenKind::Operator(kind) if level == Level::Operators => out.push(Item::Op {
                    index: tok.index,
                    kind,
                    text: tok.text.clone(),
                }),
                TokenKind::Ternary(marker) if matches!(level, Level::Operators | Level::Block) => {
                    out.push(Item::Marker {
                        index: tok.index,
                        marker,
                    })
                }
                _ => push_text(&mut out, tok),
            }
        }
        Ok(out)
    }

    /// Whether a matching quote closes before the enclosing block ends.
    fn has_close(&self, kind: TokenKind) -> bool {
        let mut depth = 0usize;
        for t in &self.tokens[self.pos..] {
            match t.kind {
                TokenKind::FunctionStart => depth += 1,
                TokenKind::FunctionEnd if depth == 0 => return false,
                TokenKind::FunctionEnd => depth -= 1,
                k if k == kind && depth == 0 => return true,
                _ => {}
            }
        }
        false
    }
}

fn push_text(out: &mut Vec<Item>, tok: &Token) {
    if let Some(Item::Text { text, .. }) = out.last_mut() {
        text.push_str(&tok.text);
        return;
    }
    out.push(Item::Text {
        index: tok.index,
        text: tok.text.clone(),
    });
}

struct SpanParser<'s, 'a> {
    scope: &'s Scope<'a>,
    mode: Mode,
}

impl SpanParser<'_, '_> {
    fn template(&self, items: &[Item]) -> Result<SimpleNode> {
        let mut children = items
            .iter()
            .map(|i| self.element(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(match children.len() {
            0 => SimpleNode::literal(0, ""),
            1 => children.remove(0),
            _ => SimpleNode::Composite {
                index: 0,
                children,
            },
        })
    }

    fn node(&self, items: &[Item], allow_and: bool) -> Result<SimpleNode> {
        let items = trim(items);

        if let Some(pos) = items.iter().position(|i| i.op() == Some(OperatorKind::Assignment)) {
            let (l, r) = sides(items, pos, "Init", ":=")?;
            return Ok(SimpleNode::Init {
                index: items[pos].index(),
                left: Some(Box::new(self.node(l, false)?)),
                right: Some(Box::new(self.node(r, false)?)),
            });
        }

        if let Some(q) = items
            .iter()
            .position(|i| i.marker() == Some(TernaryMarker::Question))
        {
            return self.ternary(items, q, |span| self.node(span, false));
        }
        if let Some(stray) = items
            .iter()
            .find(|i| i.marker() == Some(TernaryMarker::Colon))
        {
            return Err(SimpleError::syntax(
                stray.index(),
                "Ternary operator : has no matching ? operator",
            ));
        }

        if let Some((pos, op)) = last_op(items, |k| match k {
            OperatorKind::Logical(op) => Some(op),
            _ => None,
        }) {
            let (l, r) = sides(items, pos, "Logical", op.symbol())?;
            return Ok(SimpleNode::Logical {
                index: items[pos].index(),
                op,
                left: Some(Box::new(self.node(l, false)?)),
                right: Some(Box::new(self.node(r, false)?)),
            });
        }

        if let Some(pos) = items
            .iter()
            .rposition(|i| i.op() == Some(OperatorKind::Other(OtherOperator::Elvis)))
        {
            let (l, r) = sides(items, pos, "Other", "?:")?;
            return Ok(SimpleNode::Other {
                index: items[pos].index(),
                op: OtherOperator::Elvis,
                left: Some(Box::new(self.node(l, false)?)),
                right: Some(Box::new(self.node(r, false)?)),
            });
        }

        let chain_ops: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i.op(), Some(OperatorKind::Other(op)) if op.is_chain()))
            .map(|(p, _)| p)
            .collect();
        if let Some(&first) = chain_ops.first() {
            return self.chain(items, &chain_ops, first);
        }

        if let Some((pos, op)) = last_op(items, |k| match k {
            OperatorKind::Binary(op) => Some(op),
            _ => None,
        }) {
            let (l, r) = sides(items, pos, "Binary", op.symbol())?;
            return Ok(SimpleNode::Binary {
                index: items[pos].index(),
                op,
                left: Some(Box::new(self.node(l, false)?)),
                right: Some(Box::new(self.operand(r, false)?)),
            });
        }

        self.operand(items, allow_and)
    }

    fn ternary<F>(&self, items: &[Item], q: usize, branch: F) -> Result<SimpleNode>
    where
        F: Fn(&[Item]) -> Result<SimpleNode>,
    {
        let index = items[q].index();
        let mut nested = 0usize;
        let mut colon = None;
        for (p, item) in items.iter().enumerate().skip(q + 1) {
            match item.marker() {
                Some(TernaryMarker::Question) => nested += 1,
                Some(TernaryMarker::Colon) if nested == 0 => {
                    colon = Some(p);
                    break;
                }
                Some(TernaryMarker::Colon) => nested -= 1,
                None => {}
            }
        }
        let Some(c) = colon else {
            return Err(SimpleError::syntax(
                index,
                "Ternary operator ? has no matching : operator",
            ));
        };
        let (condition, when_true, when_false) =
            (trim(&items[..q]), trim(&items[q + 1..c]), trim(&items[c + 1..]));
        if condition.is_empty() {
            return Err(SimpleError::syntax(
                index,
                "Ternary operator ? has no condition token",
            ));
        }
        if when_true.is_empty() || when_false.is_empty() {
            return Err(SimpleError::syntax(
                index,
                "Ternary operator ? has no true or false value token",
            ));
        }
        Ok(SimpleNode::Ternary {
            index,
            condition: Box::new(self.node(condition, false)?),
            when_true: Box::new(branch(when_true)?),
            when_false: Box::new(branch(when_false)?),
        })
    }

    fn chain(&self, items: &[Item], ops: &[usize], first: usize) -> Result<SimpleNode> {
        let index = items[first].index();
        let null_safe = ops
            .iter()
            .any(|p| items[*p].op() == Some(OperatorKind::Other(OtherOperator::ChainNullSafe)));
        let symbol = if null_safe { "?->" } else { "->" };
        let left = trim(&items[..first]);
        if left.is_empty() {
            return Err(SimpleError::syntax(
                index,
                format!("Other operator {symbol} has no left hand side token"),
            ));
        }
        let mut stages = Vec::with_capacity(ops.len());
        for (n, &p) in ops.iter().enumerate() {
            let end = ops.get(n + 1).copied().unwrap_or(items.len());
            let stage = trim(&items[p + 1..end]);
            if stage.is_empty() {
                return Err(SimpleError::syntax(
                    items[p].index(),
                    format!("Other operator {symbol} has no right hand side token"),
                ));
            }
            stages.push(self.stage(stage)?);
        }
        Ok(SimpleNode::Chain {
            index,
            null_safe,
            left: Some(Box::new(self.node(left, false)?)),
            stages,
        })
    }

    /// A chain stage; `$param` reads the carried value and `$name(...)` calls a
    /// registered custom function.
    fn stage(&self, items: &[Item]) -> Result<SimpleNode> {
        let mut node = self.operand(items, false)?;
        let param = match &node {
            SimpleNode::Literal {
                index,
                text,
                quote: None,
            } if text.contains("$param") => Some((*index, text.replace("$param", "${body}"))),
            _ => None,
        };
        if let Some((index, rewritten)) = param {
            node = parse(&rewritten, Mode::Expression, &self.scope.nested(&rewritten))
                .map_err(|e| reanchor(e, index))?;
        }
        let depth = self.scope.depth + 1;
        match &node {
            SimpleNode::Literal {
                index,
                text,
                quote: None,
            } if self.is_custom_call(text) => Ok(SimpleNode::Function(FunctionBlock {
                index: *index,
                depth,
                children: vec![node.clone()],
            })),
            SimpleNode::Composite { index, children } => match children.first() {
                Some(SimpleNode::Literal { text, .. }) if self.is_custom_call(text) => {
                    Ok(SimpleNode::Function(FunctionBlock {
                        index: *index,
                        depth,
                        children: children.clone(),
                    }))
                }
                _ => Ok(node),
            },
            _ => Ok(node),
        }
    }

    fn is_custom_call(&self, text: &str) -> bool {
        text.strip_prefix('$')
            .and_then(|rest| rest.split_once('('))
            .is_some_and(|(name, _)| self.scope.core.registry.get(name).is_some())
    }

    /// A run of items with no operators left in it.
    fn operand(&self, items: &[Item], allow_and: bool) -> Result<SimpleNode> {
        let items = trim(items);
        let groups: Vec<&[Item]> = items
            .split(Item::is_space)
            .filter(|g| !g.is_empty())
            .collect();
        match groups.as_slice() {
            [] => Ok(SimpleNode::literal(items.first().map_or(0, Item::index), "")),
            [single] => self.group(single),
            [first, rest @ ..] => match self.mode {
                Mode::Expression => Ok(SimpleNode::Composite {
                    index: first[0].index(),
                    children: items
                        .iter()
                        .map(|i| self.element(i))
                        .collect::<Result<_>>()?,
                }),
                Mode::Predicate if allow_and => {
                    let mut node = self.group(first)?;
                    for g in rest {
                        let right = self.group(g)?;
                        node = SimpleNode::Logical {
                            index: right.index(),
                            op: LogicalOperator::And,
                            left: Some(Box::new(node)),
                            right: Some(Box::new(right)),
                        };
                    }
                    Ok(node)
                }
                Mode::Predicate => Err(SimpleError::syntax(
                    rest[0][0].index(),
                    format!("Unexpected token {}", raw(rest[0])),
                )),
            },
        }
    }

    /// Items with no whitespace between them.
    fn group(&self, items: &[Item]) -> Result<SimpleNode> {
        match items {
            [Item::Text { index, text }] => Ok(classify(*index, text)),
            [single] => self.element(single),
            many => Ok(SimpleNode::Composite {
                index: many[0].index(),
                children: many
                    .iter()
                    .map(|i| self.element(i))
                    .collect::<Result<_>>()?,
            }),
        }
    }

    fn element(&self, item: &Item) -> Result<SimpleNode> {
        Ok(match item {
            Item::Text { index, text } | Item::Space { index, text } | Item::Op { index, text, .. } => {
                SimpleNode::literal(*index, text.as_str())
            }
            Item::Marker { index, marker } => SimpleNode::literal(*index, marker.symbol().to_string()),
            Item::Quoted {
                index,
                quote,
                items,
            } => {
                if items.iter().any(|i| matches!(i, Item::Block { .. })) {
                    SimpleNode::Composite {
                        index: *index,
                        children: items
                            .iter()
                            .map(|i| self.element(i))
                            .collect::<Result<_>>()?,
                    }
                } else {
                    SimpleNode::Literal {
                        index: *index,
                        text: raw(items),
                        quote: Some(*quote),
                    }
                }
            }
            Item::Block {
                index,
                depth,
                items,
            } => self.block(*index, *depth, items)?,
        })
    }

    fn block(&self, index: usize, depth: usize, items: &[Item]) -> Result<SimpleNode> {
        let children = if let Some(q) = items
            .iter()
            .position(|i| i.marker() == Some(TernaryMarker::Question))
            .filter(|q| {
                items[q + 1..]
                    .iter()
                    .any(|i| i.marker() == Some(TernaryMarker::Colon))
            }) {
            vec![self.block_ternary(items, q, depth)?]
        } else if !items.iter().any(|i| matches!(i, Item::Block { .. })) {
            vec![SimpleNode::literal(index, raw(items).trim())]
        } else {
            let mut parts = Vec::new();
            for item in items {
                match item {
                    Item::Quoted { index, quote, items } => {
                        parts.push(SimpleNode::literal(*index, quote.to_string()));
                        for inner in items {
                            parts.push(self.element(inner)?);
                        }
                        parts.push(SimpleNode::literal(*index, quote.to_string()));
                    }
                    other => parts.push(self.element(other)?),
                }
            }
            parts
        };
        Ok(SimpleNode::Function(FunctionBlock {
            index,
            depth,
            children,
        }))
    }

    /// `${cond ? a : b}`: the condition is re-parsed as a predicate after the
    /// reference on its left is wrapped in `${}`.
    fn block_ternary(&self, items: &[Item], q: usize, depth: usize) -> Result<SimpleNode> {
        let branches = SpanParser {
            scope: self.scope,
            mode: Mode::Expression,
        };
        let condition = trim(&items[..q]);
        let anchor = condition.first().map_or(items[q].index(), Item::index);
        let wrapped = wrap_condition(&raw(condition));
        let scope = Scope {
            core: self.scope.core,
            cache: self.scope.cache,
            source: &wrapped,
            depth,
        };
        let predicate = parse(&wrapped, Mode::Predicate, &scope).map_err(|e| reanchor(e, anchor))?;
        // the condition is already parsed; stand a placeholder in for it
        let mut cond_items = vec![Item::Text {
            index: anchor,
            text: "condition".into(),
        }];
        cond_items.extend_from_slice(&items[q..]);
        let node = branches.ternary(&cond_items, 1, |span| branches.operand(span, false))?;
        match node {
            SimpleNode::Ternary {
                index,
                when_true,
                when_false,
                ..
            } => Ok(SimpleNode::Ternary {
                index,
                condition: Box::new(predicate),
                when_true,
                when_false,
            }),
            other => Ok(other),
        }
    }
}

fn last_op<T>(items: &[Item], pick: impl Fn(OperatorKind) -> Option<T>) -> Option<(usize, T)> {
    items
        .iter()
        .enumerate()
        .rev()
        .find_map(|(p, i)| i.op().and_then(&pick).map(|t| (p, t)))
}

/// Operands split around the operator at `pos`, both required.
fn sides<'i>(items: &'i [Item], pos: usize, family: &str, symbol: &str) -> Result<(&'i [Item], &'i [Item])> {
    let index = items[pos].index();
    let left = trim(&items[..pos]);
    let right = trim(&items[pos + 1..]);
    if left.is_empty() {
        return Err(SimpleError::syntax(
            index,
            format!("{family} operator {symbol} has no left hand side token"),
        ));
    }
    if right.is_empty() {
        return Err(SimpleError::syntax(
            index,
            format!("{family} operator {symbol} has no right hand side token"),
        ));
    }
    Ok((left, right))
}

fn classify(index: usize, text: &str) -> SimpleNode {
    match text {
        "true" => SimpleNode::Boolean { index, value: true },
        "false" => SimpleNode::Boolean { index, value: false },
        "null" => SimpleNode::Null { index },
        _ => match parse_number(text) {
            Some(value) => SimpleNode::Numeric { index, value },
            None => SimpleNode::literal(index, text),
        },
    }
}

/// Wrap the left-hand side of the first comparison operator in `${}` unless it
/// is already a function, a quoted string or a constant.
pub(crate) fn wrap_condition(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("${") {
        return trimmed.to_string();
    }
    let found = comparison_symbols()
        .filter_map(|sym| trimmed.find(&format!(" {sym} ")).map(|pos| (pos, sym)))
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));
    let Some((pos, _)) = found else {
        return trimmed.to_string();
    };
    let lhs = trimmed[..pos].trim();
    let constant = lhs.starts_with(['\'', '"'])
        || parse_number(lhs).is_some()
        || matches!(lhs, "true" | "false" | "null")
        || lhs.contains(char::is_whitespace);
    if lhs.is_empty() || constant {
        return trimmed.to_string();
    }
    format!("${{{lhs}}}{}", &trimmed[pos..])
}

/// Move a syntax error raised while parsing embedded text onto `index` of the
/// enclosing source.
pub(crate) fn reanchor(err: SimpleError, index: usize) -> SimpleError {
    match err {
        SimpleError::Syntax { message, .. } => SimpleError::Syntax { index, message },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::BinaryOperator;
    use pretty_assertions::assert_eq;

    fn with_scope<T>(text: &str, f: impl FnOnce(&Scope) -> T) -> T {
        let core = Arc::new(LanguageCore::default());
        let scope = Scope::new(&core, None, text, 0);
        f(&scope)
    }

    fn parse_as(text: &str, mode: Mode) -> Result<SimpleNode> {
        with_scope(text, |scope| parse(text, mode, scope))
    }

    #[test]
    fn template_keeps_quotes_and_operators() {
        let node = parse_as("it's ${body} == x", Mode::Expression).unwrap();
        let SimpleNode::Composite { children, .. } = node else {
            panic!("expected composite");
        };
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], SimpleNode::literal(0, "it's "));
        assert_eq!(children[2], SimpleNode::literal(12, " == x"));
    }

    #[test]
    fn colon_without_question_is_template_text() {
        let node = parse_as("Status : ${body}", Mode::Expression).unwrap();
        let SimpleNode::Composite { children, .. } = node else {
            panic!("expected composite");
        };
        assert_eq!(children[0], SimpleNode::literal(0, "Status : "));
        assert!(matches!(
            parse_as("${header.a} ? yes : no", Mode::Expression).unwrap(),
            SimpleNode::Ternary { .. }
        ));
    }

    #[test]
    fn binary_in_predicate() {
        let node = parse_as("${header.foo} == 'abc'", Mode::Predicate).unwrap();
        let SimpleNode::Binary { op, right, .. } = node else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOperator::Equals);
        assert_eq!(
            right.as_deref(),
            Some(&SimpleNode::Literal {
                index: 17,
                text: "abc".into(),
                quote: Some('\'')
            })
        );
    }

    #[test]
    fn logical_is_left_associative() {
        let node = parse_as("${a} == 1 && ${b} == 2 || ${c} == 3", Mode::Predicate).unwrap();
        let SimpleNode::Logical { op, left, .. } = node else {
            panic!("expected logical");
        };
        assert_eq!(op, LogicalOperator::Or);
        assert!(matches!(
            left.as_deref(),
            Some(SimpleNode::Logical {
                op: LogicalOperator::And,
                ..
            })
        ));
    }

    #[test]
    fn ternary_binds_around_condition() {
        let node = parse_as("${header.count} > 5 ? 'big' : 'small'", Mode::Expression).unwrap();
        let SimpleNode::Ternary { condition, when_false, .. } = node else {
            panic!("expected ternary");
        };
        assert!(matches!(*condition, SimpleNode::Binary { .. }));
        assert_eq!(when_false.to_string(), "'small'");
    }

    #[test]
    fn numbers_booleans_and_null() {
        assert!(matches!(parse_as("${a} == 5", Mode::Predicate).unwrap(),
            SimpleNode::Binary { right: Some(r), .. } if matches!(*r, SimpleNode::Numeric { .. })));
        assert!(matches!(parse_as("true", Mode::Predicate).unwrap(), SimpleNode::Boolean { value: true, .. }));
        assert!(matches!(parse_as("${a} ?: null", Mode::Expression).unwrap(),
            SimpleNode::Other { right: Some(r), .. } if matches!(*r, SimpleNode::Null { .. })));
    }

    #[test]
    fn missing_operands_point_at_operator() {
        let err = parse_as("${header.foo} == ", Mode::Predicate).unwrap_err();
        assert_eq!(err.index(), Some(14));
        assert!(err.to_string().contains("has no right hand side token"));
        let err = parse_as(" && ${a}", Mode::Predicate).unwrap_err();
        assert_eq!(err.index(), Some(1));
    }

    #[test]
    fn unterminated_quote_in_operator_grammar() {
        let err = parse_as("${body} == 'abc", Mode::Predicate).unwrap_err();
        assert_eq!(err.index(), Some(11));
        assert!(err.to_string().contains("single quote has no ending quote"));
    }

    #[test]
    fn block_ternary_splits_at_markers() {
        let node = parse_as("${header.foo > 0 ? 'pos' : 'neg'}", Mode::Expression).unwrap();
        let SimpleNode::Function(block) = node else {
            panic!("expected function");
        };
        let [SimpleNode::Ternary { condition, when_true, .. }] = block.children.as_slice() else {
            panic!("expected ternary child");
        };
        assert_eq!(condition.to_string(), "${header.foo} > 0");
        assert_eq!(when_true.to_string(), "'pos'");
    }

    #[test]
    fn nested_block_is_deferred() {
        let node = parse_as("${header.${body}}", Mode::Expression).unwrap();
        let SimpleNode::Function(block) = node else {
            panic!("expected function");
        };
        assert_eq!(block.simple_text(), None);
        assert_eq!(block.children.len(), 2);
    }

    #[test]
    fn chain_collects_stages() {
        let node = parse_as("${body} -> ${uppercase()} -> $param!", Mode::Expression).unwrap();
        let SimpleNode::Chain { stages, null_safe, .. } = node else {
            panic!("expected chain");
        };
        assert!(!null_safe);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].to_string(), "${body}!");
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let core = Arc::new(LanguageCore::new(
            Default::default(),
            SimpleOptions::default().with_max_nesting_depth(2),
        ));
        let text = "${a${b${c}}}";
        let scope = Scope::new(&core, None, text, 0);
        let err = parse(text, Mode::Expression, &scope).unwrap_err();
        assert_eq!(err.index(), Some(6));
    }

    #[test]
    fn condition_wrapping() {
        assert_eq!(wrap_condition("header.foo > 0"), "${header.foo} > 0");
        assert_eq!(wrap_condition("${header.foo} > 0"), "${header.foo} > 0");
        assert_eq!(wrap_condition("body contains 'x' && a == b"), "${body} contains 'x' && a == b");
        assert_eq!(wrap_condition("5 > 3"), "5 > 3");
        assert_eq!(wrap_condition("header.flag"), "header.flag");
    }
}
