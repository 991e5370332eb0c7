//! Flat, index-tagged token stream over expression text.

use crate::errors::{Result, SimpleError};
use crate::grammar::{OperatorKind, TernaryMarker, ASSIGNMENT_ALIAS, OPERATORS};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Literal,
    Whitespace,
    Operator(OperatorKind),
    FunctionStart,
    FunctionEnd,
    SingleQuote,
    DoubleQuote,
    Ternary(TernaryMarker),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token, after escape processing for literals.
    pub text: String,
    /// Byte offset of the token in the source.
    pub index: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenizerOptions {
    pub allow_escape: bool,
    /// Treat a lone `=` as assignment (predicate text only).
    pub assignment_alias: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            allow_escape: true,
            assignment_alias: false,
        }
    }
}

pub struct Tokenizer<'a> {
    s: &'a str,
    i: usize,
    opts: TokenizerOptions,
    tokens: Vec<Token>,
    open_functions: Vec<usize>,
}

/// Tokenize `text`, failing on an unclosed `${` at the index of the innermost
/// block still open.
pub fn tokenize(text: &str, opts: TokenizerOptions) -> Result<Vec<Token>> {
    Tokenizer::new(text, opts).run()
}

impl<'a> Tokenizer<'a> {
    pub fn new(s: &'a str, opts: TokenizerOptions) -> Self {
        Self {
            s,
            i: 0,
            opts,
            tokens: Vec::new(),
            open_functions: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<Vec<Token>> {
        while let Some(c) = self.peek_char() {
            let start = self.i;
            if self.opts.allow_escape && c == '\\' {
                self.escape();
                continue;
            }
            if self.peek_str("${") {
                self.i += 2;
                self.open_functions.push(start);
                self.push(TokenKind::FunctionStart, "${", start);
                continue;
            }
            if c == '}' && !self.open_functions.is_empty() {
                self.i += 1;
                self.open_functions.pop();
                self.push(TokenKind::FunctionEnd, "}", start);
                continue;
            }
            if c == '\'' || c == '"' {
                self.i += 1;
                let kind = if c == '\'' {
                    TokenKind::SingleQuote
                } else {
                    TokenKind::DoubleQuote
                };
                self.push(kind, &c.to_string(), start);
                continue;
            }
            if c.is_whitespace() {
                while let Some(w) = self.peek_char().filter(|w| w.is_whitespace()) {
                    self.i += w.len_utf8();
                }
                let run = &self.s[start..self.i];
                self.push(TokenKind::Whitespace, run, start);
                continue;
            }
            if self.at_boundary() {
                if let Some((kind, len)) = self.match_operator() {
                    self.i += len;
                    let text = &self.s[start..self.i];
                    self.push(kind, text, start);
                    continue;
                }
            }
            self.i += c.len_utf8();
            self.literal(&c.to_string(), start);
        }
        if let Some(&open) = self.open_functions.last() {
            return Err(SimpleError::syntax(
                open,
                "expected symbol functionEnd but was eol",
            ));
        }
        tracing::trace!(tokens = self.tokens.len(), "tokenized {:?}", self.s);
        Ok(self.tokens)
    }

    fn escape(&mut self) {
        let start = self.i;
        self.i += 1;
        let mapped = match self.peek_char() {
            Some('n') => "\n",
            Some('t') => "\t",
            Some('r') => "\r",
            Some('\\') => "\\",
            Some('$') => "$",
            Some('}') => "}",
            Some('{') => "{",
            Some('\'') => "'",
            Some('"') => "\"",
            _ => {
                self.literal("\\", start);
                return;
            }
        };
        self.i += 1;
        self.literal(mapped, start);
    }

    fn at_boundary(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(t) => t.kind == TokenKind::Whitespace,
        }
    }

    /// Operator or ternary marker at the cursor, followed by whitespace or end
    /// of input. Inside `${}` only the ternary markers are recognised.
    fn match_operator(&self) -> Option<(TokenKind, usize)> {
        let rest = &self.s[self.i..];
        let closed = |len: usize| {
            rest[len..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace)
        };
        if self.open_functions.is_empty() {
            for (symbol, kind) in OPERATORS {
                if rest.starts_with(symbol) && closed(symbol.len()) {
                    return Some((TokenKind::Operator(*kind), symbol.len()));
                }
            }
            if self.opts.assignment_alias && rest.starts_with(ASSIGNMENT_ALIAS) && closed(1) {
                return Some((TokenKind::Operator(OperatorKind::Assignment), 1));
            }
        }
        for marker in [TernaryMarker::Question, TernaryMarker::Colon] {
            if rest.starts_with(marker.symbol()) && closed(1) {
                return Some((TokenKind::Ternary(marker), 1));
            }
        }
        None
    }

    fn literal(&mut self, text: &str, index: usize) {
        if let Some(last) = self.tokens.last_mut() {
            if last.kind == TokenKind::Literal {
                last.text.push_str(text);
                return;
            }
        }
        self.push(TokenKind::Literal, text, index);
    }

    fn push(&mut self, kind: TokenKind, text: &str, index: usize) {
        self.tokens.push(Token {
            kind,
            text: text.to_string(),
            index,
        });
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{BinaryOperator, OtherOperator};
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text, TokenizerOptions::default())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn function_and_operator() {
        use TokenKind::*;
        assert_eq!(
            kinds("${header.foo} == 'x'"),
            vec![
                FunctionStart,
                Literal,
                FunctionEnd,
                Whitespace,
                Operator(OperatorKind::Binary(BinaryOperator::Equals)),
                Whitespace,
                SingleQuote,
                Literal,
                SingleQuote,
            ]
        );
    }

    #[test]
    fn operators_need_surrounding_whitespace() {
        use TokenKind::*;
        assert_eq!(kinds("a==b"), vec![Literal]);
        assert_eq!(kinds("version in"), vec![Literal, Whitespace, Operator(OperatorKind::Binary(BinaryOperator::In))]);
        assert_eq!(kinds("inside"), vec![Literal]);
    }

    #[test]
    fn longest_operator_wins() {
        let tokens = tokenize("a ?-> b", TokenizerOptions::default()).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Operator(OperatorKind::Other(OtherOperator::ChainNullSafe)));
        let tokens = tokenize("a not contains b", TokenizerOptions::default()).unwrap();
        assert_eq!(tokens[2].text, "not contains");
    }

    #[test]
    fn ternary_markers_inside_functions() {
        use TokenKind::*;
        assert_eq!(
            kinds("${a ? b : c}"),
            vec![
                FunctionStart,
                Literal,
                Whitespace,
                Ternary(TernaryMarker::Question),
                Whitespace,
                Literal,
                Whitespace,
                Ternary(TernaryMarker::Colon),
                Whitespace,
                Literal,
                FunctionEnd,
            ]
        );
        assert_eq!(kinds("${date:now:yyyy}"), vec![FunctionStart, Literal, FunctionEnd]);
    }

    #[test]
    fn indices_are_monotonic() {
        let tokens = tokenize("x ${body} y ?: 'z'", TokenizerOptions::default()).unwrap();
        assert!(tokens.windows(2).all(|w| w[0].index < w[1].index));
        assert_eq!(tokens[2].index, 2);
    }

    #[test]
    fn unclosed_block_reports_opening_index() {
        let err = tokenize("abc ${header.${foo}", TokenizerOptions::default()).unwrap_err();
        assert_eq!(err.index(), Some(4));
    }

    #[test]
    fn stray_close_is_literal() {
        assert_eq!(kinds("a}b"), vec![TokenKind::Literal]);
    }

    #[test]
    fn escapes() {
        let tokens = tokenize(r"a\nb\}", TokenizerOptions::default()).unwrap();
        assert_eq!(tokens[0].text, "a\nb}");
        let raw = tokenize(r"a\nb", TokenizerOptions { allow_escape: false, ..Default::default() }).unwrap();
        assert_eq!(raw[0].text, r"a\nb");
    }

    #[test]
    fn assignment_alias_only_when_enabled() {
        let opts = TokenizerOptions { assignment_alias: true, ..Default::default() };
        let tokens = tokenize("x = 1", opts).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Operator(OperatorKind::Assignment));
        let tokens = tokenize("x = 1", TokenizerOptions::default()).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Literal);
    }
}
