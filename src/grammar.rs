//! Operator tables: spellings, aliases and precedence classes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Equals,
    EqualsIgnoreCase,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    NotEquals,
    NotEqualsIgnoreCase,
    Contains,
    NotContains,
    ContainsIgnoreCase,
    NotContainsIgnoreCase,
    Is,
    NotIs,
    Regex,
    NotRegex,
    In,
    NotIn,
    Range,
    NotRange,
    StartsWith,
    EndsWith,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Equals => "==",
            BinaryOperator::EqualsIgnoreCase => "=~",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEquals => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEquals => "<=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::NotEqualsIgnoreCase => "!=~",
            BinaryOperator::Contains => "contains",
            BinaryOperator::NotContains => "not contains",
            BinaryOperator::ContainsIgnoreCase => "~~",
            BinaryOperator::NotContainsIgnoreCase => "!~~",
            BinaryOperator::Is => "is",
            BinaryOperator::NotIs => "not is",
            BinaryOperator::Regex => "regex",
            BinaryOperator::NotRegex => "not regex",
            BinaryOperator::In => "in",
            BinaryOperator::NotIn => "not in",
            BinaryOperator::Range => "range",
            BinaryOperator::NotRange => "not range",
            BinaryOperator::StartsWith => "startsWith",
            BinaryOperator::EndsWith => "endsWith",
        }
    }

    /// The positive operator this one negates, if any.
    pub fn negated(self) -> Option<BinaryOperator> {
        Some(match self {
            BinaryOperator::NotEquals => BinaryOperator::Equals,
            BinaryOperator::NotEqualsIgnoreCase => BinaryOperator::EqualsIgnoreCase,
            BinaryOperator::NotContains => BinaryOperator::Contains,
            BinaryOperator::NotContainsIgnoreCase => BinaryOperator::ContainsIgnoreCase,
            BinaryOperator::NotIs => BinaryOperator::Is,
            BinaryOperator::NotRegex => BinaryOperator::Regex,
            BinaryOperator::NotIn => BinaryOperator::In,
            BinaryOperator::NotRange => BinaryOperator::Range,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtherOperator {
    Elvis,
    Chain,
    ChainNullSafe,
}

impl OtherOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            OtherOperator::Elvis => "?:",
            OtherOperator::Chain => "->",
            OtherOperator::ChainNullSafe => "?->",
        }
    }

    pub fn is_chain(self) -> bool {
        matches!(self, OtherOperator::Chain | OtherOperator::ChainNullSafe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernaryMarker {
    Question,
    Colon,
}

impl TernaryMarker {
    pub fn symbol(self) -> char {
        match self {
            TernaryMarker::Question => '?',
            TernaryMarker::Colon => ':',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
    Other(OtherOperator),
    Assignment,
}

/// Binding strength, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Assignment,
    Ternary,
    Logical,
    Other,
    Binary,
}

impl OperatorKind {
    pub fn precedence(self) -> Precedence {
        match self {
            OperatorKind::Assignment => Precedence::Assignment,
            OperatorKind::Logical(_) => Precedence::Logical,
            OperatorKind::Other(_) => Precedence::Other,
            OperatorKind::Binary(_) => Precedence::Binary,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Binary(op) => op.symbol(),
            OperatorKind::Logical(op) => op.symbol(),
            OperatorKind::Other(op) => op.symbol(),
            OperatorKind::Assignment => ":=",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Every spelling the tokenizer recognises, longest first so that `>=` wins
/// over `>` and `not contains` over `contains`.
pub const OPERATORS: &[(&str, OperatorKind)] = &[
    ("not contains", OperatorKind::Binary(BinaryOperator::NotContains)),
    ("starts with", OperatorKind::Binary(BinaryOperator::StartsWith)),
    ("startsWith", OperatorKind::Binary(BinaryOperator::StartsWith)),
    ("not regex", OperatorKind::Binary(BinaryOperator::NotRegex)),
    ("not range", OperatorKind::Binary(BinaryOperator::NotRange)),
    ("ends with", OperatorKind::Binary(BinaryOperator::EndsWith)),
    ("!contains", OperatorKind::Binary(BinaryOperator::NotContains)),
    ("endsWith", OperatorKind::Binary(BinaryOperator::EndsWith)),
    ("contains", OperatorKind::Binary(BinaryOperator::Contains)),
    ("not is", OperatorKind::Binary(BinaryOperator::NotIs)),
    ("not in", OperatorKind::Binary(BinaryOperator::NotIn)),
    ("!regex", OperatorKind::Binary(BinaryOperator::NotRegex)),
    ("!range", OperatorKind::Binary(BinaryOperator::NotRange)),
    ("regex", OperatorKind::Binary(BinaryOperator::Regex)),
    ("range", OperatorKind::Binary(BinaryOperator::Range)),
    ("!in", OperatorKind::Binary(BinaryOperator::NotIn)),
    ("!is", OperatorKind::Binary(BinaryOperator::NotIs)),
    ("!=~", OperatorKind::Binary(BinaryOperator::NotEqualsIgnoreCase)),
    ("!~~", OperatorKind::Binary(BinaryOperator::NotContainsIgnoreCase)),
    ("?->", OperatorKind::Other(OtherOperator::ChainNullSafe)),
    ("and", OperatorKind::Logical(LogicalOperator::And)),
    ("==", OperatorKind::Binary(BinaryOperator::Equals)),
    ("=~", OperatorKind::Binary(BinaryOperator::EqualsIgnoreCase)),
    (">=", OperatorKind::Binary(BinaryOperator::GreaterThanOrEquals)),
    ("<=", OperatorKind::Binary(BinaryOperator::LessThanOrEquals)),
    ("!=", OperatorKind::Binary(BinaryOperator::NotEquals)),
    ("~~", OperatorKind::Binary(BinaryOperator::ContainsIgnoreCase)),
    ("is", OperatorKind::Binary(BinaryOperator::Is)),
    ("in", OperatorKind::Binary(BinaryOperator::In)),
    ("&&", OperatorKind::Logical(LogicalOperator::And)),
    ("||", OperatorKind::Logical(LogicalOperator::Or)),
    ("or", OperatorKind::Logical(LogicalOperator::Or)),
    ("?:", OperatorKind::Other(OtherOperator::Elvis)),
    ("->", OperatorKind::Other(OtherOperator::Chain)),
    (":=", OperatorKind::Assignment),
    (">", OperatorKind::Binary(BinaryOperator::GreaterThan)),
    ("<", OperatorKind::Binary(BinaryOperator::LessThan)),
];

/// Plain `=` is only an assignment in predicate text.
pub const ASSIGNMENT_ALIAS: &str = "=";

/// Binary operators in the order the ternary-condition heuristic scans for them.
pub fn comparison_symbols() -> impl Iterator<Item = &'static str> {
    OPERATORS.iter().filter_map(|(sym, kind)| match kind {
        OperatorKind::Binary(_) => Some(*sym),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_longest_first() {
        for pair in OPERATORS.windows(2) {
            assert!(pair[0].0.len() >= pair[1].0.len(), "{} before {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn precedence_order() {
        assert!(Precedence::Assignment < Precedence::Ternary);
        assert!(Precedence::Ternary < Precedence::Logical);
        assert!(Precedence::Logical < Precedence::Other);
        assert!(Precedence::Other < Precedence::Binary);
    }

    #[test]
    fn negations_pair_up() {
        assert_eq!(BinaryOperator::NotIn.negated(), Some(BinaryOperator::In));
        assert_eq!(BinaryOperator::In.negated(), None);
    }
}
