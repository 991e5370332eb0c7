use thiserror::Error;

/// Everything that can go wrong while parsing or evaluating a simple expression.
///
/// Parse-time variants carry the index into the source text so callers can
/// point at the offending token; see [`SimpleError::diagnostic`].
#[derive(Debug, Clone, Error)]
pub enum SimpleError {
    /// Raised by the tokenizer/parser; index is relative to the text being parsed.
    #[error("{message} at location {index}")]
    Syntax { index: usize, message: String },

    /// A syntax error attached to the user-visible expression text.
    #[error("{message} in expression: {expression}")]
    IllegalSyntax {
        expression: String,
        index: Option<usize>,
        message: String,
    },

    #[error("Unknown function: {function} at location {index}")]
    UnknownFunction { function: String, index: usize },

    #[error("Cannot resolve type: {name}")]
    UnknownType { name: String },

    #[error("Invalid OGNL syntax: {expression} at location {index}")]
    InvalidOgnl { expression: String, index: usize },

    #[error("Range operator is not valid. Valid syntax:'from..to' (where from and to are numbers) was: {value}")]
    InvalidRange { value: String, index: usize },

    #[error("Cannot convert {value} to {target}")]
    Conversion { value: String, target: &'static str },

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl SimpleError {
    pub(crate) fn syntax(index: usize, message: impl Into<String>) -> Self {
        SimpleError::Syntax {
            index,
            message: message.into(),
        }
    }

    pub(crate) fn evaluation(message: impl Into<String>) -> Self {
        SimpleError::Evaluation(message.into())
    }

    /// Source index of the failure, when the error has one.
    pub fn index(&self) -> Option<usize> {
        match self {
            SimpleError::Syntax { index, .. }
            | SimpleError::UnknownFunction { index, .. }
            | SimpleError::InvalidOgnl { index, .. }
            | SimpleError::InvalidRange { index, .. } => Some(*index),
            SimpleError::IllegalSyntax { index, .. } => *index,
            _ => None,
        }
    }

    /// True for the errors that mean the expression text itself is malformed.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            SimpleError::Syntax { .. }
                | SimpleError::IllegalSyntax { .. }
                | SimpleError::InvalidOgnl { .. }
                | SimpleError::InvalidRange { .. }
        )
    }

    /// Re-anchor a parser error onto the expression the user wrote.
    ///
    /// Syntax errors become [`SimpleError::IllegalSyntax`]; the other variants
    /// keep their own type so callers can still match on them.
    pub(crate) fn in_expression(self, expression: &str) -> Self {
        match self {
            SimpleError::Syntax { index, message } => SimpleError::IllegalSyntax {
                expression: expression.to_string(),
                index: Some(index),
                message,
            },
            other => other,
        }
    }

    /// Caret-pointing rendering of the error, when it carries both an index and
    /// the expression it refers to.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            SimpleError::IllegalSyntax {
                expression,
                index: Some(index),
                message,
            } => Some(caret(expression, *index, message)),
            _ => None,
        }
    }
}

/// Renders `message at location N`, the expression, and a `*` under index N.
pub fn caret(expression: &str, index: usize, message: &str) -> String {
    let column = expression
        .char_indices()
        .take_while(|(i, _)| *i < index)
        .count();
    format!(
        "{message} at location {index}\n{expression}\n{}*",
        " ".repeat(column)
    )
}

// Type alias for results that use `SimpleError` as the error type
pub type Result<T> = std::result::Result<T, SimpleError>;
