//! Condition error types with source positions

use thiserror::Error;

/// Errors raised while parsing a step condition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// No `==` or `!=` between the operands
    #[error("expected '==' or '!=' in condition")]
    MissingOperator,

    /// Quoted literal never closed
    #[error("unterminated string starting at column {column}")]
    UnterminatedString { column: usize },

    /// Placeholder opened with `${` but never closed
    #[error("unterminated placeholder starting at column {column}")]
    UnterminatedPlaceholder { column: usize },

    /// Token that is neither a placeholder, a quoted literal nor an operator
    #[error("unexpected '{token}' at column {column}, operands must be ${{NAME}} or quoted strings")]
    UnexpectedToken { token: String, column: usize },

    /// An operand is missing on one side of the operator
    #[error("missing {side} operand")]
    MissingOperand { side: &'static str },
}

impl ConditionError {
    pub fn unexpected(token: impl Into<String>, column: usize) -> Self {
        Self::UnexpectedToken {
            token: token.into(),
            column,
        }
    }
}
