//! Expression evaluation for step conditions
//!
//! Conditions are deliberately tiny: `LEFT OP RIGHT` where `OP` is `==` or
//! `!=` and each operand is either a `${NAME}` placeholder or a quoted
//! literal. Both sides are resolved against the variable context, then
//! compared as plain strings:
//!
//! ```text
//! ${ENV} == 'production'
//! "${BRANCH}" != "main"
//! ```

use super::context::VariableContext;
use super::engine::substitute;
use super::errors::ConditionError;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
}

impl Comparison {
    fn symbol(self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        }
    }
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `${NAME}`
    Placeholder(String),
    /// Contents of a quoted literal, quotes already stripped
    Literal(String),
}

impl Operand {
    fn resolve(&self, variables: &VariableContext) -> String {
        match self {
            Operand::Placeholder(name) => substitute(&format!("${{{name}}}"), variables).into_owned(),
            Operand::Literal(text) => substitute(text, variables).into_owned(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Placeholder(name) => write!(f, "${{{name}}}"),
            Operand::Literal(text) => write!(f, "'{text}'"),
        }
    }
}

/// A parsed step condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub left: Operand,
    pub op: Comparison,
    pub right: Operand,
}

impl Condition {
    /// Parse a condition expression.
    ///
    /// Returns `Ok(None)` for an empty expression, which always passes.
    pub fn parse(expr: &str) -> Result<Option<Self>, ConditionError> {
        let tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Ok(None);
        }

        let mut iter = tokens.into_iter();
        let left = match iter.next() {
            Some((Token::Operand(operand), _)) => operand,
            Some((Token::Op(_), _)) | None => {
                return Err(ConditionError::MissingOperand { side: "left" });
            }
        };
        let op = match iter.next() {
            Some((Token::Op(op), _)) => op,
            Some((Token::Operand(_), _)) | None => return Err(ConditionError::MissingOperator),
        };
        let right = match iter.next() {
            Some((Token::Operand(operand), _)) => operand,
            Some((Token::Op(extra), column)) => {
                return Err(ConditionError::unexpected(extra.symbol(), column));
            }
            None => return Err(ConditionError::MissingOperand { side: "right" }),
        };
        if let Some((token, column)) = iter.next() {
            return Err(ConditionError::unexpected(token.to_string(), column));
        }

        Ok(Some(Self { left, op, right }))
    }

    /// Evaluate against the variable context
    pub fn evaluate(&self, variables: &VariableContext) -> bool {
        let left = self.left.resolve(variables);
        let right = self.right.resolve(variables);
        match self.op {
            Comparison::Equal => left == right,
            Comparison::NotEqual => left != right,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

/// Parse and evaluate `expr` in one go
pub fn evaluate_condition(expr: &str, variables: &VariableContext) -> Result<bool, ConditionError> {
    Ok(Condition::parse(expr)?.is_none_or(|condition| condition.evaluate(variables)))
}

/// Check if a step should be executed based on its condition
///
/// Returns true if no condition is specified or the condition holds.
pub fn should_execute_step(condition: Option<&Condition>, variables: &VariableContext) -> bool {
    condition.is_none_or(|c| c.evaluate(variables))
}

#[derive(Debug)]
enum Token {
    Operand(Operand),
    Op(Comparison),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Operand(operand) => operand.fmt(f),
            Token::Op(op) => f.write_str(op.symbol()),
        }
    }
}

/// Split an expression into tokens tagged with their 1-based column
fn tokenize(expr: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    let column_of = |byte: usize| expr[..byte].chars().count() + 1;

    while let Some(&(start, c)) = chars.peek() {
        let column = column_of(start);
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                chars.next();
                let text = take_until(&mut chars, c)
                    .ok_or(ConditionError::UnterminatedString { column })?;
                tokens.push((Token::Operand(Operand::Literal(text)), column));
            }
            '$' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '{').is_none() {
                    return Err(ConditionError::unexpected("$", column));
                }
                let name = take_until(&mut chars, '}')
                    .ok_or(ConditionError::UnterminatedPlaceholder { column })?;
                if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
                    return Err(ConditionError::unexpected(format!("${{{name}}}"), column));
                }
                tokens.push((Token::Operand(Operand::Placeholder(name)), column));
            }
            '=' | '!' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '=').is_none() {
                    return Err(ConditionError::unexpected(c.to_string(), column));
                }
                let op = if c == '=' {
                    Comparison::Equal
                } else {
                    Comparison::NotEqual
                };
                tokens.push((Token::Op(op), column));
            }
            _ => {
                let mut word = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| !c.is_whitespace()) {
                    word.push(c);
                }
                return Err(ConditionError::unexpected(word, column));
            }
        }
    }

    Ok(tokens)
}

/// Consume characters up to and including `end`, returning what came before it
fn take_until(chars: &mut Peekable<CharIndices<'_>>, end: char) -> Option<String> {
    let mut text = String::new();
    for (_, c) in chars.by_ref() {
        if c == end {
            return Some(text);
        }
        text.push(c);
    }
    None
}
