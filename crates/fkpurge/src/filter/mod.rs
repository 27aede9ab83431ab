//! Row filter expressions.
//!
//! A [`RowFilter`] is the string-form predicate a caller passes to a purge,
//! e.g. `customer_id = 42 AND status <> 'archived'`. Backends decide how to
//! apply it: the SQLite store hands the text to SQLite as a `WHERE` clause,
//! while the in-memory store parses it into a [`Predicate`] and evaluates it
//! row by row.
//!
//! # Grammar
//!
//! ```text
//! expr       := and_expr ( OR and_expr )*
//! and_expr   := unary ( AND unary )*
//! unary      := NOT unary | '(' expr ')' | comparison
//! comparison := column ( cmp_op literal | IS [NOT] NULL )
//! cmp_op     := = | == | != | <> | < | <= | > | >=
//! literal    := integer | real | 'text' | TRUE | FALSE | NULL
//! ```
//!
//! Keywords and column names are case-insensitive. Double quotes delimit
//! identifiers, as in SQL.
//!
//! # Evaluation
//!
//! Comparisons follow SQL three-valued logic: comparing against `NULL` (or
//! across incompatible types) yields *unknown*, and only rows for which the
//! whole predicate is *true* match.

mod lexer;

pub use lexer::CmpOp;

use crate::domain::Value;
use lexer::{Lexer, Token};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing or evaluating a filter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// The expression is not well formed.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Description of the problem
        message: String,
        /// Character offset in the expression
        position: usize,
    },

    /// The expression names a column the row does not have.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// A caller-supplied row filter in string form.
///
/// An empty (or all-whitespace) filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowFilter(String);

impl RowFilter {
    /// Wrap a filter expression.
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    /// A filter that matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// The expression text, trimmed.
    pub fn expression(&self) -> &str {
        self.0.trim()
    }

    /// Whether this filter matches every row.
    pub fn is_empty(&self) -> bool {
        self.expression().is_empty()
    }

    /// `None` for an empty filter, so callers can skip filtering entirely.
    pub fn as_option(&self) -> Option<&Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// Parse the expression into a [`Predicate`].
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Syntax`] if the expression is malformed.
    pub fn parse(&self) -> Result<Predicate, FilterError> {
        Predicate::parse(self.expression())
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression())
    }
}

impl From<&str> for RowFilter {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RowFilter {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row (the empty filter)
    Always,

    /// `column <op> literal`
    Compare {
        /// Column name
        column: String,
        /// Operator
        op: CmpOp,
        /// Right-hand literal
        value: Value,
    },

    /// `column IS [NOT] NULL`
    IsNull {
        /// Column name
        column: String,
        /// `true` for `IS NOT NULL`
        negated: bool,
    },

    /// Logical negation
    Not(Box<Predicate>),

    /// Conjunction
    And(Box<Predicate>, Box<Predicate>),

    /// Disjunction
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Parse a filter expression. Blank input yields [`Predicate::Always`].
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Syntax`] if the expression is malformed.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        if input.trim().is_empty() {
            return Ok(Predicate::Always);
        }

        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Parser { tokens, index: 0 };
        let predicate = parser.parse_or()?;
        parser.expect_eof()?;
        Ok(predicate)
    }

    /// Evaluate against a row. `lookup` resolves a column name to its value,
    /// returning `None` if the row has no such column.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownColumn`] if the predicate names a column
    /// `lookup` cannot resolve.
    pub fn matches<'a, F>(&self, lookup: &F) -> Result<bool, FilterError>
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        Ok(self.evaluate(lookup)? == Some(true))
    }

    fn evaluate<'a, F>(&self, lookup: &F) -> Result<Option<bool>, FilterError>
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        let column_value = |column: &str| {
            lookup(column).ok_or_else(|| FilterError::UnknownColumn(column.to_string()))
        };

        match self {
            Predicate::Always => Ok(Some(true)),
            Predicate::Compare { column, op, value } => {
                let actual = column_value(column)?;
                Ok(compare(actual, value).map(|ordering| op.holds(ordering)))
            }
            Predicate::IsNull { column, negated } => {
                let actual = column_value(column)?;
                Ok(Some(actual.is_null() != *negated))
            }
            Predicate::Not(inner) => Ok(inner.evaluate(lookup)?.map(|b| !b)),
            Predicate::And(left, right) => {
                let l = left.evaluate(lookup)?;
                let r = right.evaluate(lookup)?;
                Ok(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                })
            }
            Predicate::Or(left, right) => {
                let l = left.evaluate(lookup)?;
                let r = right.evaluate(lookup)?;
                Ok(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                })
            }
        }
    }
}

impl CmpOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Order two values, or `None` when the comparison is unknown.
#[allow(clippy::cast_precision_loss)]
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(a), Value::Real(b)) => (*a as f64).partial_cmp(b),
        (Value::Real(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Integer(b)) => Some(i64::from(*a).cmp(b)),
        (Value::Integer(a), Value::Boolean(b)) => Some(a.cmp(&i64::from(*b))),
        _ => None,
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index].0
    }

    fn position(&self) -> usize {
        self.tokens[self.index].1
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].0.clone();
        if token != Token::Eof {
            self.index += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        FilterError::Syntax {
            message: message.into(),
            position: self.position(),
        }
    }

    fn expect_eof(&self) -> Result<(), FilterError> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(self.error(format!("Unexpected trailing token: {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.parse_unary()?;
        while *self.peek() == Token::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate, FilterError> {
        match self.peek() {
            Token::Not => {
                self.advance();
                Ok(Predicate::Not(Box::new(self.parse_unary()?)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                match self.advance() {
                    Token::RParen => Ok(inner),
                    _ => Err(self.error("Expected ')'")),
                }
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Predicate, FilterError> {
        let column = match self.advance() {
            Token::Ident(name) => name,
            other => return Err(self.error(format!("Expected column name, found {other:?}"))),
        };

        match self.advance() {
            Token::Cmp(op) => {
                let value = self.parse_literal()?;
                Ok(Predicate::Compare { column, op, value })
            }
            Token::Is => {
                let negated = if *self.peek() == Token::Not {
                    self.advance();
                    true
                } else {
                    false
                };
                match self.advance() {
                    Token::Null => Ok(Predicate::IsNull { column, negated }),
                    _ => Err(self.error("Expected NULL after IS")),
                }
            }
            other => Err(self.error(format!(
                "Expected comparison operator after '{column}', found {other:?}"
            ))),
        }
    }

    fn parse_literal(&mut self) -> Result<Value, FilterError> {
        match self.advance() {
            Token::Integer(i) => Ok(Value::Integer(i)),
            Token::Real(r) => Ok(Value::Real(r)),
            Token::Text(s) => Ok(Value::Text(s)),
            Token::True => Ok(Value::Boolean(true)),
            Token::False => Ok(Value::Boolean(false)),
            Token::Null => Ok(Value::Null),
            other => Err(self.error(format!("Expected literal, found {other:?}"))),
        }
    }
}
