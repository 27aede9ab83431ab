//! Tokenizer for row filter expressions.

use super::FilterError;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=` or `==`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Ident(String),
    Integer(i64),
    Real(f64),
    Text(String),
    Cmp(CmpOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Is,
    Null,
    True,
    False,
    Eof,
}

pub(super) struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub(super) fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input; always ends with [`Token::Eof`].
    pub(super) fn tokenize(&mut self) -> Result<Vec<(Token, usize)>, FilterError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_eof() {
                tokens.push((Token::Eof, self.position));
                break;
            }

            let start = self.position;
            let token = self.next_token()?;
            tokens.push((token, start));
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, FilterError> {
        let ch = self.current_char();

        match ch {
            '(' => {
                self.advance();
                Ok(Token::LParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RParen)
            }
            '=' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                }
                Ok(Token::Cmp(CmpOp::Eq))
            }
            '!' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    Ok(Token::Cmp(CmpOp::Ne))
                } else {
                    Err(self.error("Unexpected character: '!' (did you mean '!='?)"))
                }
            }
            '<' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    Ok(Token::Cmp(CmpOp::Le))
                } else if self.peek_is('>') {
                    self.advance();
                    Ok(Token::Cmp(CmpOp::Ne))
                } else {
                    Ok(Token::Cmp(CmpOp::Lt))
                }
            }
            '>' => {
                self.advance();
                if self.peek_is('=') {
                    self.advance();
                    Ok(Token::Cmp(CmpOp::Ge))
                } else {
                    Ok(Token::Cmp(CmpOp::Gt))
                }
            }
            '\'' => self.tokenize_string(),
            '"' => self.tokenize_quoted_identifier(),
            '-' | '0'..='9' | '.' => self.tokenize_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.tokenize_identifier_or_keyword()),
            _ => Err(self.error(&format!("Unexpected character: '{ch}'"))),
        }
    }

    fn tokenize_identifier_or_keyword(&mut self) -> Token {
        let start = self.position;
        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();

        match text.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IS" => Token::Is,
            "NULL" => Token::Null,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            _ => Token::Ident(text),
        }
    }

    /// `'O''Reilly'` becomes `O'Reilly`.
    fn tokenize_string(&mut self) -> Result<Token, FilterError> {
        self.read_quoted('\'').map(Token::Text)
    }

    fn tokenize_quoted_identifier(&mut self) -> Result<Token, FilterError> {
        self.read_quoted('"').map(Token::Ident)
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, FilterError> {
        self.advance();

        let mut content = String::new();
        while !self.is_eof() {
            let ch = self.current_char();
            self.advance();
            if ch == quote {
                if self.peek_is(quote) {
                    content.push(quote);
                    self.advance();
                } else {
                    return Ok(content);
                }
            } else {
                content.push(ch);
            }
        }

        Err(self.error("Unterminated quoted literal"))
    }

    fn tokenize_number(&mut self) -> Result<Token, FilterError> {
        let start = self.position;
        let mut has_dot = false;

        if self.current_char() == '-' {
            self.advance();
        }

        while !self.is_eof() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let parsed = if has_dot {
            text.parse::<f64>().map(Token::Real).ok()
        } else {
            text.parse::<i64>().map(Token::Integer).ok()
        };

        parsed.ok_or_else(|| FilterError::Syntax {
            message: format!("Invalid number literal: '{text}'"),
            position: start,
        })
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_is(&self, expected: char) -> bool {
        self.input.get(self.position) == Some(&expected)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn is_eof(&self) -> bool {
        self.position >= self.input.len()
    }

    fn error(&self, message: &str) -> FilterError {
        FilterError::Syntax {
            message: message.to_string(),
            position: self.position,
        }
    }
}
