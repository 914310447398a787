//! Recursive-descent parser for Graphite targets
//!
//! Grammar:
//!
//! ```text
//! expression := call | selector | literal
//! call       := IDENT '(' [ expression { ',' expression } ] ')'
//! literal    := NUMBER | STRING | 'true' | 'false'
//! ```
//!
//! There are no infix operators; composition is purely by nesting calls.

use super::ast::{Expr, FunctionCall, Literal, SeriesSelector};
use super::error::GraphiteError;
use super::lexer::{Token, TokenKind, lex};

/// Function nesting accepted by [`parse`]
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parse one target string into an expression tree.
///
/// # Examples
/// ```ignore
/// use querier::query::graphite::parser::parse;
///
/// let expr = parse("averageSeries(host.*.cpu)").unwrap();
/// let expr = parse("alias(scale(a.b, 0.5), 'half')").unwrap();
/// ```
pub fn parse(target: &str) -> Result<Expr, GraphiteError> {
    parse_with_max_depth(target, DEFAULT_MAX_DEPTH)
}

/// Like [`parse`], rejecting targets whose calls nest deeper than `max_depth`.
pub fn parse_with_max_depth(target: &str, max_depth: usize) -> Result<Expr, GraphiteError> {
    let tokens = lex(target).map_err(|e| parse_error(target, e.position, e.message))?;
    let mut parser = Parser {
        target,
        tokens,
        position: 0,
        depth: 0,
        max_depth,
    };

    if parser.check(&TokenKind::Eof) {
        return Err(parse_error(target, 0, "empty expression"));
    }

    let expr = parser.expression()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        let message = match trailing.kind {
            TokenKind::RParen => "unbalanced ')'".to_string(),
            ref other => format!("unexpected {} after expression", other.describe()),
        };
        return Err(parse_error(target, trailing.position, message));
    }
    Ok(expr)
}

fn parse_error(target: &str, position: usize, message: impl Into<String>) -> GraphiteError {
    GraphiteError::Parse {
        target: target.to_string(),
        position,
        message: message.into(),
    }
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn classify_word(word: &str) -> Expr {
    if word.eq_ignore_ascii_case("true") {
        return Expr::Literal(Literal::Boolean(true));
    }
    if word.eq_ignore_ascii_case("false") {
        return Expr::Literal(Literal::Boolean(false));
    }

    let numeric_start = word
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric_start {
        if let Ok(value) = word.parse::<f64>() {
            if value.is_finite() {
                return Expr::Literal(Literal::Number {
                    value,
                    text: word.to_string(),
                });
            }
        }
    }

    Expr::Selector(SeriesSelector {
        pattern: word.to_string(),
    })
}

struct Parser<'a> {
    target: &'a str,
    tokens: Vec<Token>,
    position: usize,
    /// Calls currently open
    depth: usize,
    max_depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn error(&self, position: usize, message: impl Into<String>) -> GraphiteError {
        parse_error(self.target, position, message)
    }

    fn expression(&mut self) -> Result<Expr, GraphiteError> {
        let Token { kind, position } = self.advance();
        match kind {
            TokenKind::Word(word) => {
                if self.check(&TokenKind::LParen) {
                    if !is_identifier(&word) {
                        return Err(self.error(position, format!("invalid function name '{word}'")));
                    }
                    if self.depth >= self.max_depth {
                        return Err(self.error(
                            position,
                            format!("expression nested too deeply (limit {})", self.max_depth),
                        ));
                    }
                    self.advance();
                    self.depth += 1;
                    let args = self.arguments()?;
                    self.depth -= 1;
                    Ok(Expr::Call(FunctionCall { name: word, args }))
                } else {
                    Ok(classify_word(&word))
                }
            }
            TokenKind::Str { value, quote } => Ok(Expr::Literal(Literal::String { value, quote })),
            TokenKind::Eof => Err(self.error(position, "unexpected end of input")),
            TokenKind::RParen => Err(self.error(position, "unbalanced ')'")),
            TokenKind::Comma => Err(self.error(position, "empty argument")),
            TokenKind::LParen => Err(self.error(position, "unexpected '('")),
        }
    }

    /// Arguments after the opening parenthesis, consuming the closing one.
    fn arguments(&mut self) -> Result<Vec<Expr>, GraphiteError> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }

        loop {
            if self.check(&TokenKind::Eof) {
                return Err(self.error(self.peek().position, "missing ')'"));
            }
            args.push(self.expression()?);

            let Token { kind, position } = self.advance();
            match kind {
                TokenKind::Comma => {
                    if self.check(&TokenKind::RParen) {
                        return Err(self.error(self.peek().position, "empty argument"));
                    }
                }
                TokenKind::RParen => return Ok(args),
                TokenKind::Eof => return Err(self.error(position, "missing ')'")),
                other => {
                    return Err(self.error(
                        position,
                        format!("expected ',' or ')', found {}", other.describe()),
                    ));
                }
            }
        }
    }
}
