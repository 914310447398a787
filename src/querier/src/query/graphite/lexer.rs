//! Tokenizer for target expressions

use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Function name, path pattern, number or boolean; classified by the parser
    Word(String),
    Str { value: String, quote: char },
    LParen,
    RParen,
    Comma,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Word(w) => format!("'{w}'"),
            Self::Str { value, .. } => format!("string \"{value}\""),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub position: usize,
    pub message: String,
}

pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).lex()
}

struct Lexer<'a> {
    input: &'a str,
    chars: Chars<'a>,
    current_index: usize,
    current: Option<char>,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ',' | '\'' | '"')
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        let mut chars = input.chars();
        let current = chars.next();
        Self {
            input,
            chars,
            current_index: 0,
            current,
        }
    }

    fn bump(&mut self) {
        if let Some(c) = self.current {
            self.current_index += c.len_utf8();
            self.current = self.chars.next();
        }
    }

    fn peek(&self) -> Option<char> {
        self.current
    }

    fn lex(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            let start = self.current_index;
            match ch {
                c if c.is_whitespace() => self.bump(),
                '(' => {
                    tokens.push(Token {
                        kind: TokenKind::LParen,
                        position: start,
                    });
                    self.bump();
                }
                ')' => {
                    tokens.push(Token {
                        kind: TokenKind::RParen,
                        position: start,
                    });
                    self.bump();
                }
                ',' => {
                    tokens.push(Token {
                        kind: TokenKind::Comma,
                        position: start,
                    });
                    self.bump();
                }
                '\'' | '"' => tokens.push(self.string(ch, start)?),
                _ => tokens.push(self.word(start)?),
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            position: self.input.len(),
        });
        Ok(tokens)
    }

    fn string(&mut self, quote: char, start: usize) -> Result<Token, LexError> {
        self.bump();
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        position: start,
                        message: "unterminated string".to_string(),
                    });
                }
                // Only the quote and the backslash are escapes; any other
                // backslash is kept as written.
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some(escaped) => {
                            if escaped != quote && escaped != '\\' {
                                value.push('\\');
                            }
                            value.push(escaped);
                            self.bump();
                        }
                        None => {
                            return Err(LexError {
                                position: start,
                                message: "unterminated string".to_string(),
                            });
                        }
                    }
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(Token {
                        kind: TokenKind::Str { value, quote },
                        position: start,
                    });
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Path words may contain commas inside `{a,b}` alternation or `[...]` classes.
    fn word(&mut self, start: usize) -> Result<Token, LexError> {
        let mut braces: Vec<(char, usize)> = Vec::new();

        while let Some(c) = self.peek() {
            if braces.is_empty() && is_delimiter(c) {
                break;
            }
            if !braces.is_empty() && (c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"')) {
                break;
            }

            match c {
                '{' | '[' => braces.push((c, self.current_index)),
                '}' | ']' => {
                    let open = if c == '}' { '{' } else { '[' };
                    match braces.pop() {
                        Some((o, _)) if o == open => {}
                        _ => {
                            return Err(LexError {
                                position: self.current_index,
                                message: format!("unbalanced '{c}'"),
                            });
                        }
                    }
                }
                _ => {}
            }
            self.bump();
        }

        if let Some((open, position)) = braces.pop() {
            return Err(LexError {
                position,
                message: format!("unbalanced '{open}'"),
            });
        }

        Ok(Token {
            kind: TokenKind::Word(self.input[start..self.current_index].to_string()),
            position: start,
        })
    }
}
