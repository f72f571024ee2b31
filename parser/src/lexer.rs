//! FILENAME: parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. Every byte of the
//! input ends up inside exactly one token (whitespace included); the parser
//! drops whitespace before it starts splitting.
//!
//! SUPPORTED OPERATORS:
//! - Single char: + - * / % ^ . = < > ( ) [ ] ,
//! - Multi char: <= >= !=
//! - Keywords: and or not where
//! - Dice: `d` when not followed by a letter or underscore (3d6). A digit
//!   after `d` keeps it the dice operator, so `d20` lexes as `d 20` and
//!   identifiers cannot be spelled `d` plus digits.

use crate::token::{Operator, Token, TokenKind};
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// Failures that abort tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Advances the lexer and returns the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        let (start, ch) = match self.chars.next() {
            Some(next) => next,
            None => return Ok(None),
        };

        let token = match ch {
            '+' => self.single(Operator::Plus, start),
            '-' => self.single(Operator::Minus, start),
            '*' => self.single(Operator::Star, start),
            '/' => self.single(Operator::Slash, start),
            '%' => self.single(Operator::Percent, start),
            '^' => self.single(Operator::Caret, start),
            '.' => self.single(Operator::Dot, start),
            '=' => self.single(Operator::Equal, start),
            '(' => Token::new(TokenKind::LParen, start, start + 1),
            ')' => Token::new(TokenKind::RParen, start, start + 1),
            '[' => Token::new(TokenKind::LBracket, start, start + 1),
            ']' => Token::new(TokenKind::RBracket, start, start + 1),
            ',' => Token::new(TokenKind::Comma, start, start + 1),

            // Handle < and potentially <=
            '<' => self.read_with_equals(start, Operator::Less, Operator::LessEqual),

            // Handle > and potentially >=
            '>' => self.read_with_equals(start, Operator::Greater, Operator::GreaterEqual),

            // '!' is only meaningful as the first half of !=
            '!' => match self.chars.peek() {
                Some(&(_, '=')) => {
                    self.chars.next();
                    Token::new(TokenKind::Operator(Operator::NotEqual), start, start + 2)
                }
                _ => return Err(LexError::UnexpectedChar { ch, offset: start }),
            },

            '\'' | '"' => self.read_string(start, ch)?,

            ch if ch.is_whitespace() => self.read_whitespace(start),

            ch if ch.is_ascii_digit() => self.read_integer(start),

            'd' if self.dice_follows() => self.single(Operator::Dice, start),

            ch if is_identifier_start(ch) => self.read_identifier(start),

            ch => return Err(LexError::UnexpectedChar { ch, offset: start }),
        };

        Ok(Some(token))
    }

    fn single(&self, op: Operator, start: usize) -> Token {
        Token::new(TokenKind::Operator(op), start, start + 1)
    }

    /// Returns the byte offset just past the last consumed character.
    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(offset, _)| offset)
            .unwrap_or(self.input.len())
    }

    fn read_with_equals(&mut self, start: usize, bare: Operator, with_equals: Operator) -> Token {
        match self.chars.peek() {
            Some(&(_, '=')) => {
                self.chars.next();
                Token::new(TokenKind::Operator(with_equals), start, start + 2)
            }
            _ => self.single(bare, start),
        }
    }

    /// `d` directly followed by a letter or underscore is an identifier such as `dex`.
    /// Digits do not count: `d6` is always a die.
    fn dice_follows(&mut self) -> bool {
        match self.chars.peek() {
            Some(&(_, next)) => !(next.is_ascii_alphabetic() || next == '_'),
            None => true,
        }
    }

    fn read_whitespace(&mut self, start: usize) -> Token {
        while let Some(&(_, ch)) = self.chars.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.chars.next();
        }
        let end = self.position();
        Token::new(TokenKind::Whitespace, start, end)
    }

    fn read_integer(&mut self, start: usize) -> Token {
        while let Some(&(_, ch)) = self.chars.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            self.chars.next();
        }
        let end = self.position();
        Token::new(TokenKind::Integer, start, end)
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        while let Some(&(_, ch)) = self.chars.peek() {
            if !is_identifier_continue(ch) {
                break;
            }
            self.chars.next();
        }
        let end = self.position();

        match Operator::from_keyword(&self.input[start..end]) {
            Some(op) => Token::new(TokenKind::Operator(op), start, end),
            None => Token::new(TokenKind::Identifier, start, end),
        }
    }

    /// Reads a quoted literal. The span keeps both quotes; a backslash
    /// escapes whatever character follows it.
    fn read_string(&mut self, start: usize, quote: char) -> Result<Token, LexError> {
        while let Some((offset, ch)) = self.chars.next() {
            if ch == '\\' {
                if self.chars.next().is_none() {
                    break;
                }
            } else if ch == quote {
                return Ok(Token::new(
                    TokenKind::StringLiteral,
                    start,
                    offset + ch.len_utf8(),
                ));
            }
        }
        Err(LexError::UnterminatedString { offset: start })
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Tokenizes the whole input, whitespace tokens included.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).collect()
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// A string literal with its `{...}` substitutions lifted out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTemplate {
    /// The literal text with escapes resolved and every substitution removed.
    pub text: String,
    /// Byte offset into `text` and formula source of each substitution,
    /// in source order.
    pub substitutions: Vec<(usize, String)>,
}

/// Strips the quotes from a string literal token's text and resolves
/// backslash escapes. Each `{...}` span is lifted out as a substitution; an
/// escaped brace is plain text, and a `{` with no closing `}` leaves the
/// rest of the literal as text.
pub fn unquote(literal: &str) -> StringTemplate {
    let mut chars = literal.chars();
    chars.next();
    chars.next_back();

    let mut text = String::with_capacity(literal.len());
    let mut substitutions = Vec::new();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    text.push(escaped);
                }
            }
            '{' => {
                let resume = chars.clone();
                match read_substitution(&mut chars) {
                    Some(source) => substitutions.push((text.len(), source)),
                    None => {
                        text.push('{');
                        chars = resume;
                    }
                }
            }
            _ => text.push(ch),
        }
    }

    StringTemplate {
        text,
        substitutions,
    }
}

/// Reads up to the first unescaped `}`. `None` if the input ends first.
fn read_substitution(chars: &mut std::str::Chars<'_>) -> Option<String> {
    let mut source = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => source.push(chars.next()?),
            '}' => return Some(source),
            _ => source.push(ch),
        }
    }
    None
}
