//! FILENAME: parser/src/parser.rs
//! PURPOSE: Operator-precedence parser that converts a token slice into an AST.
//! CONTEXT: This is the second stage of the parsing pipeline. Rather than
//! descending through one function per precedence level, it works on whole
//! token ranges: find the loosest-binding operator outside any parentheses,
//! split there, and recurse into both halves.
//!
//! ALGORITHM (for a token range):
//!   1. Scan at nesting depth 0 for the operator with the lowest precedence,
//!      keeping the first one found on ties. Operators directly after another
//!      operator are prefix operators and never split points.
//!   2. No operator: the range is a parenthesized group, a list literal,
//!      a single literal/identifier, or a function call `name(args)`.
//!   3. Operator at the first token: unary prefix (`not`, `-`) over the rest.
//!   4. `where`: body plus `name = expr` clauses. Otherwise every
//!      operator of the same precedence at depth 0 is taken as one chain
//!      and its operands are folded to the right, so `a - b - c` is
//!      `a - (b - c)`. `.` builds member access, the rest binary operations.
//!
//! DEPTH: each descent into a group, operand, argument or substitution
//! counts one level. The terms of a flat chain share a level, so a long
//! `1 + 1 + ...` is not rejected as deep.
//!
//! PRECEDENCE (loosest first):
//!   not < where < or < and < (= != < > <= >=) < (+ -) < (* / %) < ^ < d < .

use crate::ast::{BinaryOperator, Expression, Substitution, UnaryOperator, WhereBinding};
use crate::functions::BuiltinFunction;
use crate::lexer::{tokenize, unquote, LexError};
use crate::token::{Operator, Token, TokenKind};
use thiserror::Error;

/// Nesting limit applied when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Construction-time failures. These point at malformed content data and are
/// always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("empty expression")]
    EmptyExpression,

    #[error("unbalanced parentheses at offset {offset}")]
    UnbalancedParens { offset: usize },

    #[error("could not parse expression: '{text}'")]
    CouldNotParse { text: String },

    #[error("illegal unary operator '{op}'")]
    IllegalUnaryOperator { op: Operator },

    #[error("'{op}' cannot be used as a binary operator")]
    IllegalBinaryOperator { op: Operator },

    #[error("missing right-hand operand for '{op}'")]
    MissingOperand { op: Operator },

    #[error("too few arguments to '{function}': expected at least {min}, found {found}")]
    TooFewArguments {
        function: BuiltinFunction,
        min: usize,
        found: usize,
    },

    #[error("too many arguments to '{function}': expected at most {max}, found {found}")]
    TooManyArguments {
        function: BuiltinFunction,
        max: usize,
        found: usize,
    },

    #[error("no such function '{name}'")]
    NoSuchFunction { name: String },

    #[error("malformed where clause: {reason}")]
    MalformedWhere { reason: String },

    #[error("integer literal '{text}' is out of range")]
    IntegerOutOfRange { text: String },

    #[error("expression nested deeper than {limit} levels")]
    TooDeep { limit: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Holds the source text and its significant (non-whitespace) tokens.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    /// Tokenizes the input and discards whitespace.
    pub fn new(source: &'a str) -> ParseResult<Self> {
        let tokens = tokenize(source)?
            .into_iter()
            .filter(|token| !token.is_whitespace())
            .collect();

        Ok(Parser {
            source,
            tokens,
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    /// Caps how deeply ranges may nest before parsing gives up.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Parses the entire input and returns the AST.
    pub fn parse(&self) -> ParseResult<Expression> {
        self.check_balance()?;
        self.parse_range(&self.tokens, 0)
    }

    /// Verifies that every '(' and '[' is closed by its own kind of bracket.
    fn check_balance(&self) -> ParseResult<()> {
        let mut open: Vec<&Token> = Vec::new();

        for token in &self.tokens {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket => open.push(token),
                TokenKind::RParen | TokenKind::RBracket => {
                    let expected = if token.kind == TokenKind::RParen {
                        TokenKind::LParen
                    } else {
                        TokenKind::LBracket
                    };
                    match open.pop() {
                        Some(opener) if opener.kind == expected => {}
                        _ => {
                            return Err(ParseError::UnbalancedParens {
                                offset: token.span.start,
                            })
                        }
                    }
                }
                _ => {}
            }
        }

        match open.pop() {
            Some(unclosed) => Err(ParseError::UnbalancedParens {
                offset: unclosed.span.start,
            }),
            None => Ok(()),
        }
    }

    fn parse_range(&self, tokens: &[Token], depth: usize) -> ParseResult<Expression> {
        if depth > self.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.max_depth,
            });
        }

        if tokens.is_empty() {
            return Err(ParseError::EmptyExpression);
        }

        match find_split_operator(tokens) {
            Some(index) => self.parse_operator(tokens, index, depth),
            None => self.parse_operand(tokens, depth),
        }
    }

    /// Builds the node for the operator chosen at `index`.
    fn parse_operator(
        &self,
        tokens: &[Token],
        index: usize,
        depth: usize,
    ) -> ParseResult<Expression> {
        let op = match tokens[index].operator() {
            Some(op) => op,
            None => {
                return Err(ParseError::CouldNotParse {
                    text: self.text_of(tokens).to_string(),
                })
            }
        };
        let rhs = &tokens[index + 1..];

        if index == 0 {
            let unary = match op {
                Operator::Not => UnaryOperator::Not,
                Operator::Minus => UnaryOperator::Negate,
                other => return Err(ParseError::IllegalUnaryOperator { op: other }),
            };
            if rhs.is_empty() {
                return Err(ParseError::MissingOperand { op });
            }
            return Ok(Expression::UnaryOp {
                op: unary,
                operand: Box::new(self.parse_range(rhs, depth + 1)?),
            });
        }

        if op == Operator::Where {
            let bindings = self.parse_where_clauses(rhs, depth + 1)?;
            return Ok(Expression::Where {
                body: Box::new(self.parse_range(&tokens[..index], depth + 1)?),
                bindings,
            });
        }

        self.parse_chain(tokens, index, op.precedence(), depth)
    }

    /// Parses `t0 op1 t1 op2 t2 ...` where every `op` has `precedence` and
    /// the first sits at `first`, nesting to the right: `t0 op1 (t1 op2 t2)`.
    fn parse_chain(
        &self,
        tokens: &[Token],
        first: usize,
        precedence: u8,
        depth: usize,
    ) -> ParseResult<Expression> {
        let chain: Vec<(usize, Operator)> = top_level_operators(tokens)
            .into_iter()
            .filter(|&(i, op)| i >= first && op.precedence() == precedence)
            .collect();

        for &(_, op) in &chain {
            if op != Operator::Dot && binary_operator(op).is_none() {
                return Err(ParseError::IllegalBinaryOperator { op });
            }
        }

        let mut operands = Vec::with_capacity(chain.len() + 1);
        let mut start = 0;
        for &(i, op) in &chain {
            operands.push(self.parse_range(&tokens[start..i], depth + 1)?);
            start = i + 1;
            if start == tokens.len() {
                return Err(ParseError::MissingOperand { op });
            }
        }
        operands.push(self.parse_range(&tokens[start..], depth + 1)?);

        let mut result = operands.pop().ok_or(ParseError::EmptyExpression)?;
        for ((_, op), left) in chain.into_iter().zip(operands).rev() {
            let (left, right) = (Box::new(left), Box::new(result));
            result = match binary_operator(op) {
                Some(op) => Expression::BinaryOp { left, op, right },
                None => Expression::Dot { left, right },
            };
        }
        Ok(result)
    }

    /// Parses a range with no operator at depth 0.
    fn parse_operand(&self, tokens: &[Token], depth: usize) -> ParseResult<Expression> {
        let first = tokens[0];
        let last_index = tokens.len() - 1;

        // Group spanning the whole range: (expr) or [a, b, c]
        if closing_index(tokens, 0) == Some(last_index) {
            let inner = &tokens[1..last_index];
            match first.kind {
                TokenKind::LParen => return self.parse_range(inner, depth + 1),
                TokenKind::LBracket => {
                    return Ok(Expression::List(self.parse_args(inner, depth + 1)?))
                }
                _ => {}
            }
        }

        if tokens.len() == 1 {
            let text = first.text(self.source);
            match first.kind {
                TokenKind::Identifier => return Ok(Expression::Identifier(text.to_string())),
                TokenKind::Integer => {
                    return text
                        .parse::<i64>()
                        .map(Expression::Integer)
                        .map_err(|_| ParseError::IntegerOutOfRange {
                            text: text.to_string(),
                        })
                }
                TokenKind::StringLiteral => return self.parse_string_literal(text, depth),
                _ => {}
            }
        }

        // Function call: name(args)
        if first.kind == TokenKind::Identifier
            && tokens[1].kind == TokenKind::LParen
            && closing_index(tokens, 1) == Some(last_index)
        {
            let name = first.text(self.source);
            let func = BuiltinFunction::from_name(name).ok_or_else(|| {
                ParseError::NoSuchFunction {
                    name: name.to_string(),
                }
            })?;
            let args = self.parse_args(&tokens[2..last_index], depth + 1)?;
            check_arity(func, args.len())?;
            return Ok(Expression::FunctionCall { func, args });
        }

        Err(ParseError::CouldNotParse {
            text: self.text_of(tokens).to_string(),
        })
    }

    /// Parses a quoted literal. Each `{...}` span is parsed as a formula of
    /// its own; a literal without one stays a plain string.
    fn parse_string_literal(&self, literal: &str, depth: usize) -> ParseResult<Expression> {
        let template = unquote(literal);
        if template.substitutions.is_empty() {
            return Ok(Expression::String(template.text));
        }

        let substitutions = template
            .substitutions
            .into_iter()
            .map(|(pos, source)| {
                let inner = Parser::new(&source)?.with_max_depth(self.max_depth);
                inner.check_balance()?;
                let expr = inner.parse_range(&inner.tokens, depth + 1)?;
                Ok(Substitution { pos, expr })
            })
            .collect::<ParseResult<Vec<_>>>()?;

        Ok(Expression::Interpolated {
            text: template.text,
            substitutions,
        })
    }

    /// Parses a comma-separated argument list. An empty range is an empty list.
    fn parse_args(&self, tokens: &[Token], depth: usize) -> ParseResult<Vec<Expression>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        split_top_level_commas(tokens)
            .into_iter()
            .map(|arg| self.parse_range(arg, depth))
            .collect()
    }

    /// Parses `name = expr, name = expr, ...` following a `where` keyword.
    fn parse_where_clauses(
        &self,
        tokens: &[Token],
        depth: usize,
    ) -> ParseResult<Vec<WhereBinding>> {
        if tokens.is_empty() {
            return Err(ParseError::MalformedWhere {
                reason: "expected at least one 'name = expression' binding".to_string(),
            });
        }

        let mut clauses = split_top_level_commas(tokens);

        // A trailing comma after the last binding is allowed
        if clauses.len() > 1 && clauses.last().is_some_and(|clause| clause.is_empty()) {
            clauses.pop();
        }

        let mut bindings: Vec<WhereBinding> = Vec::new();

        for clause in clauses {
            let binding = match clause {
                [] => {
                    return Err(ParseError::MalformedWhere {
                        reason: "empty binding".to_string(),
                    })
                }
                [name, equals, value @ ..]
                    if name.kind == TokenKind::Identifier
                        && equals.operator() == Some(Operator::Equal) =>
                {
                    let name = name.text(self.source);
                    if value.is_empty() {
                        return Err(ParseError::MalformedWhere {
                            reason: format!("missing expression for '{}'", name),
                        });
                    }
                    WhereBinding {
                        name: name.to_string(),
                        value: self.parse_range(value, depth)?,
                    }
                }
                _ => {
                    return Err(ParseError::MalformedWhere {
                        reason: format!(
                            "expected 'name = expression', found '{}'",
                            self.text_of(clause)
                        ),
                    })
                }
            };

            // A repeated name replaces the earlier binding in place
            match bindings.iter_mut().find(|b| b.name == binding.name) {
                Some(existing) => *existing = binding,
                None => bindings.push(binding),
            }
        }

        Ok(bindings)
    }

    /// Returns the source text covered by a non-empty token range.
    fn text_of(&self, tokens: &[Token]) -> &'a str {
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => &self.source[first.span.start..last.span.end],
            _ => "",
        }
    }
}

/// Finds the split point: the loosest operator at depth 0, first one on ties.
fn find_split_operator(tokens: &[Token]) -> Option<usize> {
    top_level_operators(tokens)
        .into_iter()
        .min_by_key(|&(_, op)| op.precedence())
        .map(|(index, _)| index)
}

/// Operators at bracket depth 0 that can split a range, with their indices.
fn top_level_operators(tokens: &[Token]) -> Vec<(usize, Operator)> {
    let mut depth = 0usize;
    let mut found = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
            TokenKind::Operator(op) if depth == 0 => {
                // Prefix position: belongs to the operand that follows
                if i > 0 && tokens[i - 1].operator().is_some() {
                    continue;
                }
                found.push((i, op));
            }
            _ => {}
        }
    }

    found
}

/// Index of the bracket closing the one at `open`, if `open` is an opener.
fn closing_index(tokens: &[Token], open: usize) -> Option<usize> {
    match tokens.get(open)?.kind {
        TokenKind::LParen | TokenKind::LBracket => {}
        _ => return None,
    }

    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a range on commas outside any brackets.
fn split_top_level_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                segments.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&tokens[start..]);
    segments
}

fn binary_operator(op: Operator) -> Option<BinaryOperator> {
    let op = match op {
        Operator::Or => BinaryOperator::Or,
        Operator::And => BinaryOperator::And,
        Operator::Equal => BinaryOperator::Equal,
        Operator::NotEqual => BinaryOperator::NotEqual,
        Operator::Less => BinaryOperator::LessThan,
        Operator::Greater => BinaryOperator::GreaterThan,
        Operator::LessEqual => BinaryOperator::LessEqual,
        Operator::GreaterEqual => BinaryOperator::GreaterEqual,
        Operator::Plus => BinaryOperator::Add,
        Operator::Minus => BinaryOperator::Subtract,
        Operator::Star => BinaryOperator::Multiply,
        Operator::Slash => BinaryOperator::Divide,
        Operator::Percent => BinaryOperator::Modulo,
        Operator::Caret => BinaryOperator::Power,
        Operator::Dice => BinaryOperator::Dice,
        Operator::Dot | Operator::Not | Operator::Where => return None,
    };
    Some(op)
}

fn check_arity(func: BuiltinFunction, found: usize) -> ParseResult<()> {
    let arity = func.arity();
    if found < arity.min {
        return Err(ParseError::TooFewArguments {
            function: func,
            min: arity.min,
            found,
        });
    }
    if let Some(max) = arity.max {
        if found > max {
            return Err(ParseError::TooManyArguments {
                function: func,
                max,
                found,
            });
        }
    }
    Ok(())
}

/// Convenience function to parse a formula string directly.
pub fn parse(input: &str) -> ParseResult<Expression> {
    Parser::new(input)?.parse()
}
