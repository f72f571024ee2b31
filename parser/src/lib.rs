//! FILENAME: parser/src/lib.rs
//! PURPOSE: Library root for the game formula parser.
//! CONTEXT: This module exposes the lexer, parser, AST and built-in function
//! registry needed to convert formula strings into evaluatable expression trees.
//!
//! PIPELINE: Formula String --> Lexer --> Tokens --> Parser --> AST --> Evaluator
//!
//! SUPPORTED FEATURES:
//! - Integer arithmetic: +, -, *, /, %, ^ (power), d (dice)
//! - Comparison: =, !=, <, >, <=, >=
//! - Logic: and, or, not
//! - Strings ('abc' or "abc") and list literals ([1, 2, 3])
//! - String interpolation: 'Your strength is {strength}'
//! - Member access: char.strength, choose(members, strength).strength
//! - Local bindings: x * 5 where x = 1
//! - Built-in function calls: if(strength > 12, 7, 2)
//! - Parentheses for grouping

pub mod ast;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod token;


// Re-export commonly used types for convenience
pub use ast::{BinaryOperator, Expression, Substitution, UnaryOperator, WhereBinding};
pub use functions::{Arity, BuiltinFunction};
pub use lexer::{tokenize, LexError, Lexer, StringTemplate};
pub use parser::{parse, ParseError, ParseResult, Parser, DEFAULT_MAX_DEPTH};
pub use token::{Operator, Span, Token, TokenKind};
