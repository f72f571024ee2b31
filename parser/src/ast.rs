//! FILENAME: parser/src/ast.rs
//! PURPOSE: Defines the Abstract Syntax Tree (AST) for formula expressions.
//! CONTEXT: After the Lexer tokenizes a formula string, the Parser converts
//! those tokens into this tree structure. The engine's Evaluator then walks
//! this tree against an environment to compute a value.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: integers, strings, lists ([1, 2, 3])
//! - String interpolation: 'Your strength is {strength}'
//! - Identifiers resolved through the environment: strength
//! - Member access: char.strength, members.0
//! - Binary operations: + - * / % ^ d = != < > <= >= and or
//! - Unary operations: not, - (negation)
//! - Function calls: if(strength > 12, 7, 2), choose(members, strength)
//! - Local bindings: x * 5 where x = 1

use crate::functions::BuiltinFunction;
use std::fmt;

/// Represents a parsed formula expression.
/// Each node owns its children; the tree is immutable once built.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A name looked up in the current environment.
    Identifier(String),

    /// A decimal integer literal.
    Integer(i64),

    /// A quoted string literal with escapes already resolved.
    String(String),

    /// A string literal with `{expr}` substitutions. Each substitution's
    /// value is inserted into `text` at its byte offset.
    Interpolated {
        text: String,
        substitutions: Vec<Substitution>,
    },

    /// A list literal like [1, 'a', x].
    List(Vec<Expression>),

    /// A unary operation: op operand (e.g., not x, -5).
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// A binary operation: left op right (e.g., 5 + 3, strength > 12, 3d6).
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// Member access. The right side is evaluated with the left side's value
    /// as its environment, or as an index when the left side is a list.
    Dot {
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// A call to one of the built-in functions, arity already validated.
    FunctionCall {
        func: BuiltinFunction,
        args: Vec<Expression>,
    },

    /// `body where name = expr, ...` with bindings in source order.
    Where {
        body: Box<Expression>,
        bindings: Vec<WhereBinding>,
    },
}

/// One `name = expression` clause of a where expression.
#[derive(Debug, PartialEq, Clone)]
pub struct WhereBinding {
    pub name: String,
    pub value: Expression,
}

/// One `{expr}` span of an interpolated string.
#[derive(Debug, PartialEq, Clone)]
pub struct Substitution {
    /// Byte offset into the surrounding literal's text.
    pub pos: usize,
    pub expr: Expression,
}

/// Binary operators for expressions.
/// Listed in order of precedence groups (`or` is loosest).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOperator {
    Or,
    And,

    // Comparison operators
    Equal,        // =
    NotEqual,     // !=
    LessThan,     // <
    GreaterThan,  // >
    LessEqual,    // <=
    GreaterEqual, // >=

    // Arithmetic operators
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Modulo,   // %
    Power,    // ^
    Dice,     // d
}

/// Unary operators.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOperator {
    Not,    // not
    Negate, // -
}

impl BinaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Dice => "d",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "not"),
            UnaryOperator::Negate => write!(f, "-"),
        }
    }
}

/// Renders the tree fully parenthesized. Used in diagnostics, where the
/// grouping the parser chose matters more than the source spelling.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::String(s) => write!(f, "'{}'", Escaped(s)),
            Expression::Interpolated {
                text,
                substitutions,
            } => {
                write!(f, "'")?;
                let mut cursor = 0;
                for sub in substitutions {
                    let chunk = text.get(cursor..sub.pos).unwrap_or_default();
                    let expr = sub.expr.to_string();
                    write!(f, "{}{{{}}}", Escaped(chunk), Escaped(&expr))?;
                    cursor = sub.pos.max(cursor);
                }
                write!(f, "{}'", Escaped(text.get(cursor..).unwrap_or_default()))
            }
            Expression::List(items) => {
                write!(f, "[")?;
                write_separated(f, items)?;
                write!(f, "]")
            }
            Expression::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => write!(f, "(not {})", operand),
                UnaryOperator::Negate => write!(f, "(-{})", operand),
            },
            Expression::BinaryOp { left, op, right } => match op {
                BinaryOperator::Dice => write!(f, "({}d{})", left, right),
                _ => write!(f, "({} {} {})", left, op, right),
            },
            Expression::Dot { left, right } => write!(f, "{}.{}", left, right),
            Expression::FunctionCall { func, args } => {
                write!(f, "{}(", func)?;
                write_separated(f, args)?;
                write!(f, ")")
            }
            Expression::Where { body, bindings } => {
                write!(f, "({} where ", body)?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", binding.name, binding.value)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Writes text for use inside a quoted literal: quotes, backslashes and
/// braces are escaped.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.0.chars() {
            if matches!(ch, '\'' | '\\' | '{' | '}') {
                write!(f, "\\")?;
            }
            write!(f, "{}", ch)?;
        }
        Ok(())
    }
}
