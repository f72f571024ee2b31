//! FILENAME: engine/src/error.rs
//! PURPOSE: Runtime error type for formula evaluation.
//! CONTEXT: These errors never escape `Formula::execute`; the evaluator logs
//! them and substitutes Null for the failing node. They are still typed so
//! hosts that ask for diagnostics can tell the failure modes apart.

use formula_parser::{BinaryOperator, ParseError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("type error: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("cannot apply '{op}' to {left} and {right}")]
    IncompatibleOperands {
        op: BinaryOperator,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot compare {left} with {right}")]
    Incomparable {
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{op}'")]
    Overflow { op: &'static str },

    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("{function} does not accept {found} arguments")]
    WrongArgumentCount {
        function: &'static str,
        found: usize,
    },

    #[error("{found} value is not an environment")]
    NotAnEnvironment { found: &'static str },

    #[error("'{key}' is read-only")]
    ReadOnly { key: String },

    #[error("{found} value cannot be written as a formula literal")]
    NotSerializable { found: &'static str },

    #[error("dice roll of {requested} dice exceeds the limit of {limit}")]
    TooManyDice { requested: i64, limit: i64 },

    #[error("evaluation nested deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("invalid formula literal: {0}")]
    Parse(#[from] ParseError),
}

pub type EvalResult<T> = Result<T, EvalError>;
