//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the game formula engine.
//! CONTEXT: Re-exports public types and modules for use by host crates, plus
//! the parser types hosts need to inspect a formula's tree.

pub mod builtins;
pub mod config;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod formula;
pub mod scope;
pub mod value;

// Re-export commonly used types at the crate root
pub use builtins::{pack_rgb, transition};
pub use config::Limits;
pub use environment::{Environment, MapEnvironment, NullEnvironment};
pub use error::{EvalError, EvalResult};
pub use evaluator::Evaluator;
pub use formula::{Evaluation, Formula};
pub use formula_parser::{
    BinaryOperator, BuiltinFunction, Expression, ParseError, ParseResult, Substitution,
    UnaryOperator, WhereBinding,
};
pub use scope::{EvalScope, SweepStats};
pub use value::Value;
