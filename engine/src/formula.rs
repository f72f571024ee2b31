//! FILENAME: engine/src/formula.rs
//! PURPOSE: The public facade: a formula parsed once and evaluated many times.
//! CONTEXT: Game data carries formulas as text (damage, stat bonuses, colors).
//! A Formula keeps that text for persistence and diagnostics alongside the
//! parsed tree. Each evaluation opens its own EvalScope and Evaluator, so a
//! Formula holds no mutable state and can be shared between threads.

use crate::config::Limits;
use crate::environment::{Environment, NullEnvironment};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::scope::{EvalScope, SweepStats};
use crate::value::{push_quoted, Value};
use formula_parser::{Expression, ParseError, ParseResult, Parser};
use log::debug;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serializes as its source text. Limits are not part of that text, so a
/// deserialized formula is parsed with `Limits::default()`; use
/// `reparse_with` to apply a host's own limits after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Formula {
    source: String,
    expr: Expression,
    limits: Limits,
}

/// Everything one evaluation produced.
#[derive(Debug)]
pub struct Evaluation {
    pub value: Value,
    /// Errors recovered during evaluation, in the order they occurred.
    pub diagnostics: Vec<EvalError>,
    pub sweep: SweepStats,
}

impl Evaluation {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl Formula {
    /// Parses `text` with the default limits.
    pub fn new(text: &str) -> ParseResult<Formula> {
        Self::with_limits(text, Limits::default())
    }

    pub fn with_limits(text: &str, limits: Limits) -> ParseResult<Formula> {
        let parsed = Parser::new(text)
            .and_then(|parser| parser.with_max_depth(limits.max_parse_depth).parse());

        match parsed {
            Ok(expr) => Ok(Formula {
                source: text.to_string(),
                expr,
                limits,
            }),
            Err(err) => {
                debug!("failed to parse formula '{}': {}", text, err);
                Err(err)
            }
        }
    }

    /// Parses `text` unless it is blank, for optional formula attributes.
    pub fn optional(text: &str) -> ParseResult<Option<Formula>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        Self::new(text).map(Some)
    }

    /// A formula yielding `text` as a string, with each `{expr}` span
    /// replaced by that expression's value. Used for host text such as
    /// dialog lines: `"Your strength is {strength}"`.
    pub fn from_string_literal(text: &str) -> ParseResult<Formula> {
        let mut source = String::new();
        push_quoted(&mut source, text, true);
        Self::new(&source)
    }

    /// Parses this formula's source again under `limits`.
    pub fn reparse_with(&self, limits: Limits) -> ParseResult<Formula> {
        Self::with_limits(&self.source, limits)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression(&self) -> &Expression {
        &self.expr
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Evaluates against `env`, rolling dice with the thread-local generator.
    pub fn execute(&self, env: &dyn Environment) -> Value {
        let mut rng = rand::thread_rng();
        self.evaluate(env, &mut rng).value
    }

    pub fn execute_with_rng(&self, env: &dyn Environment, rng: &mut dyn RngCore) -> Value {
        self.evaluate(env, rng).value
    }

    /// Evaluates against an environment where every name is Null.
    pub fn execute_default(&self) -> Value {
        self.execute(&NullEnvironment)
    }

    /// Like `execute`, but reports the first recovered error instead of
    /// the value it was folded into.
    pub fn try_execute(&self, env: &dyn Environment) -> EvalResult<Value> {
        let mut rng = rand::thread_rng();
        let evaluation = self.evaluate(env, &mut rng);
        match evaluation.diagnostics.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(evaluation.value),
        }
    }

    /// One full evaluation: a fresh scope, the value, what went wrong, and
    /// what the closing sweep released.
    pub fn evaluate(&self, env: &dyn Environment, rng: &mut dyn RngCore) -> Evaluation {
        let scope = EvalScope::new();
        let (value, diagnostics) = {
            let evaluator = Evaluator::new(&scope, rng, self.limits);
            let value = evaluator.evaluate(&self.expr, env);
            (value, evaluator.into_diagnostics())
        };

        Evaluation {
            value,
            diagnostics,
            sweep: scope.sweep(),
        }
    }

    /// Executes `formula` if there is one, otherwise returns `default`.
    pub fn evaluate_or(formula: Option<&Formula>, env: &dyn Environment, default: Value) -> Value {
        match formula {
            Some(formula) => formula.execute(env),
            None => default,
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl FromStr for Formula {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::new(s)
    }
}

impl TryFrom<String> for Formula {
    type Error = ParseError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Formula::new(&source)
    }
}

impl From<Formula> for String {
    fn from(formula: Formula) -> Self {
        formula.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MapEnvironment;

    #[test]
    fn test_source_is_preserved() {
        let text = "strength/2 +   agility";
        let formula = Formula::new(text).unwrap();
        assert_eq!(formula.source(), text);
        assert_eq!(formula.to_string(), text);
    }

    #[test]
    fn test_parse_error_is_returned() {
        assert!(Formula::new("(1 + 2").is_err());
        assert!(Formula::new("nosuch(1)").is_err());
    }

    #[test]
    fn test_parse_depth_comes_from_limits() {
        let limits = Limits {
            max_parse_depth: 3,
            ..Limits::default()
        };
        assert!(Formula::with_limits("((((1))))", limits).is_err());
        assert!(Formula::with_limits("((((1))))", Limits::default()).is_ok());
    }

    #[test]
    fn test_optional() {
        assert!(Formula::optional("   ").unwrap().is_none());
        assert!(Formula::optional("1").unwrap().is_some());
        assert!(Formula::optional("1 +").is_err());
    }

    #[test]
    fn test_string_literal_formula() {
        let formula = Formula::from_string_literal("it's").unwrap();
        assert_eq!(formula.source(), r"'it\'s'");
        assert_eq!(formula.execute_default(), Value::from("it's"));
        assert_eq!(formula.expression(), &Expression::String("it's".to_string()));
    }

    #[test]
    fn test_string_literal_formula_interpolates() {
        let env = MapEnvironment::new().with("level", 3).with("name", "Bryn");
        let formula = Formula::from_string_literal("{level} gold").unwrap();
        assert!(matches!(formula.expression(), Expression::Interpolated { .. }));
        assert_eq!(formula.execute(&env), Value::from("3 gold"));

        let formula = Formula::from_string_literal("{name} says 'hi' to {if(level > 2, 'you', 'me')}")
            .unwrap();
        assert_eq!(formula.execute(&env), Value::from("Bryn says 'hi' to you"));

        assert!(Formula::from_string_literal("{level +}").is_err());
    }

    #[test]
    fn test_reparse_with_applies_limits() {
        let formula: Formula = "((((1))))".parse().unwrap();
        assert_eq!(formula.limits(), Limits::default());

        let strict = Limits {
            max_parse_depth: 3,
            ..Limits::default()
        };
        assert!(formula.reparse_with(strict).is_err());

        let relaxed = Limits {
            max_dice_rolls: 5,
            ..Limits::default()
        };
        let reparsed = formula.reparse_with(relaxed).unwrap();
        assert_eq!(reparsed.limits(), relaxed);
        assert_eq!(reparsed.source(), formula.source());
    }

    #[test]
    fn test_try_execute_reports_first_error() {
        let formula = Formula::new("(1/0) + abs('x')").unwrap();
        assert_eq!(formula.execute_default(), Value::Integer(0));
        assert_eq!(
            formula.try_execute(&NullEnvironment),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_evaluate_or_default() {
        let env = MapEnvironment::new().with("level", 3);
        let formula = Formula::new("level * 10").unwrap();
        assert_eq!(
            Formula::evaluate_or(Some(&formula), &env, Value::Integer(1)),
            Value::Integer(30)
        );
        assert_eq!(
            Formula::evaluate_or(None, &env, Value::Integer(1)),
            Value::Integer(1)
        );
    }
}
