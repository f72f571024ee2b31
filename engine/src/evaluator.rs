//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Evaluates formula ASTs against an environment to compute values.
//! CONTEXT: After a formula is parsed into an AST, this module walks the tree
//! and computes the result. Identifiers resolve through the Environment
//! passed in; member access and list functions switch to a different
//! environment for their right-hand side.
//!
//! SUPPORTED FEATURES:
//! - Literals: integers, strings and lists (allocated in the EvalScope)
//! - Interpolated strings: each `{expr}` rendered with Value's Display
//! - Binary operations: + - * / % ^ d = != < > <= >= and or
//! - Unary operations: not, - (negation)
//! - Member access on environments and indexing on lists
//! - Where bindings, memoized per evaluation of the where node
//! - Built-in functions (see builtins.rs)
//!
//! ERROR POLICY: every node returns EvalResult internally. `evaluate` catches
//! a failure at the node where it happened, logs and records it, and yields
//! Null so the enclosing expression carries on.

use crate::config::Limits;
use crate::environment::{Environment, MapEnvironment};
use crate::error::{EvalError, EvalResult};
use crate::scope::EvalScope;
use crate::value::Value;
use formula_parser::{BinaryOperator, Expression, Substitution, UnaryOperator, WhereBinding};
use log::warn;
use rand::{Rng, RngCore};
use std::cell::{Cell, OnceCell, RefCell};
use std::cmp::Ordering;

/// The formula evaluator.
/// Lives for one top-level evaluation; holds the scope that owns its
/// transient allocations and the random source used by dice.
pub struct Evaluator<'s> {
    scope: &'s EvalScope,
    limits: Limits,
    rng: RefCell<&'s mut dyn RngCore>,
    depth: Cell<usize>,
    diagnostics: RefCell<Vec<EvalError>>,
}

impl<'s> Evaluator<'s> {
    pub fn new(scope: &'s EvalScope, rng: &'s mut dyn RngCore, limits: Limits) -> Self {
        Evaluator {
            scope,
            limits,
            rng: RefCell::new(rng),
            depth: Cell::new(0),
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    /// Evaluates an expression, substituting Null for a failed node.
    pub fn evaluate(&self, expr: &Expression, env: &dyn Environment) -> Value {
        match self.try_evaluate(expr, env) {
            Ok(value) => value,
            Err(err) => {
                warn!("formula evaluation error: {}", err);
                self.diagnostics.borrow_mut().push(err);
                Value::Null
            }
        }
    }

    /// Evaluates an expression, returning this node's own failure as `Err`.
    /// Failures of sub-expressions have already been recovered to Null.
    pub fn try_evaluate(&self, expr: &Expression, env: &dyn Environment) -> EvalResult<Value> {
        let depth = self.depth.get();
        if depth >= self.limits.max_eval_depth {
            return Err(EvalError::TooDeep {
                limit: self.limits.max_eval_depth,
            });
        }

        self.depth.set(depth + 1);
        let result = self.eval_node(expr, env);
        self.depth.set(depth);
        result
    }

    /// Errors recorded during evaluation, in the order they occurred.
    pub fn into_diagnostics(self) -> Vec<EvalError> {
        self.diagnostics.into_inner()
    }

    fn eval_node(&self, expr: &Expression, env: &dyn Environment) -> EvalResult<Value> {
        match expr {
            Expression::Identifier(name) => Ok(env.query(name)),
            Expression::Integer(n) => Ok(Value::Integer(*n)),
            Expression::String(s) => Ok(self.scope.alloc_string(s)),
            Expression::Interpolated {
                text,
                substitutions,
            } => self.eval_interpolated(text, substitutions, env),
            Expression::List(items) => {
                let values = items.iter().map(|item| self.evaluate(item, env)).collect();
                Ok(self.alloc_list(values))
            }
            Expression::UnaryOp { op, operand } => self.eval_unary_op(*op, operand, env),
            Expression::BinaryOp { left, op, right } => {
                self.eval_binary_op(left, *op, right, env)
            }
            Expression::Dot { left, right } => self.eval_dot(left, right, env),
            Expression::FunctionCall { func, args } => self.eval_function(*func, args, env),
            Expression::Where { body, bindings } => {
                let scoped = WhereEnvironment::new(self, env, bindings);
                Ok(self.evaluate(body, &scoped))
            }
        }
    }

    fn eval_interpolated(
        &self,
        text: &str,
        substitutions: &[Substitution],
        env: &dyn Environment,
    ) -> EvalResult<Value> {
        let mut rendered = String::with_capacity(text.len());
        let mut cursor = 0;

        for sub in substitutions {
            // Offsets come from the parser; a hand-built tree may get them wrong
            let chunk = text.get(cursor..sub.pos).ok_or(EvalError::IndexOutOfRange {
                index: i64::try_from(sub.pos).unwrap_or(i64::MAX),
                len: text.len(),
            })?;
            rendered.push_str(chunk);
            rendered.push_str(&self.evaluate(&sub.expr, env).to_string());
            cursor = sub.pos;
        }
        rendered.push_str(&text[cursor..]);

        Ok(self.scope.alloc_string(&rendered))
    }

    fn eval_unary_op(
        &self,
        op: UnaryOperator,
        operand: &Expression,
        env: &dyn Environment,
    ) -> EvalResult<Value> {
        let value = self.evaluate(operand, env);
        match op {
            UnaryOperator::Not => Ok(Value::from(!value.as_bool())),
            UnaryOperator::Negate => value.neg(),
        }
    }

    /// Both operands are always evaluated; `and` and `or` do not short-circuit.
    fn eval_binary_op(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        env: &dyn Environment,
    ) -> EvalResult<Value> {
        let lhs = self.evaluate(left, env);
        let rhs = self.evaluate(right, env);

        match op {
            BinaryOperator::Or => Ok(Value::from(lhs.as_bool() || rhs.as_bool())),
            BinaryOperator::And => Ok(Value::from(lhs.as_bool() && rhs.as_bool())),

            BinaryOperator::Equal => Ok(Value::from(lhs.equals(&rhs)?)),
            BinaryOperator::NotEqual => Ok(Value::from(!lhs.equals(&rhs)?)),
            BinaryOperator::LessThan => Ok(Value::from(lhs.compare(&rhs)? == Ordering::Less)),
            BinaryOperator::GreaterThan => {
                Ok(Value::from(lhs.compare(&rhs)? == Ordering::Greater))
            }
            BinaryOperator::LessEqual => {
                Ok(Value::from(lhs.compare(&rhs)? != Ordering::Greater))
            }
            BinaryOperator::GreaterEqual => Ok(Value::from(lhs.compare(&rhs)? != Ordering::Less)),

            BinaryOperator::Add => lhs.add(&rhs),
            BinaryOperator::Subtract => lhs.sub(&rhs),
            BinaryOperator::Multiply => lhs.mul(&rhs),
            BinaryOperator::Divide => lhs.div(&rhs),
            BinaryOperator::Modulo => lhs.rem(&rhs),
            BinaryOperator::Power => lhs.pow(&rhs),
            BinaryOperator::Dice => self.roll_dice(lhs.as_int()?, rhs.as_int()?),
        }
    }

    fn eval_dot(
        &self,
        left: &Expression,
        right: &Expression,
        env: &dyn Environment,
    ) -> EvalResult<Value> {
        let target = self.evaluate(left, env);

        // Lists are indexed by the right side, evaluated where we are.
        if target.is_list() {
            let index = self.evaluate(right, env).as_int()?;
            return target.element(index);
        }

        let object = target.as_environment()?;
        Ok(self.evaluate(right, object.as_ref()))
    }

    /// Sums `count` uniform rolls in `1..=faces`. Non-positive counts or
    /// faces roll nothing.
    fn roll_dice(&self, count: i64, faces: i64) -> EvalResult<Value> {
        if count > self.limits.max_dice_rolls {
            return Err(EvalError::TooManyDice {
                requested: count,
                limit: self.limits.max_dice_rolls,
            });
        }
        if count <= 0 || faces <= 0 {
            return Ok(Value::Integer(0));
        }

        let mut rng = self.rng.borrow_mut();
        let mut total: i64 = 0;
        for _ in 0..count {
            let roll = rng.gen_range(1..=faces);
            total = total
                .checked_add(roll)
                .ok_or(EvalError::Overflow { op: "d" })?;
        }
        Ok(Value::Integer(total))
    }

    pub(crate) fn alloc_list(&self, items: Vec<Value>) -> Value {
        self.scope.alloc_list(items)
    }

    pub(crate) fn eval_int(&self, expr: &Expression, env: &dyn Environment) -> EvalResult<i64> {
        self.evaluate(expr, env).as_int()
    }

    /// Evaluates `expr` with a list element as its environment. Elements that
    /// are not environments are exposed as `value`, layered over `env`.
    pub(crate) fn eval_for_element(
        &self,
        expr: &Expression,
        element: &Value,
        env: &dyn Environment,
    ) -> Value {
        match element {
            Value::Environment(object) => self.evaluate(expr, object.as_ref()),
            other => {
                let scoped = MapEnvironment::with_fallback(env).with("value", other.clone());
                self.evaluate(expr, &scoped)
            }
        }
    }
}

/// The environment seen by the body of a where expression.
/// Bound names are evaluated against the outer environment on first lookup
/// and cached; other names fall through to the outer environment.
struct WhereEnvironment<'e, 's> {
    evaluator: &'e Evaluator<'s>,
    outer: &'e dyn Environment,
    bindings: &'e [WhereBinding],
    cache: Vec<OnceCell<Value>>,
}

impl<'e, 's> WhereEnvironment<'e, 's> {
    fn new(
        evaluator: &'e Evaluator<'s>,
        outer: &'e dyn Environment,
        bindings: &'e [WhereBinding],
    ) -> Self {
        WhereEnvironment {
            evaluator,
            outer,
            bindings,
            cache: bindings.iter().map(|_| OnceCell::new()).collect(),
        }
    }
}

impl Environment for WhereEnvironment<'_, '_> {
    fn query(&self, key: &str) -> Value {
        let slot = self
            .bindings
            .iter()
            .zip(self.cache.iter())
            .find(|(binding, _)| binding.name == key);

        match slot {
            Some((binding, cached)) => cached
                .get_or_init(|| self.evaluator.evaluate(&binding.value, self.outer))
                .clone(),
            None => self.outer.query(key),
        }
    }

    fn set(&self, key: &str, value: Value) -> EvalResult<()> {
        if self.bindings.iter().any(|binding| binding.name == key) {
            return Err(EvalError::ReadOnly {
                key: key.to_string(),
            });
        }
        self.outer.set(key, value)
    }

    fn inputs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.iter().map(|b| b.name.clone()).collect();
        for name in self.outer.inputs() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::NullEnvironment;
    use formula_parser::parse;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn eval_with(source: &str, env: &dyn Environment) -> (Value, Vec<EvalError>) {
        let expr = parse(source).unwrap();
        let scope = EvalScope::new();
        let mut rng = StdRng::seed_from_u64(7);
        let evaluator = Evaluator::new(&scope, &mut rng, Limits::default());
        let value = evaluator.evaluate(&expr, env);
        (value, evaluator.into_diagnostics())
    }

    fn eval(source: &str) -> Value {
        eval_with(source, &NullEnvironment).0
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("2+3^3"), Value::Integer(29));
        assert_eq!(eval("2*3^3+2"), Value::Integer(56));
        assert_eq!(eval("(2+3)*4"), Value::Integer(20));
        assert_eq!(eval("17 % 5"), Value::Integer(2));
    }

    #[test]
    fn test_leftmost_split_nests_to_the_right() {
        // 10 - (4 - 3)
        assert_eq!(eval("10-4-3"), Value::Integer(9));
        // -(5 + 3)
        assert_eq!(eval("-5+3"), Value::Integer(-8));
        assert_eq!(eval("2 * -3"), Value::Integer(-6));
    }

    #[test]
    fn test_logic_yields_zero_or_one() {
        assert_eq!(eval("3 and 4"), Value::Integer(1));
        assert_eq!(eval("0 or 0"), Value::Integer(0));
        assert_eq!(eval("not 0"), Value::Integer(1));
        assert_eq!(eval("not 'text'"), Value::Integer(0));
        assert_eq!(eval("1 and not 0"), Value::Integer(1));
    }

    #[test]
    fn test_and_evaluates_both_sides() {
        let (value, errors) = eval_with("0 and (1/0)", &NullEnvironment);
        assert_eq!(value, Value::Integer(0));
        assert_eq!(errors, vec![EvalError::DivisionByZero]);
    }

    #[test]
    fn test_failed_node_becomes_null_locally() {
        let (value, errors) = eval_with("5 + (1/0)", &NullEnvironment);
        assert_eq!(value, Value::Integer(5));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_identifiers_and_member_access() {
        let stats = MapEnvironment::new().with("strength", 15);
        let env = MapEnvironment::new().with("char", Value::from_environment(stats));
        assert_eq!(eval_with("char.strength * 2", &env).0, Value::Integer(30));
        assert_eq!(eval_with("char.missing", &env).0, Value::Null);
    }

    #[test]
    fn test_dot_on_list_indexes() {
        let env = MapEnvironment::new().with("i", 2);
        assert_eq!(eval_with("[10, 20, 30].i", &env).0, Value::Integer(30));
        let (value, errors) = eval_with("[10].5", &env);
        assert_eq!(value, Value::Null);
        assert_eq!(errors, vec![EvalError::IndexOutOfRange { index: 5, len: 1 }]);
    }

    #[test]
    fn test_dot_on_integer_is_an_error() {
        let (value, errors) = eval_with("(5).x", &NullEnvironment);
        assert_eq!(value, Value::Null);
        assert_eq!(errors, vec![EvalError::NotAnEnvironment { found: "integer" }]);
    }

    #[test]
    fn test_where_bindings() {
        assert_eq!(eval("x*5 where x=1"), Value::Integer(5));
        assert_eq!(eval("x*(a*b where a=2,b=1) where x=5"), Value::Integer(10));
    }

    #[test]
    fn test_where_binding_sees_outer_environment_only() {
        let env = MapEnvironment::new().with("a", 100);
        // b's `a` is the outer one, not the sibling binding
        assert_eq!(eval_with("b where a = 1, b = a + 1", &env).0, Value::Integer(101));
    }

    #[test]
    fn test_where_binding_is_memoized() {
        for _ in 0..20 {
            let value = eval("x - x where x = 1d1000").as_int().unwrap();
            assert_eq!(value, 0);
        }
    }

    #[test]
    fn test_dice_stay_in_range() {
        for _ in 0..100 {
            let roll = eval("3d6").as_int().unwrap();
            assert!((3..=18).contains(&roll));
        }
        assert_eq!(eval("0d6"), Value::Integer(0));
        assert_eq!(eval("3d0"), Value::Integer(0));
    }

    #[test]
    fn test_dice_limit() {
        let (value, errors) = eval_with("5000d6", &NullEnvironment);
        assert_eq!(value, Value::Null);
        assert_eq!(
            errors,
            vec![EvalError::TooManyDice {
                requested: 5000,
                limit: 1000
            }]
        );
    }

    #[test]
    fn test_eval_depth_limit() {
        let expr = parse("1 + 1").unwrap();
        let scope = EvalScope::new();
        let mut rng = StdRng::seed_from_u64(1);
        let limits = Limits {
            max_eval_depth: 1,
            ..Limits::default()
        };
        let evaluator = Evaluator::new(&scope, &mut rng, limits);

        // Both operands sit below the limit and recover to Null
        assert_eq!(evaluator.evaluate(&expr, &NullEnvironment), Value::Integer(0));
        assert_eq!(
            evaluator.into_diagnostics(),
            vec![EvalError::TooDeep { limit: 1 }, EvalError::TooDeep { limit: 1 }]
        );
    }

    #[test]
    fn test_mixed_comparison_recovers() {
        let (value, errors) = eval_with("'a' < 3", &NullEnvironment);
        assert_eq!(value, Value::Null);
        assert_eq!(
            errors,
            vec![EvalError::Incomparable {
                left: "string",
                right: "integer"
            }]
        );
    }

    #[test]
    fn test_interpolated_string() {
        let env = MapEnvironment::new().with("name", "Hero").with("level", 3);
        assert_eq!(
            eval_with("'Hello {name}, level {level*2}'", &env).0,
            Value::from("Hello Hero, level 6")
        );
        assert_eq!(eval_with("'{level}{level}!'", &env).0, Value::from("33!"));
        assert_eq!(eval_with("'no {closing'", &env).0, Value::from("no {closing"));
    }

    #[test]
    fn test_failed_substitution_renders_null() {
        let (value, errors) = eval_with("'hp: {1/0}'", &NullEnvironment);
        assert_eq!(value, Value::from("hp: null"));
        assert_eq!(errors, vec![EvalError::DivisionByZero]);
    }

    #[test]
    fn test_hand_built_substitution_offset_is_checked() {
        let expr = Expression::Interpolated {
            text: "ab".to_string(),
            substitutions: vec![Substitution {
                pos: 9,
                expr: Expression::Integer(1),
            }],
        };
        let scope = EvalScope::new();
        let mut rng = StdRng::seed_from_u64(1);
        let evaluator = Evaluator::new(&scope, &mut rng, Limits::default());
        assert_eq!(evaluator.evaluate(&expr, &NullEnvironment), Value::Null);
        assert_eq!(
            evaluator.into_diagnostics(),
            vec![EvalError::IndexOutOfRange { index: 9, len: 2 }]
        );
    }

    #[test]
    fn test_string_and_list_literals_use_scope() {
        let expr = parse("['a', 'b', [1]]").unwrap();
        let scope = EvalScope::new();
        let mut rng = StdRng::seed_from_u64(1);
        let value = Evaluator::new(&scope, &mut rng, Limits::default())
            .evaluate(&expr, &NullEnvironment);
        assert_eq!(scope.allocation_count(), 4);
        assert_eq!(value.to_string(), "a, b, 1");
    }
}
