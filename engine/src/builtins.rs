//! FILENAME: engine/src/builtins.rs
//! PURPOSE: Implementations of the built-in formula functions.
//! CONTEXT: Names and arities live in the parser's function registry and are
//! checked at parse time. Arguments arrive unevaluated so functions like `if`
//! evaluate only the branch they need, and list functions can evaluate an
//! expression once per element with that element as the environment.
//!
//! FUNCTIONS:
//! - Control: if
//! - Arithmetic: abs, min, max
//! - Lists: choose, filter, find, map, sort, sum, head, size
//! - Colors: rgb, transition, color_transition

use crate::environment::{Environment, MapEnvironment};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::value::Value;
use formula_parser::{BuiltinFunction, Expression};
use std::cmp::Ordering;

impl Evaluator<'_> {
    /// Evaluates a function call.
    pub(crate) fn eval_function(
        &self,
        func: BuiltinFunction,
        args: &[Expression],
        env: &dyn Environment,
    ) -> EvalResult<Value> {
        // Hand-built trees bypass the parser's arity check
        let arity = func.arity();
        if args.len() < arity.min || arity.max.is_some_and(|max| args.len() > max) {
            return Err(EvalError::WrongArgumentCount {
                function: func.name(),
                found: args.len(),
            });
        }

        match func {
            BuiltinFunction::If => self.fn_if(args, env),
            BuiltinFunction::Abs => self.fn_abs(args, env),
            BuiltinFunction::Min => self.fn_extreme(args, env, Ordering::Less),
            BuiltinFunction::Max => self.fn_extreme(args, env, Ordering::Greater),
            BuiltinFunction::Choose => self.fn_choose(args, env),
            BuiltinFunction::Filter => self.fn_filter(args, env),
            BuiltinFunction::Find => self.fn_find(args, env),
            BuiltinFunction::Map => self.fn_map(args, env),
            BuiltinFunction::Sort => self.fn_sort(args, env),
            BuiltinFunction::Sum => self.fn_sum(args, env),
            BuiltinFunction::Head => self.fn_head(args, env),
            BuiltinFunction::Size => self.fn_size(args, env),
            BuiltinFunction::Rgb => self.fn_rgb(args, env),
            BuiltinFunction::Transition => self.fn_transition(args, env),
            BuiltinFunction::ColorTransition => self.fn_color_transition(args, env),
        }
    }

    // ==================== Control ====================

    fn fn_if(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let branch = if self.evaluate(&args[0], env).as_bool() {
            &args[1]
        } else {
            &args[2]
        };
        Ok(self.evaluate(branch, env))
    }

    // ==================== Arithmetic ====================

    fn fn_abs(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let n = self.eval_int(&args[0], env)?;
        n.checked_abs()
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { op: "abs" })
    }

    /// min and max. List arguments are flattened one level and other
    /// non-integer arguments are skipped; the first of several equal
    /// extremes wins.
    fn fn_extreme(
        &self,
        args: &[Expression],
        env: &dyn Environment,
        wanted: Ordering,
    ) -> EvalResult<Value> {
        let mut best: Option<Value> = None;

        for arg in args {
            let value = self.evaluate(arg, env);
            let candidates = match &value {
                Value::List(items) => items.as_slice(),
                single if single.is_int() => std::slice::from_ref(single),
                _ => continue,
            };

            for candidate in candidates {
                let replace = match &best {
                    None => true,
                    Some(current) => candidate.compare(current)? == wanted,
                };
                if replace {
                    best = Some(candidate.clone());
                }
            }
        }

        Ok(best.unwrap_or(Value::Null))
    }

    // ==================== Lists ====================

    fn fn_choose(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        let mut best: Option<(Value, &Value)> = None;

        for element in list.elements()? {
            let score = self.eval_for_element(&args[1], element, env);
            let better = match &best {
                None => true,
                Some((top, _)) => score.compare(top)? == Ordering::Greater,
            };
            if better {
                best = Some((score, element));
            }
        }

        Ok(best.map_or(Value::Null, |(_, element)| element.clone()))
    }

    fn fn_filter(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        let mut kept = Vec::new();
        for element in list.elements()? {
            if self.eval_for_element(&args[1], element, env).as_bool() {
                kept.push(element.clone());
            }
        }
        Ok(self.alloc_list(kept))
    }

    fn fn_find(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        for element in list.elements()? {
            if self.eval_for_element(&args[1], element, env).as_bool() {
                return Ok(element.clone());
            }
        }
        Ok(Value::Null)
    }

    fn fn_map(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        let mapped = list
            .elements()?
            .iter()
            .map(|element| self.eval_for_element(&args[1], element, env))
            .collect();
        Ok(self.alloc_list(mapped))
    }

    /// Stable sort. With a second argument, that expression is the
    /// less-than test with the two elements bound as `a` and `b`.
    fn fn_sort(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        let mut items = list.elements()?.to_vec();

        match args.get(1) {
            None => insertion_sort(&mut items, |a, b| Ok(a.compare(b)? == Ordering::Less))?,
            Some(less_than) => insertion_sort(&mut items, |a, b| {
                let pair = MapEnvironment::with_fallback(env)
                    .with("a", a.clone())
                    .with("b", b.clone());
                Ok(self.evaluate(less_than, &pair).as_bool())
            })?,
        }

        Ok(self.alloc_list(items))
    }

    fn fn_sum(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        let items = list.elements()?;
        items
            .iter()
            .try_fold(Value::Integer(0), |total, item| total.add(item))
    }

    fn fn_head(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let list = self.evaluate(&args[0], env);
        let items = list.elements()?;
        items
            .first()
            .cloned()
            .ok_or(EvalError::IndexOutOfRange { index: 0, len: 0 })
    }

    fn fn_size(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let count = self.evaluate(&args[0], env).num_elements()?;
        i64::try_from(count)
            .map(Value::Integer)
            .map_err(|_| EvalError::Overflow { op: "size" })
    }

    // ==================== Colors ====================

    fn fn_rgb(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let r = self.eval_int(&args[0], env)?;
        let g = self.eval_int(&args[1], env)?;
        let b = self.eval_int(&args[2], env)?;
        Ok(Value::Integer(pack_rgb(r, g, b)))
    }

    /// transition(value, begin, val1, end, val2). The endpoint values are
    /// only evaluated when `value` lies within `[begin, end]`.
    fn fn_transition(&self, args: &[Expression], env: &dyn Environment) -> EvalResult<Value> {
        let value = self.eval_int(&args[0], env)?;
        let begin = self.eval_int(&args[1], env)?;
        let end = self.eval_int(&args[3], env)?;
        if value < begin || value > end {
            return Ok(Value::Integer(0));
        }

        let val1 = self.eval_int(&args[2], env)?;
        let val2 = self.eval_int(&args[4], env)?;
        transition(value, begin, val1, end, val2).map(Value::Integer)
    }

    /// color_transition(value, p1, c1, p2, c2, ...). Finds the first pair of
    /// consecutive points enclosing `value` and interpolates each channel of
    /// the two packed colors.
    fn fn_color_transition(
        &self,
        args: &[Expression],
        env: &dyn Environment,
    ) -> EvalResult<Value> {
        let value = self.eval_int(&args[0], env)?;
        let mut begin = self.eval_int(&args[1], env)?;
        let mut n = 3;

        let end = loop {
            let Some(point) = args.get(n) else {
                return Ok(Value::Integer(0));
            };
            let end = self.eval_int(point, env)?;
            if value >= begin && value <= end {
                break end;
            }
            begin = end;
            n += 2;
        };

        // A trailing point without a color reuses the point's own value
        let from = self.eval_int(&args[n - 1], env)?;
        let to = self.eval_int(args.get(n + 1).unwrap_or(&args[n]), env)?;

        let (r1, g1, b1) = unpack_rgb(from);
        let (r2, g2, b2) = unpack_rgb(to);
        Ok(Value::Integer(pack_rgb(
            transition(value, begin, r1, end, r2)?,
            transition(value, begin, g1, end, g2)?,
            transition(value, begin, b1, end, b2)?,
        )))
    }
}

/// Linear interpolation between `(begin, val1)` and `(end, val2)`, with
/// integer division. Values outside `[begin, end]` give 0.
pub fn transition(value: i64, begin: i64, val1: i64, end: i64, val2: i64) -> EvalResult<i64> {
    if value < begin || value > end {
        return Ok(0);
    }
    if value == begin {
        return Ok(val1);
    }
    if value == end {
        return Ok(val2);
    }

    let overflow = || EvalError::Overflow { op: "transition" };
    // Both partial distances are bounded by the span
    let span = end.checked_sub(begin).ok_or_else(overflow)?;
    let near = val1.checked_mul(end - value).ok_or_else(overflow)?;
    let far = val2.checked_mul(value - begin).ok_or_else(overflow)?;
    let total = near.checked_add(far).ok_or_else(overflow)?;
    Ok(total / span)
}

/// Packs three channels, each clamped to 0..=99, as `r*10000 + g*100 + b`.
pub fn pack_rgb(r: i64, g: i64, b: i64) -> i64 {
    r.clamp(0, 99) * 10_000 + g.clamp(0, 99) * 100 + b.clamp(0, 99)
}

fn unpack_rgb(color: i64) -> (i64, i64, i64) {
    ((color / 10_000) % 100, (color / 100) % 100, color % 100)
}

/// Stable insertion sort driven by a fallible less-than test. An
/// inconsistent test yields some permutation rather than a panic.
fn insertion_sort<F>(items: &mut [Value], mut less: F) -> EvalResult<()>
where
    F: FnMut(&Value, &Value) -> EvalResult<bool>,
{
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && less(&items[j], &items[j - 1])? {
            items.swap(j, j - 1);
            j -= 1;
        }
    }
    Ok(())
}
