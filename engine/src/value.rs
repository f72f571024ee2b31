//! FILENAME: engine/src/value.rs
//! PURPOSE: The dynamically-typed runtime value produced by every formula node.
//! CONTEXT: Strings and lists are reference-counted, so cloning a Value never
//! deep-copies. Environment values are shared handles to host objects and are
//! what makes `char.strength` and lists of party members work.
//!
//! TYPE RULES:
//! - Arithmetic: Integer with Integer (Null counts as 0)
//! - Ordering: Integer/Integer, String/String, List/List
//! - Equality: as ordering, plus Environment identity and Null/Null
//! - Truthiness: only Null and Integer 0 are false

use crate::environment::{Environment, NullEnvironment};
use crate::error::{EvalError, EvalResult};
use crate::formula::Formula;
use formula_parser::BinaryOperator;
use serde::ser::{Error as _, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Value {
    Null,
    Integer(i64),
    String(Rc<str>),
    List(Rc<Vec<Value>>),
    Environment(Rc<dyn Environment>),
}

impl Value {
    /// Wraps a host object so formulas can access its members.
    pub fn from_environment<E: Environment + 'static>(env: E) -> Value {
        Value::Environment(Rc::new(env))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Environment(_) => "environment",
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// C-like truthiness: Null and 0 are false, everything else is true.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(n) => *n != 0,
            _ => true,
        }
    }

    pub fn as_int(&self) -> EvalResult<i64> {
        self.numeric().ok_or(EvalError::TypeMismatch {
            expected: "integer",
            found: self.type_name(),
        })
    }

    pub fn as_str(&self) -> EvalResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(EvalError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_environment(&self) -> EvalResult<&Rc<dyn Environment>> {
        match self {
            Value::Environment(env) => Ok(env),
            other => Err(EvalError::NotAnEnvironment {
                found: other.type_name(),
            }),
        }
    }

    /// The elements of a list. A lone environment behaves as a
    /// one-element list so list functions accept a single object.
    pub fn elements(&self) -> EvalResult<&[Value]> {
        match self {
            Value::List(items) => Ok(items.as_slice()),
            Value::Environment(_) => Ok(std::slice::from_ref(self)),
            other => Err(EvalError::TypeMismatch {
                expected: "list",
                found: other.type_name(),
            }),
        }
    }

    pub fn num_elements(&self) -> EvalResult<usize> {
        self.elements().map(<[Value]>::len)
    }

    pub fn element(&self, index: i64) -> EvalResult<Value> {
        let items = self.elements()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or(EvalError::IndexOutOfRange {
                index,
                len: items.len(),
            })
    }

    fn numeric(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Null => Some(0),
            _ => None,
        }
    }

    fn integers(&self, other: &Value, op: BinaryOperator) -> EvalResult<(i64, i64)> {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(EvalError::IncompatibleOperands {
                op,
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }

    pub fn add(&self, other: &Value) -> EvalResult<Value> {
        let (a, b) = self.integers(other, BinaryOperator::Add)?;
        checked(a.checked_add(b), "+")
    }

    pub fn sub(&self, other: &Value) -> EvalResult<Value> {
        let (a, b) = self.integers(other, BinaryOperator::Subtract)?;
        checked(a.checked_sub(b), "-")
    }

    pub fn mul(&self, other: &Value) -> EvalResult<Value> {
        let (a, b) = self.integers(other, BinaryOperator::Multiply)?;
        checked(a.checked_mul(b), "*")
    }

    /// Integer division, truncating toward zero.
    pub fn div(&self, other: &Value) -> EvalResult<Value> {
        let (a, b) = self.integers(other, BinaryOperator::Divide)?;
        if b == 0 {
            return Err(EvalError::DivisionByZero);
        }
        checked(a.checked_div(b), "/")
    }

    pub fn rem(&self, other: &Value) -> EvalResult<Value> {
        let (a, b) = self.integers(other, BinaryOperator::Modulo)?;
        if b == 0 {
            return Err(EvalError::DivisionByZero);
        }
        checked(a.checked_rem(b), "%")
    }

    /// Integer power. Negative exponents truncate the real result toward
    /// zero, which leaves only the bases 1 and -1 non-zero.
    pub fn pow(&self, other: &Value) -> EvalResult<Value> {
        let (base, exp) = self.integers(other, BinaryOperator::Power)?;
        let odd = exp % 2 != 0;

        match base {
            0 if exp < 0 => Err(EvalError::DivisionByZero),
            1 => Ok(Value::Integer(1)),
            -1 => Ok(Value::Integer(if odd { -1 } else { 1 })),
            _ if exp < 0 => Ok(Value::Integer(0)),
            0 => Ok(Value::Integer(if exp == 0 { 1 } else { 0 })),
            _ => {
                let exp = u32::try_from(exp).map_err(|_| EvalError::Overflow { op: "^" })?;
                checked(base.checked_pow(exp), "^")
            }
        }
    }

    pub fn neg(&self) -> EvalResult<Value> {
        let n = self.as_int()?;
        checked(n.checked_neg(), "-")
    }

    /// Orders two values of compatible kinds.
    pub fn compare(&self, other: &Value) -> EvalResult<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => Err(EvalError::Incomparable {
                    left: self.type_name(),
                    right: other.type_name(),
                }),
            },
        }
    }

    /// Equality as the `=` operator sees it.
    pub fn equals(&self, other: &Value) -> EvalResult<bool> {
        match (self, other) {
            (Value::Environment(a), Value::Environment(b)) => Ok(same_environment(a, b)),
            (Value::Null, Value::Null) => Ok(true),
            _ => Ok(self.compare(other)? == Ordering::Equal),
        }
    }

    /// Renders the value as formula source that evaluates back to an equal value.
    pub fn to_formula_literal(&self) -> EvalResult<String> {
        let mut out = String::new();
        self.write_literal(&mut out)?;
        Ok(out)
    }

    fn write_literal(&self, out: &mut String) -> EvalResult<()> {
        match self {
            // Null is numerically zero
            Value::Null => out.push('0'),
            // The magnitude of i64::MIN is not a valid literal on its own
            Value::Integer(i64::MIN) => out.push_str("(-9223372036854775807)-1"),
            Value::Integer(n) => out.push_str(&n.to_string()),
            Value::String(s) => push_quoted(out, s, false),
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_literal(out)?;
                }
                out.push(']');
            }
            Value::Environment(_) => {
                return Err(EvalError::NotSerializable {
                    found: self.type_name(),
                })
            }
        }
        Ok(())
    }

    /// Reads back text produced by `to_formula_literal`.
    pub fn from_formula_literal(text: &str) -> EvalResult<Value> {
        Formula::new(text)?.try_execute(&NullEnvironment)
    }
}

/// Appends `text` as a single-quoted literal, escaping quotes and
/// backslashes. Braces are escaped too unless `interpolate` keeps them as
/// `{expr}` substitutions.
pub(crate) fn push_quoted(out: &mut String, text: &str, interpolate: bool) {
    out.push('\'');
    for ch in text.chars() {
        let brace = ch == '{' || ch == '}';
        if ch == '\'' || ch == '\\' || (brace && !interpolate) {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
}

fn checked(result: Option<i64>, op: &'static str) -> EvalResult<Value> {
    result.map(Value::Integer).ok_or(EvalError::Overflow { op })
}

fn same_environment(a: &Rc<dyn Environment>, b: &Rc<dyn Environment>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

/// Structural equality. Unlike `equals`, Null and Integer(0) differ here.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Environment(a), Value::Environment(b)) => same_environment(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Integer(n) => f.debug_tuple("Integer").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(&&**s).finish(),
            Value::List(items) => f.debug_tuple("List").field(&**items).finish(),
            Value::Environment(env) => f
                .debug_tuple("Environment")
                .field(&Rc::as_ptr(env))
                .finish(),
        }
    }
}

/// Human-readable text: integers in decimal, strings raw, lists joined by ", ".
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Environment(_) => write!(f, "(object)"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Environment(_) => Err(S::Error::custom(
                "environment values cannot be serialized",
            )),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(if b { 1 } else { 0 })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }
}

impl From<Rc<dyn Environment>> for Value {
    fn from(env: Rc<dyn Environment>) -> Self {
        Value::Environment(env)
    }
}
