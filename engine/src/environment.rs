//! FILENAME: engine/src/environment.rs
//! PURPOSE: The name-lookup seam between formulas and the host game.
//! CONTEXT: Every identifier in a formula resolves through an Environment.
//! Hosts implement the trait for their own objects (characters, units, the
//! party); the engine supplies a map-backed implementation for scratch
//! bindings and tests, and an empty one for constant formulas.

use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// A provider of named values.
///
/// `query` never fails: unknown names resolve to `Value::Null`. Writing is
/// optional and refused by default.
pub trait Environment {
    fn query(&self, key: &str) -> Value;

    fn set(&self, key: &str, _value: Value) -> EvalResult<()> {
        Err(EvalError::ReadOnly {
            key: key.to_string(),
        })
    }

    /// Names this environment knows about, for tooling and error messages.
    fn inputs(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Resolves every name to Null.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEnvironment;

impl Environment for NullEnvironment {
    fn query(&self, _key: &str) -> Value {
        Value::Null
    }
}

/// A writable environment backed by a hash map, optionally layered over
/// another environment that answers the names it does not hold.
#[derive(Default)]
pub struct MapEnvironment<'a> {
    values: RefCell<FxHashMap<String, Value>>,
    fallback: Option<&'a dyn Environment>,
}

impl<'a> MapEnvironment<'a> {
    pub fn new() -> Self {
        MapEnvironment {
            values: RefCell::new(FxHashMap::default()),
            fallback: None,
        }
    }

    pub fn with_fallback(fallback: &'a dyn Environment) -> Self {
        MapEnvironment {
            values: RefCell::new(FxHashMap::default()),
            fallback: Some(fallback),
        }
    }

    /// Builder-style insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.borrow_mut().insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }
}

impl Environment for MapEnvironment<'_> {
    fn query(&self, key: &str) -> Value {
        if let Some(value) = self.values.borrow().get(key) {
            return value.clone();
        }
        match self.fallback {
            Some(fallback) => fallback.query(key),
            None => Value::Null,
        }
    }

    fn set(&self, key: &str, value: Value) -> EvalResult<()> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn inputs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.borrow().keys().cloned().collect();
        if let Some(fallback) = self.fallback {
            for name in fallback.inputs() {
                if !self.contains(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        names
    }
}
