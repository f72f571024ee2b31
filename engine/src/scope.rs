//! FILENAME: engine/src/scope.rs
//! PURPOSE: Evaluation-scoped tracking of the strings and lists a formula creates.
//! CONTEXT: Each top-level evaluation owns one EvalScope. Literal strings and
//! lists built during the evaluation are registered here; when the evaluation
//! ends the scope is swept, dropping its strong references. Values the caller
//! kept (the result, anything stored into a host environment) stay alive
//! through their own reference counts, everything else is released.
//!
//! The scope is passed explicitly to the evaluator. There is no global
//! registry, so concurrent evaluations on different threads never share one.

use crate::value::Value;
use log::trace;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Default)]
pub struct EvalScope {
    strings: RefCell<Vec<Rc<str>>>,
    lists: RefCell<Vec<Rc<Vec<Value>>>>,
}

/// What a sweep found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub strings_released: usize,
    pub strings_retained: usize,
    pub lists_released: usize,
    pub lists_retained: usize,
}

impl SweepStats {
    pub fn released(&self) -> usize {
        self.strings_released + self.lists_released
    }

    pub fn retained(&self) -> usize {
        self.strings_retained + self.lists_retained
    }
}

impl EvalScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_string(&self, text: &str) -> Value {
        let rc: Rc<str> = Rc::from(text);
        self.strings.borrow_mut().push(Rc::clone(&rc));
        Value::String(rc)
    }

    pub fn alloc_list(&self, items: Vec<Value>) -> Value {
        let rc = Rc::new(items);
        self.lists.borrow_mut().push(Rc::clone(&rc));
        Value::List(rc)
    }

    /// Number of values registered since the scope was created.
    pub fn allocation_count(&self) -> usize {
        self.strings.borrow().len() + self.lists.borrow().len()
    }

    /// Ends the scope, releasing every registration and reporting how many
    /// of them are still referenced from outside.
    pub fn sweep(self) -> SweepStats {
        let strings: Vec<Weak<str>> = self
            .strings
            .into_inner()
            .into_iter()
            .map(|rc| Rc::downgrade(&rc))
            .collect();
        let lists: Vec<Weak<Vec<Value>>> = self
            .lists
            .into_inner()
            .into_iter()
            .map(|rc| Rc::downgrade(&rc))
            .collect();

        // The strong refs above are gone; only outside owners keep these alive.
        let strings_retained = strings.iter().filter(|w| w.strong_count() > 0).count();
        let lists_retained = lists.iter().filter(|w| w.strong_count() > 0).count();

        let stats = SweepStats {
            strings_released: strings.len() - strings_retained,
            strings_retained,
            lists_released: lists.len() - lists_retained,
            lists_retained,
        };
        trace!(
            "swept evaluation scope: {} released, {} retained",
            stats.released(),
            stats.retained()
        );
        stats
    }
}
