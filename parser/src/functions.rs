//! FILENAME: parser/src/functions.rs
//! PURPOSE: The closed registry of built-in functions and their arities.
//! CONTEXT: Function names are resolved while parsing, so an unknown name or a
//! wrong argument count is a construction-time error rather than something the
//! evaluator has to cope with. The engine crate supplies the implementations.

use std::fmt;

/// Built-in functions resolved at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    // Control flow
    If,

    // Arithmetic
    Abs,
    Min,
    Max,

    // List functions
    Choose,
    Filter,
    Find,
    Map,
    Sort,
    Sum,
    Head,
    Size,

    // Color helpers
    Rgb,
    Transition,
    ColorTransition,
}

/// Accepted argument count for a function. `max: None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Arity { min: n, max: Some(n) }
    }

    const fn between(min: usize, max: usize) -> Self {
        Arity { min, max: Some(max) }
    }

    const fn at_least(min: usize) -> Self {
        Arity { min, max: None }
    }
}

impl BuiltinFunction {
    /// Every registered function, in registry order.
    pub const ALL: [BuiltinFunction; 15] = [
        BuiltinFunction::If,
        BuiltinFunction::Abs,
        BuiltinFunction::Min,
        BuiltinFunction::Max,
        BuiltinFunction::Choose,
        BuiltinFunction::Filter,
        BuiltinFunction::Find,
        BuiltinFunction::Map,
        BuiltinFunction::Sort,
        BuiltinFunction::Sum,
        BuiltinFunction::Head,
        BuiltinFunction::Size,
        BuiltinFunction::Rgb,
        BuiltinFunction::Transition,
        BuiltinFunction::ColorTransition,
    ];

    /// Looks up a function by its (case-sensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|func| func.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFunction::If => "if",
            BuiltinFunction::Abs => "abs",
            BuiltinFunction::Min => "min",
            BuiltinFunction::Max => "max",
            BuiltinFunction::Choose => "choose",
            BuiltinFunction::Filter => "filter",
            BuiltinFunction::Find => "find",
            BuiltinFunction::Map => "map",
            BuiltinFunction::Sort => "sort",
            BuiltinFunction::Sum => "sum",
            BuiltinFunction::Head => "head",
            BuiltinFunction::Size => "size",
            BuiltinFunction::Rgb => "rgb",
            BuiltinFunction::Transition => "transition",
            BuiltinFunction::ColorTransition => "color_transition",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            BuiltinFunction::If => Arity::exactly(3),
            BuiltinFunction::Abs => Arity::exactly(1),
            BuiltinFunction::Min | BuiltinFunction::Max => Arity::at_least(1),
            BuiltinFunction::Choose
            | BuiltinFunction::Filter
            | BuiltinFunction::Find
            | BuiltinFunction::Map => Arity::exactly(2),
            BuiltinFunction::Sort => Arity::between(1, 2),
            BuiltinFunction::Sum | BuiltinFunction::Head | BuiltinFunction::Size => {
                Arity::exactly(1)
            }
            BuiltinFunction::Rgb => Arity::exactly(3),
            BuiltinFunction::Transition => Arity::exactly(5),
            BuiltinFunction::ColorTransition => Arity::at_least(5),
        }
    }
}

impl fmt::Display for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
