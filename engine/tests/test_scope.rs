//! FILENAME: tests/test_scope.rs
//! Integration tests for the evaluation-scoped allocator as seen through Formula.

mod common;

use common::party;
use formula_engine::{Formula, NullEnvironment, SweepStats, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sweep_of(source: &str) -> (Value, SweepStats) {
    let mut rng = StdRng::seed_from_u64(3);
    let evaluation = Formula::new(source)
        .unwrap()
        .evaluate(&party(), &mut rng);
    assert!(evaluation.is_clean(), "{:?}", evaluation.diagnostics);
    (evaluation.value, evaluation.sweep)
}

#[test]
fn test_integer_result_allocates_nothing() {
    let (value, sweep) = sweep_of("1 + 2");
    assert_eq!(value, Value::Integer(3));
    assert_eq!(sweep, SweepStats::default());
}

#[test]
fn test_returned_string_is_retained() {
    let (value, sweep) = sweep_of("'abc'");
    assert_eq!(value, Value::from("abc"));
    assert_eq!(sweep.strings_retained, 1);
    assert_eq!(sweep.released(), 0);
}

#[test]
fn test_intermediates_are_released() {
    let (value, sweep) = sweep_of("size(['a', 'b', 'c'])");
    assert_eq!(value, Value::Integer(3));
    assert_eq!(sweep.strings_released, 3);
    assert_eq!(sweep.lists_released, 1);
    assert_eq!(sweep.retained(), 0);
}

#[test]
fn test_nested_result_keeps_its_contents() {
    let (value, sweep) = sweep_of("head([['x'], 'y'])");
    assert_eq!(value.to_string(), "x");
    assert_eq!(sweep.retained(), 2);
    assert_eq!(sweep.released(), 2);
}

#[test]
fn test_list_function_results_share_the_outer_scope() {
    // The literal is garbage once filter has copied what it keeps
    let (value, sweep) = sweep_of("filter([1, 2, 3], value > 1)");
    assert_eq!(value.to_string(), "2, 3");
    assert_eq!(sweep.lists_released, 1);
    assert_eq!(sweep.lists_retained, 1);
}

#[test]
fn test_each_evaluation_gets_a_fresh_scope() {
    let formula = Formula::new("['a', 'b']").unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let first = formula.evaluate(&NullEnvironment, &mut rng);
    let second = formula.evaluate(&NullEnvironment, &mut rng);
    assert_eq!(first.sweep, second.sweep);
    assert_eq!(first.sweep.retained(), 3);
}
