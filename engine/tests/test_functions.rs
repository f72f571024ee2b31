//! FILENAME: tests/test_functions.rs
//! Integration tests for the built-in function library.

mod common;

use common::{hero, party};
use formula_engine::{EvalError, Formula, NullEnvironment, Value};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn run(source: &str) -> Value {
    Formula::new(source).unwrap().execute(&party())
}

fn ints(values: &[i64]) -> Value {
    Value::from(values.iter().map(|n| Value::Integer(*n)).collect::<Vec<_>>())
}

// ============================================================================
// ARITHMETIC FUNCTIONS
// ============================================================================

#[test]
fn test_abs_min_max() {
    assert_eq!(run("abs(-5)"), Value::Integer(5));
    assert_eq!(run("abs(5)"), Value::Integer(5));
    assert_eq!(run("min(3,5)"), Value::Integer(3));
    assert_eq!(run("max(3,5)"), Value::Integer(5));
}

#[test]
fn test_min_max_flatten_lists() {
    assert_eq!(run("min([4, 2], 3)"), Value::Integer(2));
    assert_eq!(run("max([4, 9], [1], 7)"), Value::Integer(9));
    assert_eq!(run("max(['apple', 'pear'])"), Value::from("pear"));
    assert_eq!(run("max([])"), Value::Null);
}

#[test]
fn test_min_max_skip_non_integer_arguments() {
    assert_eq!(run("min(2, 'a', 1)"), Value::Integer(1));
    assert_eq!(run("max('a', 4, char, 6)"), Value::Integer(6));
    assert_eq!(run("max('apple', 'pear')"), Value::Null);
    assert_eq!(
        Formula::new("min(nothing, 3)")
            .unwrap()
            .try_execute(&NullEnvironment),
        Ok(Value::Integer(3))
    );
}

#[test]
fn test_if_evaluates_one_branch() {
    let formula = Formula::new("if(0, 1/0, 2)").unwrap();
    assert_eq!(formula.try_execute(&NullEnvironment), Ok(Value::Integer(2)));

    let formula = Formula::new("if('', 'yes', 'no')").unwrap();
    assert_eq!(formula.execute_default(), Value::from("yes"));
}

// ============================================================================
// LIST FUNCTIONS
// ============================================================================

#[test]
fn test_choose_picks_first_maximum() {
    assert_eq!(run("choose(members, strength).name"), Value::from("Bryn"));
    // Every member scores the same, so the first one wins
    assert_eq!(run("choose(members, 1).name"), Value::from("Arne"));
    assert_eq!(run("choose([], 1)"), Value::Null);
}

#[test]
fn test_filter_keeps_order() {
    assert_eq!(
        run("map(filter(members, strength > 13), name)").to_string(),
        "Bryn, Cale"
    );
    assert_eq!(run("size(filter(members, strength > 20))"), Value::Integer(0));
}

#[test]
fn test_filter_plain_values() {
    assert_eq!(run("filter([1, 2, 3, 4], value > 2)"), ints(&[3, 4]));
}

#[test]
fn test_find() {
    assert_eq!(run("find(members, strength > 13).name"), Value::from("Bryn"));
    assert_eq!(run("find(members, strength > 20)"), Value::Null);
}

#[test]
fn test_map_and_sum() {
    assert_eq!(run("map(members, strength)"), ints(&[12, 16, 14]));
    assert_eq!(run("sum(map(members, strength))"), Value::Integer(42));
    assert_eq!(run("sum([])"), Value::Integer(0));
}

#[test]
fn test_sort() {
    assert_eq!(run("sort([3, 1, 2])"), ints(&[1, 2, 3]));
    assert_eq!(run("sort(map(members, strength), a > b)"), ints(&[16, 14, 12]));
    assert_eq!(
        run("map(sort(members, a.strength > b.strength), name)").to_string(),
        "Bryn, Cale, Arne"
    );
}

#[test]
fn test_sort_predicate_sees_outer_names() {
    let formula = Formula::new("sort([5, 1, 4], abs(a - pivot) < abs(b - pivot)) where pivot = 3").unwrap();
    assert_eq!(formula.execute_default(), ints(&[4, 5, 1]));
}

#[test]
fn test_head_and_size() {
    assert_eq!(run("head(sort([3, 1, 2]))"), Value::Integer(1));
    assert_eq!(run("size(members)"), Value::Integer(3));
    assert_eq!(run("size(char)"), Value::Integer(1));

    let formula = Formula::new("head([])").unwrap();
    assert_eq!(
        formula.try_execute(&NullEnvironment),
        Err(EvalError::IndexOutOfRange { index: 0, len: 0 })
    );
}

#[test]
fn test_list_function_on_non_list() {
    let formula = Formula::new("size(strength)").unwrap();
    assert_eq!(formula.execute(&hero()), Value::Null);
    assert_eq!(
        formula.try_execute(&hero()),
        Err(EvalError::TypeMismatch {
            expected: "list",
            found: "integer"
        })
    );
}

// ============================================================================
// COLOR FUNCTIONS
// ============================================================================

#[test]
fn test_rgb_packs_and_clamps() {
    assert_eq!(run("rgb(10, 20, 30)"), Value::Integer(102030));
    assert_eq!(run("rgb(120, -5, 50)"), Value::Integer(990050));
}

#[test]
fn test_transition() {
    assert_eq!(run("transition(15, 10, 0, 20, 100)"), Value::Integer(50));
    assert_eq!(run("transition(10, 10, 7, 20, 100)"), Value::Integer(7));
    assert_eq!(run("transition(25, 10, 0, 20, 100)"), Value::Integer(0));
}

#[test]
fn test_transition_skips_endpoints_out_of_range() {
    // val1 would fail, but value is outside the range
    let formula = Formula::new("transition(50, 10, 1/0, 20, 100)").unwrap();
    assert_eq!(formula.try_execute(&NullEnvironment), Ok(Value::Integer(0)));
}

#[test]
fn test_color_transition_single_segment() {
    assert_eq!(
        run("color_transition(50, 0, rgb(0,0,0), 100, rgb(99,99,99))"),
        Value::Integer(494949)
    );
}

#[test]
fn test_color_transition_picks_enclosing_segment() {
    let formula = "color_transition(v, 0, 0, 100, rgb(99,0,0), 200, rgb(0,0,99)) where v = ";
    let at = |v: i64| run(&format!("{}{}", formula, v));

    assert_eq!(at(100), Value::Integer(990000));
    assert_eq!(at(150), Value::Integer(490049));
    assert_eq!(at(200), Value::Integer(99));
    assert_eq!(at(300), Value::Integer(0));
}

#[test]
fn test_color_transition_trailing_point_is_its_own_color() {
    let formula = "color_transition(v, 0, rgb(20,40,60), 10) where v = ";
    let at = |v: i64| run(&format!("{}{}", formula, v));

    // The second color is the point value 10, i.e. rgb(0,0,10)
    assert_eq!(at(0), Value::Integer(204060));
    assert_eq!(at(5), Value::Integer(102035));
    assert_eq!(at(10), Value::Integer(10));
    assert_eq!(at(11), Value::Integer(0));
}
