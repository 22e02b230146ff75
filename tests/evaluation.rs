//! End-to-end evaluation behavior
//!
//! Values, closures, strict left-to-right order, `when` dispatch, and the
//! runtime error kinds the evaluator produces on well-formed but
//! ill-behaved programs (reachable through `else`-opened rows).

use fun::eval::EvalError;
use fun::module::ProgramError;
use fun::{Program, Value, INLINE_MODULE};

fn eval(source: &str) -> Value {
    let mut program = Program::new();
    let module = program
        .run(source, INLINE_MODULE)
        .unwrap_or_else(|e| panic!("{} failed: {}", source, e));
    module.value.clone()
}

fn eval_err(source: &str) -> EvalError {
    let mut program = Program::new();
    match program.run(source, INLINE_MODULE) {
        Ok(module) => panic!("{} unexpectedly evaluated to {}", source, module),
        Err(ProgramError::Eval { source, .. }) => source,
        Err(other) => panic!("expected an eval error, got {}", other),
    }
}

// ============================================================================
// Literals and data
// ============================================================================

#[test]
fn literals_evaluate_to_themselves() {
    assert_eq!(eval("7").to_string(), "7");
    assert_eq!(eval("`hi`").to_string(), "hi");
}

#[test]
fn templates_concatenate_left_to_right() {
    assert_eq!(
        eval("(name = `world`; `hello {name}!`)").to_string(),
        "hello world!"
    );
    assert_eq!(eval("(a = `1`; b = `2`; `{a}{b}`)").to_string(), "12");
}

#[test]
fn records_print_sorted_and_lists_in_order() {
    assert_eq!(eval("{b: 2, a: 1}").to_string(), "{a: 1, b: 2}");
    assert_eq!(eval("[3, 1, 2]").to_string(), "[3, 1, 2]");
}

#[test]
fn projection_reaches_nested_values() {
    assert_eq!(eval("(r = {a: {b: 41}}; r.a.b + 1)").to_string(), "42");
}

#[test]
fn constructors_carry_their_payload() {
    assert_eq!(eval("Some {a: 1}").to_string(), "Some {a: 1}");
    assert_eq!(eval("None").to_string(), "None");
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn closures_capture_their_defining_environment() {
    let source = "(x = 1; add_x = \\y -> x + y; x = 10; add_x(5))";
    // add_x captured x = 1; the later rebinding is a new binding
    assert_eq!(eval(source).to_string(), "6");
}

#[test]
fn closures_print_opaquely() {
    assert_eq!(eval("\\x -> x").to_string(), "<closure>");
}

#[test]
fn lexical_scope_beats_call_site() {
    let source = "(y = 1; f = \\x -> x + y; g = \\y -> f(y); g(10))";
    assert_eq!(eval(source).to_string(), "11");
}

// ============================================================================
// when dispatch
// ============================================================================

#[test]
fn first_matching_clause_wins() {
    let source = "(x = Some 3; when x is Some v -> v; None _ -> 0)";
    assert_eq!(eval(source).to_string(), "3");
}

#[test]
fn else_catches_unmatched_constructors() {
    assert_eq!(eval("(when Some 1 is None _ -> 0; else 9)").to_string(), "9");
}

#[test]
fn unmatched_constructor_without_else_fails_at_runtime() {
    // the open scrutinee row typechecks against the closed clause row
    let error = eval_err("(when Some 1 is None _ -> 0)");
    assert!(matches!(error, EvalError::NoMatchingClause(name) if name == "Some"));
}

#[test]
fn nullary_payloads_bind_the_unit_record() {
    assert_eq!(eval("(when True is True u -> u)").to_string(), "{}");
}

// ============================================================================
// Recursion through fix
// ============================================================================

#[test]
fn fix_computes_factorial() {
    let source = "(
        mul = fix(\\m -> \\a, b -> when b == 0 is True _ -> 0; False _ -> a + m(a, b - 1));
        fact = fix(\\f -> \\n -> when n == 0 is True _ -> 1; False _ -> mul(n, f(n - 1)));
        fact(5)
    )";
    assert_eq!(eval(source).to_string(), "120");
}

#[test]
fn fix_countdown_terminates() {
    let source = "(count = fix(\\f -> \\n -> when n == 0 is True _ -> 0; False _ -> f(n - 1)); count(100))";
    assert_eq!(eval(source).to_string(), "0");
}

// ============================================================================
// Equality
// ============================================================================

#[test]
fn equality_is_structural_over_printed_forms() {
    assert_eq!(eval("{a: 1} == {a: 1}").to_string(), "True");
    assert_eq!(eval("[1, 2] == [1, 2]").to_string(), "True");
    assert_eq!(eval("[1, 2] == [2, 1]").to_string(), "False");
    assert_eq!(eval("(Some 1) == (Some 2)").to_string(), "False");
}
