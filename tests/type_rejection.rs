//! Programs the type checker must reject
//!
//! Checks both the error kind and, where the message is part of the
//! stable surface (pretty-printed types in mismatches), its content.

use fun::infer::TypeError;
use fun::module::ProgramError;
use fun::parser::ParseError;
use fun::{Program, INLINE_MODULE};

fn run_err(source: &str) -> ProgramError {
    let mut program = Program::new();
    match program.run(source, INLINE_MODULE) {
        Ok(module) => panic!("{} unexpectedly ran: {}", source, module),
        Err(e) => e,
    }
}

fn type_err(source: &str) -> TypeError {
    match run_err(source) {
        ProgramError::Type { source, .. } => source,
        other => panic!("expected a type error, got {}", other),
    }
}

fn parse_err(source: &str) -> ParseError {
    match run_err(source) {
        ProgramError::Parse { source, .. } => source,
        other => panic!("expected a parse error, got {}", other),
    }
}

// ============================================================================
// Rows
// ============================================================================

#[test]
fn scenario_missing_label_on_closed_record() {
    // (r = {a: 1}; r.b) → closed record has no b
    let error = type_err("(r = {a: 1}; r.b)");
    let message = error.to_string();
    assert!(message.contains("incompatible types"), "{}", message);
    assert!(message.contains("{a: Int}"), "{}", message);
}

#[test]
fn closed_record_cannot_gain_labels_through_a_function() {
    let error = type_err("(get = \\r -> r.a + r.b; get({a: 1}))");
    assert!(matches!(error, TypeError::Incompatible(..)));
}

#[test]
fn record_and_variant_shapes_do_not_mix() {
    // scrutinizing a record with `when`
    let error = type_err("(r = {a: 1}; when r is Some x -> x)");
    assert!(matches!(error, TypeError::Incompatible(..)));
}

#[test]
fn closed_when_rejects_mismatched_payload_types() {
    // both clauses force their payloads into one result type
    let error = type_err("(f = \\o -> when o is Some x -> x + 1; None s -> `no`; 1)");
    assert!(matches!(error, TypeError::Incompatible(..)));
}

// ============================================================================
// Occurs check
// ============================================================================

#[test]
fn scenario_self_application_fails_the_occurs_check() {
    // (\x -> x(x)) → infinite type
    let error = type_err("(\\x -> x(x))");
    assert!(matches!(error, TypeError::InfiniteType));
    assert_eq!(error.to_string(), "infinite recursive type");
}

// ============================================================================
// Constructors and arities
// ============================================================================

#[test]
fn list_elements_must_share_a_type() {
    let error = type_err("[1, `two`]");
    let message = error.to_string();
    assert!(message.contains("Str") && message.contains("Int"), "{}", message);
}

#[test]
fn application_arity_is_checked_by_unification() {
    // Lam<t0, t1> never unifies with Lam<Int, Int, r>
    let error = type_err("(f = \\x -> x; f(1, 2))");
    assert!(matches!(error, TypeError::Incompatible(..)));
}

#[test]
fn operands_must_fit_the_operator() {
    let error = type_err("1 + `one`");
    assert!(matches!(error, TypeError::Incompatible(..)));
}

#[test]
fn unbound_variables_are_reported_by_name() {
    let error = type_err("nope");
    assert_eq!(error.to_string(), "unbound variable nope");
}

#[test]
fn annotation_conflicts_are_rejected() {
    let error = type_err("(f : Lam<Int, Str>; f = \\x -> x + 1; 1)");
    assert!(matches!(error, TypeError::Incompatible(..)));
}

// ============================================================================
// AST construction failures surface as parse errors
// ============================================================================

#[test]
fn duplicate_record_labels() {
    let error = parse_err("{a: 1, a: 2}");
    assert!(matches!(error, ParseError::DuplicateRecordProp(name) if name == "a"));
}

#[test]
fn duplicate_when_constructors() {
    let error = parse_err("(x = True; when x is True a -> 1; True b -> 2)");
    assert!(matches!(error, ParseError::DuplicateWhenClause(name) if name == "True"));
}

#[test]
fn duplicate_lambda_parameters() {
    let error = parse_err("\\x, x -> x");
    assert!(matches!(error, ParseError::DuplicateParam(name) if name == "x"));
}

#[test]
fn malformed_input_is_a_parse_error() {
    assert!(matches!(run_err("(x = ; x)"), ProgramError::Parse { .. }));
    assert!(matches!(run_err("1 +"), ProgramError::Parse { .. }));
}
