//! The standard environment
//!
//! Every binding is a `(scheme, value)` pair: integer arithmetic,
//! polymorphic structural `==` (over canonical printed forms), the `fix`
//! combinator, and the task combinators `ok`, `err`, `flat_map`, `write`.
//! Effectful builtins return inert zero-parameter thunks; applying a
//! thunk performs the effect.

use std::collections::BTreeMap;
use std::fs;

use crate::eval::{Builtin, EvalError, Evaluator, Value, ValueEnv};
use crate::module::Program;
use crate::types::{Scheme, Type, TypeEnv};

pub struct StdEnv {
    types: TypeEnv,
    values: ValueEnv,
}

impl StdEnv {
    pub fn new() -> StdEnv {
        let mut types = TypeEnv::new();
        let mut values = ValueEnv::new();
        let mut define = |name: &str, scheme: Scheme, builtin: Builtin| {
            types.insert(name, scheme);
            values.insert(name.to_string(), Value::Builtin(builtin));
        };

        define(
            "+",
            Scheme::mono(Type::lam(vec![Type::int(), Type::int()], Type::int())),
            Builtin::new("+", add),
        );
        define(
            "-",
            Scheme::mono(Type::lam(vec![Type::int(), Type::int()], Type::int())),
            Builtin::new("-", sub),
        );
        define(
            "==",
            Scheme::poly(
                &["a"],
                Type::lam(vec![Type::var("a"), Type::var("a")], Type::bool()),
            ),
            Builtin::new("==", eq),
        );
        define(
            "fix",
            Scheme::poly(
                &["a"],
                Type::lam(
                    vec![Type::lam(vec![Type::var("a")], Type::var("a"))],
                    Type::var("a"),
                ),
            ),
            Builtin::new("fix", fix),
        );
        define(
            "ok",
            Scheme::poly(
                &["a", "r"],
                Type::lam(
                    vec![Type::var("a")],
                    Type::task(
                        Type::var("a"),
                        Type::union(BTreeMap::new(), Some("r".into())),
                    ),
                ),
            ),
            Builtin::new("ok", ok),
        );
        define(
            "err",
            Scheme::poly(
                &["r"],
                Type::lam(
                    vec![Type::string()],
                    Type::task(Type::never(), error_row()),
                ),
            ),
            Builtin::new("err", err),
        );
        define(
            "flat_map",
            Scheme::poly(
                &["a", "b", "e"],
                Type::lam(
                    vec![
                        Type::task(Type::var("a"), Type::var("e")),
                        Type::lam(
                            vec![Type::var("a")],
                            Type::task(Type::var("b"), Type::var("e")),
                        ),
                    ],
                    Type::task(Type::var("b"), Type::var("e")),
                ),
            ),
            Builtin::new("flat_map", flat_map),
        );
        define(
            "write",
            Scheme::poly(
                &["r"],
                Type::lam(
                    vec![Type::string(), Type::string()],
                    Type::task(Type::unit(), error_row()),
                ),
            ),
            Builtin::new("write", write),
        );

        StdEnv { types, values }
    }

    pub fn types(&self) -> TypeEnv {
        self.types.clone()
    }

    pub fn values(&self) -> ValueEnv {
        self.values.clone()
    }
}

impl Default for StdEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// `[Err Str |r]`
fn error_row() -> Type {
    Type::union(
        BTreeMap::from([("Err".to_string(), Type::string())]),
        Some("r".into()),
    )
}

fn int_arg(builtin: &str, value: &Value) -> Result<i64, EvalError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(EvalError::InvalidArgument {
            builtin: builtin.to_string(),
            value: other.to_string(),
        }),
    }
}

fn str_arg(builtin: &str, value: &Value) -> Result<String, EvalError> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvalError::InvalidArgument {
            builtin: builtin.to_string(),
            value: other.to_string(),
        }),
    }
}

fn arity(expected: usize, args: &[Value]) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::ArityMismatch {
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn add(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    let mut sum = 0i64;
    for arg in args {
        sum += int_arg("+", arg)?;
    }
    Ok(Value::Int(sum))
}

fn sub(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    let Some((first, rest)) = args.split_first() else {
        return Err(EvalError::ArityMismatch {
            expected: 2,
            got: 0,
        });
    };
    let mut sum = int_arg("-", first)?;
    for arg in rest {
        sum -= int_arg("-", arg)?;
    }
    Ok(Value::Int(sum))
}

/// Structural comparison via canonical pretty-printed equality.
fn eq(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    arity(2, args)?;
    Ok(Value::bool(args[0].to_string() == args[1].to_string()))
}

fn fix(args: &[Value], program: &mut Program) -> Result<Value, EvalError> {
    arity(1, args)?;
    fix_apply(&args[0], program)
}

/// Tie the knot: evaluate the function body with its parameter bound to a
/// builtin that recomputes the fixed point on demand. Terminates for
/// function-valued fixed points, the only ones call-by-value can reach.
fn fix_apply(func: &Value, program: &mut Program) -> Result<Value, EvalError> {
    let Value::Closure { params, env, body } = func else {
        return Err(EvalError::InvalidArgument {
            builtin: "fix".to_string(),
            value: func.to_string(),
        });
    };
    if params.len() != 1 {
        return Err(EvalError::ArityMismatch {
            expected: 1,
            got: params.len(),
        });
    }

    let recur = {
        let func = func.clone();
        Value::Builtin(Builtin::new("fix", move |args, program| {
            let unrolled = fix_apply(&func, program)?;
            Evaluator.apply(&unrolled, args, program)
        }))
    };

    let new_env = env.update(params[0].clone(), recur);
    Evaluator.eval(body, &new_env, program)
}

fn ok(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    arity(1, args)?;
    let value = args[0].clone();
    Ok(Value::Builtin(Builtin::new("task", move |_, _| {
        Ok(value.clone())
    })))
}

fn err(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    arity(1, args)?;
    let message = str_arg("err", &args[0])?;
    Ok(Value::Builtin(Builtin::new("task", move |_, _| {
        Err(EvalError::TaskFailure(message.clone()))
    })))
}

fn flat_map(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    arity(2, args)?;
    let task = args[0].clone();
    let next = args[1].clone();
    Ok(Value::Builtin(Builtin::new("task", move |_, program| {
        let value = Evaluator.apply(&task, &[], program)?;
        let continuation = Evaluator.apply(&next, &[value], program)?;
        Evaluator.apply(&continuation, &[], program)
    })))
}

fn write(args: &[Value], _: &mut Program) -> Result<Value, EvalError> {
    arity(2, args)?;
    let path = str_arg("write", &args[0])?;
    let content = str_arg("write", &args[1])?;
    Ok(Value::Builtin(Builtin::new("task", move |_, _| {
        fs::write(&path, &content)
            .map_err(|e| EvalError::TaskFailure(format!("failed to write `{}`: {}", path, e)))?;
        Ok(Value::unit())
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_folds_over_arguments() {
        let mut program = Program::new();
        let result = add(&[Value::Int(1), Value::Int(2)], &mut program).unwrap();
        assert!(matches!(result, Value::Int(3)));
        let result = sub(&[Value::Int(10), Value::Int(3)], &mut program).unwrap();
        assert!(matches!(result, Value::Int(7)));
    }

    #[test]
    fn arithmetic_rejects_non_integers() {
        let mut program = Program::new();
        let error = add(&[Value::Int(1), Value::Str("x".into())], &mut program).unwrap_err();
        assert!(matches!(error, EvalError::InvalidArgument { .. }));
    }

    #[test]
    fn eq_compares_printed_forms() {
        let mut program = Program::new();
        let t = eq(&[Value::Int(1), Value::Int(1)], &mut program).unwrap();
        assert_eq!(t.to_string(), "True");
        let f = eq(&[Value::Int(1), Value::Int(2)], &mut program).unwrap();
        assert_eq!(f.to_string(), "False");
        // the documented collision: `1` and 1 print alike
        let collision = eq(&[Value::Str("1".into()), Value::Int(1)], &mut program).unwrap();
        assert_eq!(collision.to_string(), "True");
    }

    #[test]
    fn ok_is_inert_until_run() {
        let mut program = Program::new();
        let task = ok(&[Value::Int(5)], &mut program).unwrap();
        assert!(matches!(&task, Value::Builtin(b) if b.name == "task"));
        let result = Evaluator.apply(&task, &[], &mut program).unwrap();
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn err_fails_only_when_run() {
        let mut program = Program::new();
        let task = err(&[Value::Str("boom".into())], &mut program).unwrap();
        let error = Evaluator.apply(&task, &[], &mut program).unwrap_err();
        assert!(matches!(error, EvalError::TaskFailure(m) if m == "boom"));
    }
}
