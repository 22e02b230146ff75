//! Tree-walking evaluator for fun
//!
//! Evaluation is strict and left-to-right throughout. Closures capture a
//! persistent snapshot of the value environment; environment extension is
//! copy-on-write, so existing captures are never disturbed. Task values
//! are zero-parameter builtins whose application performs the effect;
//! the top-level driver runs the program's final task.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Declaration, Expr};
use crate::module::{Program, ProgramError};

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("invalid value type for string template: {0}")]
    TemplatePart(String),
    #[error("cannot apply non closure value {0}")]
    NotCallable(String),
    #[error("invalid number of arguments: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("invalid argument for {builtin}: {value}")]
    InvalidArgument { builtin: String, value: String },
    #[error("record does not contain prop {0}")]
    MissingProp(String),
    #[error("invalid value type for prop parent: {0}")]
    NotARecord(String),
    #[error("invalid value type for when scrutinee: {0}")]
    NotAConstructor(String),
    #[error("no when clause matches cons name {0}")]
    NoMatchingClause(String),
    #[error("task failed: {0}")]
    TaskFailure(String),
    #[error(transparent)]
    Import(Box<ProgramError>),
}

/// Value environment: label → value, extended copy-on-write.
pub type ValueEnv = im::HashMap<String, Value>;

pub type BuiltinFn = dyn Fn(&[Value], &mut Program) -> Result<Value, EvalError>;

/// A named builtin. The implementation receives the evaluated arguments
/// and the program, so `fix` and the task combinators can re-enter the
/// evaluator and linker.
#[derive(Clone)]
pub struct Builtin {
    pub name: String,
    pub f: Rc<BuiltinFn>,
}

impl Builtin {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&[Value], &mut Program) -> Result<Value, EvalError> + 'static,
    ) -> Builtin {
        Builtin {
            name: name.into(),
            f: Rc::new(f),
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Rec(BTreeMap<String, Value>),
    Cons {
        name: String,
        payload: Option<Box<Value>>,
    },
    Closure {
        params: Vec<String>,
        env: ValueEnv,
        body: Rc<Expr>,
    },
    Builtin(Builtin),
}

impl Value {
    /// The unit record `{}`
    pub fn unit() -> Value {
        Value::Rec(BTreeMap::new())
    }

    pub fn cons(name: impl Into<String>, payload: Option<Value>) -> Value {
        Value::Cons {
            name: name.into(),
            payload: payload.map(Box::new),
        }
    }

    pub fn bool(value: bool) -> Value {
        Value::cons(if value { "True" } else { "False" }, None)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Rec(entries) => {
                write!(f, "{{")?;
                for (i, (label, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", label, value)?;
                }
                write!(f, "}}")
            }
            Value::Cons { name, payload } => match payload {
                Some(payload) => write!(f, "{} {}", name, payload),
                None => write!(f, "{}", name),
            },
            Value::Closure { .. } => write!(f, "<closure>"),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn eval(
        &self,
        expr: &Expr,
        env: &ValueEnv,
        program: &mut Program,
    ) -> Result<Value, EvalError> {
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::LitStr(s) => Ok(Value::Str(s.clone())),

            Expr::Str(parts) => {
                let mut sum = String::new();
                for part in parts {
                    let value = self.eval(part, env, program)?;
                    let Value::Str(s) = value else {
                        return Err(EvalError::TemplatePart(value.to_string()));
                    };
                    sum.push_str(&s);
                }
                Ok(Value::Str(sum))
            }

            Expr::Var { name, .. } => env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),

            Expr::Lam { params, body } => Ok(Value::Closure {
                params: params.clone(),
                env: env.clone(),
                body: body.clone(),
            }),

            Expr::App { func, args } => {
                let func = self.eval(func, env, program)?;

                if let Value::Builtin(builtin) = &func {
                    let mut arg_values = Vec::new();
                    for arg in args {
                        arg_values.push(self.eval(arg, env, program)?);
                    }
                    return (builtin.f)(&arg_values, program);
                }

                let Value::Closure {
                    params,
                    env: captured,
                    body,
                } = &func
                else {
                    return Err(EvalError::NotCallable(func.to_string()));
                };

                if args.len() != params.len() {
                    return Err(EvalError::ArityMismatch {
                        expected: params.len(),
                        got: args.len(),
                    });
                }

                let mut new_env = captured.clone();
                for (param, arg) in params.iter().zip(args) {
                    let value = self.eval(arg, env, program)?;
                    new_env.insert(param.clone(), value);
                }

                self.eval(body, &new_env, program)
            }

            Expr::List(items) => {
                let mut values = Vec::new();
                for item in items {
                    values.push(self.eval(item, env, program)?);
                }
                Ok(Value::List(values))
            }

            Expr::Rec(entries) => {
                let mut values = BTreeMap::new();
                for (label, value) in entries {
                    values.insert(label.clone(), self.eval(value, env, program)?);
                }
                Ok(Value::Rec(values))
            }

            Expr::Prop { parent, prop } => {
                let value = self.eval(parent, env, program)?;
                let Value::Rec(entries) = &value else {
                    return Err(EvalError::NotARecord(value.to_string()));
                };
                entries
                    .get(prop)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingProp(prop.clone()))
            }

            Expr::Cons { name, payload } => {
                let payload = match payload {
                    Some(payload) => Some(self.eval(payload, env, program)?),
                    None => None,
                };
                Ok(Value::cons(name.clone(), payload))
            }

            Expr::When {
                value,
                clauses,
                else_,
            } => {
                let value = self.eval(value, env, program)?;
                let Value::Cons { name, payload } = &value else {
                    return Err(EvalError::NotAConstructor(value.to_string()));
                };

                for clause in clauses {
                    if clause.cons_name != *name {
                        continue;
                    }
                    let payload = payload
                        .as_ref()
                        .map(|p| p.as_ref().clone())
                        .unwrap_or_else(Value::unit);
                    let clause_env = env.update(clause.payload.clone(), payload);
                    return self.eval(&clause.consequence, &clause_env, program);
                }

                match else_ {
                    Some(else_expr) => self.eval(else_expr, env, program),
                    None => Err(EvalError::NoMatchingClause(name.clone())),
                }
            }

            Expr::Block { decs, result } => {
                let mut block_env = env.clone();
                for dec in decs {
                    match dec {
                        Declaration::Assign { name, value } => {
                            let value = self.eval(value, &block_env, program)?;
                            block_env.insert(name.clone(), value);
                        }
                        // annotations have no runtime effect
                        Declaration::Annot { .. } => {}
                        Declaration::Import { name, path } => {
                            let module = program
                                .import(path)
                                .map_err(|e| EvalError::Import(Box::new(e)))?;
                            block_env.insert(name.clone(), module.value.clone());
                        }
                    }
                }
                self.eval(result, &block_env, program)
            }
        }
    }

    /// Apply an already-evaluated callee to evaluated arguments. Used by
    /// builtins (`fix`, `flat_map`) and the task driver.
    pub fn apply(
        &self,
        func: &Value,
        args: &[Value],
        program: &mut Program,
    ) -> Result<Value, EvalError> {
        match func {
            Value::Builtin(builtin) => (builtin.f)(args, program),
            Value::Closure {
                params,
                env,
                body,
            } => {
                if args.len() != params.len() {
                    return Err(EvalError::ArityMismatch {
                        expected: params.len(),
                        got: args.len(),
                    });
                }
                let mut new_env = env.clone();
                for (param, arg) in params.iter().zip(args) {
                    new_env.insert(param.clone(), arg.clone());
                }
                self.eval(body, &new_env, program)
            }
            _ => Err(EvalError::NotCallable(func.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_print_the_stable_grammar() {
        let record = Value::Rec(BTreeMap::from([
            ("b".to_string(), Value::Int(2)),
            ("a".to_string(), Value::Int(1)),
        ]));
        assert_eq!(record.to_string(), "{a: 1, b: 2}");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(Value::cons("Some", Some(Value::Int(3))).to_string(), "Some 3");
        assert_eq!(Value::bool(true).to_string(), "True");
        assert_eq!(Value::unit().to_string(), "{}");
    }

    #[test]
    fn env_extension_keeps_captures_stable() {
        let env: ValueEnv = ValueEnv::new().update("x".to_string(), Value::Int(1));
        let extended = env.update("x".to_string(), Value::Int(2));
        assert!(matches!(env.get("x"), Some(Value::Int(1))));
        assert!(matches!(extended.get("x"), Some(Value::Int(2))));
    }
}
