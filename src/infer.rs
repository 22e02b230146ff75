//! Hindley-Milner type inference with row polymorphism
//!
//! One recursive `infer` over the AST under a type environment, producing
//! a substitution and a principal type. Unification lives here rather
//! than in `types` because row unification allocates fresh rest
//! variables. Generalization happens at block-level assignments; imports
//! re-enter the module linker and bind the imported module's scheme.

use std::cell::Cell;
use std::collections::BTreeMap;

use log::debug;
use thiserror::Error;

use crate::ast::{Declaration, Expr};
use crate::module::{Program, ProgramError};
use crate::types::{generalize, Scheme, Subst, Type, TypeEnv, LAM_CONS, LIST_CONS};

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("unbound variable {0}")]
    UnboundVariable(String),
    #[error("incompatible types {0} ~!~ {1}")]
    Incompatible(String, String),
    #[error("infinite recursive type")]
    InfiniteType,
    #[error(transparent)]
    Import(Box<ProgramError>),
}

fn incompatible(t1: &Type, t2: &Type) -> TypeError {
    TypeError::Incompatible(t1.to_string(), t2.to_string())
}

/// Bind a type variable to a type, refusing infinite types.
pub fn bind(name: &str, ty: &Type) -> Result<Subst, TypeError> {
    if let Type::Var(other) = ty {
        if other == name {
            return Ok(Subst::new());
        }
    }
    if ty.free_vars().contains(name) {
        return Err(TypeError::InfiniteType);
    }
    Ok(Subst::singleton(name, ty.clone()))
}

pub struct Inferrer {
    /// Monotonic counter for fresh type variables
    var_count: Cell<u32>,
}

impl Inferrer {
    pub fn new() -> Self {
        Self {
            var_count: Cell::new(0),
        }
    }

    fn fresh_name(&self) -> String {
        let current = self.var_count.get();
        self.var_count.set(current + 1);
        format!("t{}", current)
    }

    fn fresh_var(&self) -> Type {
        Type::Var(self.fresh_name())
    }

    /// Replace each bound variable of the scheme by a fresh one.
    pub fn instantiate(&self, scheme: &Scheme) -> Type {
        let mut subst = Subst::new();
        for param in &scheme.forall {
            subst.insert(param.clone(), self.fresh_var());
        }
        scheme.ty.apply(&subst)
    }

    // ========================================================================
    // Unification
    // ========================================================================

    pub fn unify(&self, t1: &Type, t2: &Type) -> Result<Subst, TypeError> {
        if let Type::Var(name) = t1 {
            return bind(name, t2);
        }
        if let Type::Var(name) = t2 {
            return bind(name, t1);
        }
        match (t1, t2) {
            (Type::Cons { .. }, Type::Cons { .. }) => self.unify_cons(t1, t2),
            (Type::Rec { .. }, Type::Rec { .. }) => self.unify_recs(t1, t2),
            _ => Err(incompatible(t1, t2)),
        }
    }

    fn unify_cons(&self, t1: &Type, t2: &Type) -> Result<Subst, TypeError> {
        let (Type::Cons { name: n1, args: a1 }, Type::Cons { name: n2, args: a2 }) = (t1, t2)
        else {
            unreachable!("unify_cons called on non-constructors");
        };
        if n1 != n2 || a1.len() != a2.len() {
            return Err(incompatible(t1, t2));
        }
        let mut subst = Subst::new();
        for (arg1, arg2) in a1.iter().zip(a2) {
            let s = self.unify(&arg1.apply(&subst), &arg2.apply(&subst))?;
            subst = subst.compose(&s);
        }
        Ok(subst)
    }

    /// Row unification, serving records and variants alike.
    ///
    /// Openness is asymmetric: a variant row is open when either side has
    /// a rest variable (extra constructors may be absorbed into either
    /// rest), a record row only when both do (a record literal without a
    /// rest must expose all its labels). Short of that, unification still
    /// proceeds when each side with leftover labels faces a rest variable
    /// able to absorb them. That is what lets a closed record literal
    /// flow into an open projection row.
    fn unify_recs(&self, t1: &Type, t2: &Type) -> Result<Subst, TypeError> {
        let (
            Type::Rec {
                entries: e1,
                rest: rest1,
                union: u1,
            },
            Type::Rec {
                entries: e2,
                rest: rest2,
                union: u2,
            },
        ) = (t1, t2)
        else {
            unreachable!("unify_recs called on non-rows");
        };
        if u1 != u2 {
            return Err(incompatible(t1, t2));
        }
        let union = *u1;

        let mut subst = Subst::new();
        for (label, ty1) in e1 {
            if let Some(ty2) = e2.get(label) {
                let s = self.unify(ty1, ty2)?;
                subst = subst.compose(&s);
            }
        }

        let only1: BTreeMap<String, Type> = e1
            .iter()
            .filter(|(label, _)| !e2.contains_key(*label))
            .map(|(label, ty)| (label.clone(), ty.clone()))
            .collect();
        let only2: BTreeMap<String, Type> = e2
            .iter()
            .filter(|(label, _)| !e1.contains_key(*label))
            .map(|(label, ty)| (label.clone(), ty.clone()))
            .collect();

        let open = if union {
            rest1.is_some() || rest2.is_some()
        } else {
            rest1.is_some() && rest2.is_some()
        };
        let assignable_to_1 = only2.is_empty() || rest1.is_some();
        let assignable_to_2 = only1.is_empty() || rest2.is_some();

        let fresh = self.fresh_name();
        if !(open || (assignable_to_1 && assignable_to_2)) {
            return Err(incompatible(t1, t2));
        }

        if let Some(rest1) = rest1 {
            let s = self.unify(
                &Type::Var(rest1.clone()),
                &Type::Rec {
                    entries: only2,
                    rest: Some(fresh.clone()),
                    union,
                },
            )?;
            subst = subst.compose(&s);
        }
        if let Some(rest2) = rest2 {
            let s = self.unify(
                &Type::Var(rest2.clone()),
                &Type::Rec {
                    entries: only1,
                    rest: Some(fresh),
                    union,
                },
            )?;
            subst = subst.compose(&s);
        }

        Ok(subst)
    }

    // ========================================================================
    // Inference
    // ========================================================================

    pub fn infer(
        &self,
        expr: &Expr,
        env: &TypeEnv,
        program: &mut Program,
    ) -> Result<(Subst, Type), TypeError> {
        let mut subst = Subst::new();

        match expr {
            Expr::Int(_) => Ok((subst, Type::int())),
            Expr::LitStr(_) => Ok((subst, Type::string())),

            Expr::Str(parts) => {
                let mut env = env.clone();
                for part in parts {
                    env = env.apply(&subst);
                    let (s, t) = self.infer(part, &env, program)?;
                    subst = subst.compose(&s);
                    let s = self.unify(&t, &Type::string())?;
                    subst = subst.compose(&s);
                }
                Ok((subst, Type::string()))
            }

            Expr::Var { name, .. } => {
                let scheme = env
                    .get(name)
                    .ok_or_else(|| TypeError::UnboundVariable(name.clone()))?;
                let t = self.instantiate(scheme);
                Ok((subst, t))
            }

            Expr::Lam { params, body } => {
                let mut new_env = env.clone();
                let mut args = Vec::new();
                for param in params {
                    let fresh = self.fresh_var();
                    new_env.insert(param.clone(), Scheme::mono(fresh.clone()));
                    args.push(fresh);
                }

                let (s, t) = self.infer(body, &new_env, program)?;
                subst = subst.compose(&s);
                args.push(t);

                let result = Type::cons(LAM_CONS, args).apply(&subst);
                Ok((subst, result))
            }

            Expr::App { func, args } => {
                let result_var = self.fresh_var();

                let mut env = env.clone();
                let mut arg_types = Vec::new();
                for arg in args {
                    env = env.apply(&subst);
                    let (s, t) = self.infer(arg, &env, program)?;
                    subst = subst.compose(&s);
                    arg_types.push(t);
                }
                env = env.apply(&subst);

                let (s, t) = self.infer(func, &env, program)?;
                subst = subst.compose(&s);

                arg_types.push(result_var.clone());
                let s = self.unify(&t.apply(&subst), &Type::cons(LAM_CONS, arg_types))?;
                subst = subst.compose(&s);

                let result = result_var.apply(&subst);
                Ok((subst, result))
            }

            Expr::List(items) => {
                let mut fresh = self.fresh_var();
                let mut env = env.clone();
                for item in items {
                    fresh = fresh.apply(&subst);
                    env = env.apply(&subst);

                    let (s, t) = self.infer(item, &env, program)?;
                    subst = subst.compose(&s);

                    let s = self.unify(&t, &fresh)?;
                    subst = subst.compose(&s);
                }

                let item_type = fresh.apply(&subst);
                Ok((subst, Type::cons(LIST_CONS, vec![item_type])))
            }

            Expr::Rec(entries) => {
                let mut env = env.clone();
                let mut rec_entries = BTreeMap::new();
                for (label, value) in entries {
                    env = env.apply(&subst);
                    let (s, t) = self.infer(value, &env, program)?;
                    subst = subst.compose(&s);
                    rec_entries.insert(label.clone(), t);
                }

                // record literals are closed: no rest variable
                let rec = Type::record(rec_entries, None).apply(&subst);
                Ok((subst, rec))
            }

            Expr::Prop { parent, prop } => {
                let (s, t) = self.infer(parent, env, program)?;
                subst = subst.compose(&s);

                let result_var = self.fresh_var();
                let expected = Type::record(
                    BTreeMap::from([(prop.clone(), result_var.clone())]),
                    Some(self.fresh_name()),
                );
                let s = self.unify(&t, &expected)?;
                subst = subst.compose(&s);
                let result = result_var.apply(&subst);
                Ok((subst, result))
            }

            Expr::Cons { name, payload } => {
                let payload_type = match payload {
                    Some(payload) => {
                        let (s, t) = self.infer(payload, env, program)?;
                        subst = subst.compose(&s);
                        t.apply(&subst)
                    }
                    None => Type::unit(),
                };
                let row = Type::union(
                    BTreeMap::from([(name.clone(), payload_type)]),
                    Some(self.fresh_name()),
                );
                Ok((subst, row))
            }

            Expr::When {
                value,
                clauses,
                else_,
            } => {
                let mut result_type = self.fresh_var();
                let mut expected_entries = BTreeMap::new();
                let mut expected_rest = None;

                let mut env = env.clone();
                for clause in clauses {
                    env = env.apply(&subst);
                    let fresh = self.fresh_var();
                    let clause_env =
                        env.extend(clause.payload.clone(), Scheme::mono(fresh.clone()));
                    let (s, t) = self.infer(&clause.consequence, &clause_env, program)?;
                    subst = subst.compose(&s);

                    expected_entries.insert(clause.cons_name.clone(), fresh);

                    result_type = result_type.apply(&subst);
                    let s = self.unify(&result_type, &t.apply(&subst))?;
                    subst = subst.compose(&s);
                }

                if let Some(else_expr) = else_ {
                    // an else permits extra constructors: open the row
                    expected_rest = Some(self.fresh_name());

                    let (s, t) = self.infer(else_expr, &env, program)?;
                    subst = subst.compose(&s);
                    let t = t.apply(&subst);

                    result_type = result_type.apply(&subst);
                    let s = self.unify(&result_type, &t.apply(&subst))?;
                    subst = subst.compose(&s);
                }

                let (s, value_type) = self.infer(value, &env, program)?;
                subst = subst.compose(&s);
                let value_type = value_type.apply(&subst);

                let expected = Type::Rec {
                    entries: expected_entries,
                    rest: expected_rest,
                    union: true,
                };
                let s = self.unify(&value_type, &expected)?;
                debug!(
                    "when: scrutinee {} against {} result {}",
                    value_type, expected, result_type
                );
                subst = subst.compose(&s);

                let result = result_type.apply(&subst);
                Ok((subst, result))
            }

            Expr::Block { decs, result } => {
                let mut env = env.clone();
                for dec in decs {
                    match dec {
                        Declaration::Assign { name, value } => {
                            env = env.apply(&subst);
                            let (s, t) = self.infer(value, &env, program)?;
                            subst = subst.compose(&s);

                            let mut t = t;
                            // a forward declaration pins the shape
                            if let Some(scheme) = env.get(name).cloned() {
                                let s = self.unify(&self.instantiate(&scheme), &t)?;
                                subst = subst.compose(&s);
                                t = t.apply(&subst);
                            }

                            env = env.extend(name.clone(), generalize(&t));
                        }
                        Declaration::Annot { name, scheme } => {
                            if let Some(existing) = env.get(name).cloned() {
                                let t = self.instantiate(scheme);
                                let s = self.unify(&self.instantiate(&existing), &t)?;
                                subst = subst.compose(&s);
                                let t = t.apply(&subst);
                                env = env.extend(name.clone(), generalize(&t));
                            } else {
                                env = env.extend(name.clone(), scheme.clone());
                            }
                        }
                        Declaration::Import { name, path } => {
                            let module = program
                                .import(path)
                                .map_err(|e| TypeError::Import(Box::new(e)))?;
                            if let Some(existing) = env.get(name).cloned() {
                                let t = self.instantiate(&module.scheme);
                                let s = self.unify(&self.instantiate(&existing), &t)?;
                                subst = subst.compose(&s);
                                let t = t.apply(&subst);
                                env = env.extend(name.clone(), generalize(&t));
                            } else {
                                env = env.extend(name.clone(), module.scheme.clone());
                            }
                        }
                    }
                }
                env = env.apply(&subst);

                let (s, t) = self.infer(result, &env, program)?;
                subst = subst.compose(&s);
                let t = t.apply(&subst);
                Ok((subst, t))
            }
        }
    }
}

impl Default for Inferrer {
    fn default() -> Self {
        Self::new()
    }
}
