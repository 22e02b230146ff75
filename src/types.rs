//! Type terms, schemes, substitutions, and type environments
//!
//! Records and variants share one row shape (`Type::Rec` with a union
//! flag) so a single row-unification rule serves both. Rows carry an
//! optional rest variable; absence means the row is closed. Types are
//! never mutated after construction; substitution application builds new
//! terms.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::parser::{ParseError, SyntaxNode};

// lowercase user-defined variant tags never collide with these
pub const INT_CONS: &str = "Int";
pub const STR_CONS: &str = "Str";
pub const LAM_CONS: &str = "Lam";
pub const LIST_CONS: &str = "List";
pub const TASK_CONS: &str = "Task";

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A unification variable (user-written type variables included)
    Var(String),
    /// Nominal constructor: `Int`, `Lam<A, B, R>`, `Task<A, E>`, ...
    Cons { name: String, args: Vec<Type> },
    /// Row type: a record (`union = false`) or a variant (`union = true`)
    Rec {
        entries: BTreeMap<String, Type>,
        rest: Option<String>,
        union: bool,
    },
}

impl Type {
    pub fn var(name: impl Into<String>) -> Type {
        Type::Var(name.into())
    }

    pub fn cons(name: impl Into<String>, args: Vec<Type>) -> Type {
        Type::Cons {
            name: name.into(),
            args,
        }
    }

    pub fn int() -> Type {
        Type::cons(INT_CONS, vec![])
    }

    pub fn string() -> Type {
        Type::cons(STR_CONS, vec![])
    }

    /// `Lam<A1, .., An, R>`
    pub fn lam(mut args: Vec<Type>, ret: Type) -> Type {
        args.push(ret);
        Type::cons(LAM_CONS, args)
    }

    pub fn list(item: Type) -> Type {
        Type::cons(LIST_CONS, vec![item])
    }

    pub fn task(value: Type, errors: Type) -> Type {
        Type::cons(TASK_CONS, vec![value, errors])
    }

    pub fn record(entries: BTreeMap<String, Type>, rest: Option<String>) -> Type {
        Type::Rec {
            entries,
            rest,
            union: false,
        }
    }

    pub fn union(entries: BTreeMap<String, Type>, rest: Option<String>) -> Type {
        Type::Rec {
            entries,
            rest,
            union: true,
        }
    }

    /// `{}`, the empty closed record
    pub fn unit() -> Type {
        Type::record(BTreeMap::new(), None)
    }

    /// `[]`, the empty closed variant, inhabited by nothing
    pub fn never() -> Type {
        Type::union(BTreeMap::new(), None)
    }

    /// `[False {} | True {}]`
    pub fn bool() -> Type {
        let entries = BTreeMap::from([
            ("False".to_string(), Type::unit()),
            ("True".to_string(), Type::unit()),
        ]);
        Type::union(entries, None)
    }

    pub fn free_vars(&self) -> BTreeSet<String> {
        match self {
            Type::Var(name) => BTreeSet::from([name.clone()]),
            Type::Cons { args, .. } => args.iter().flat_map(Type::free_vars).collect(),
            Type::Rec { entries, rest, .. } => {
                let mut result: BTreeSet<String> =
                    entries.values().flat_map(Type::free_vars).collect();
                if let Some(rest) = rest {
                    result.insert(rest.clone());
                }
                result
            }
        }
    }

    pub fn apply(&self, subst: &Subst) -> Type {
        match self {
            Type::Var(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Cons { name, args } => Type::Cons {
                name: name.clone(),
                args: args.iter().map(|arg| arg.apply(subst)).collect(),
            },
            Type::Rec {
                entries,
                rest,
                union,
            } => {
                let mut new_entries: BTreeMap<String, Type> = entries
                    .iter()
                    .map(|(label, ty)| (label.clone(), ty.apply(subst)))
                    .collect();
                let mut new_rest = rest.clone();
                if let Some(rest) = rest {
                    match subst.get(rest) {
                        None => {}
                        Some(Type::Var(name)) => new_rest = Some(name.clone()),
                        Some(Type::Rec {
                            entries: inner_entries,
                            rest: inner_rest,
                            union: inner_union,
                        }) => {
                            // an open row absorbed more labels: flatten
                            if inner_union != union {
                                unreachable!("row rest bound to a row of the other kind");
                            }
                            for (label, ty) in inner_entries {
                                new_entries.insert(label.clone(), ty.clone());
                            }
                            new_rest = inner_rest.clone();
                        }
                        Some(_) => unreachable!("row rest bound to a non-row type"),
                    }
                }
                Type::Rec {
                    entries: new_entries,
                    rest: new_rest,
                    union: *union,
                }
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Var(name) => write!(f, "{}", name),
            Type::Cons { name, args } => {
                if args.is_empty() {
                    return write!(f, "{}", name);
                }
                write!(f, "{}<", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            Type::Rec {
                entries,
                rest,
                union,
            } => {
                let body = if *union {
                    entries
                        .iter()
                        .map(|(label, ty)| format!("{} {}", label, ty))
                        .collect::<Vec<_>>()
                        .join(" | ")
                } else {
                    entries
                        .iter()
                        .map(|(label, ty)| format!("{}: {}", label, ty))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let (open, close) = if *union { ("[", "]") } else { ("{", "}") };
                match rest {
                    Some(rest) => write!(f, "{}{} |{}{}", open, body, rest, close),
                    None => write!(f, "{}{}{}", open, body, close),
                }
            }
        }
    }
}

/// `∀(v1,..,vn). T`: free variables of `T` not listed in the binder stay
/// in scope (monomorphic); listed ones are generalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheme {
    pub forall: Vec<String>,
    pub ty: Type,
}

impl Scheme {
    /// A monomorphic scheme (empty binder)
    pub fn mono(ty: Type) -> Scheme {
        Scheme {
            forall: Vec::new(),
            ty,
        }
    }

    pub fn poly(forall: &[&str], ty: Type) -> Scheme {
        Scheme {
            forall: forall.iter().map(|v| v.to_string()).collect(),
            ty,
        }
    }

    /// Apply a substitution, shielding the bound variables.
    pub fn apply(&self, subst: &Subst) -> Scheme {
        let mut limited = subst.clone();
        for param in &self.forall {
            limited.map.remove(param);
        }
        Scheme {
            forall: self.forall.clone(),
            ty: self.ty.apply(&limited),
        }
    }

    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut result = self.ty.free_vars();
        for param in &self.forall {
            result.remove(param);
        }
        result
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forall.is_empty() {
            return write!(f, "{}", self.ty);
        }
        write!(f, "∀{}. {}", self.forall.join(", "), self.ty)
    }
}

/// Generalize a type over all of its free variables, sorted for
/// determinism. (Deliberately ignores variables free in the surrounding
/// environment; kept for scheme-output parity with the reference
/// semantics; see DESIGN.md.)
pub fn generalize(ty: &Type) -> Scheme {
    Scheme {
        forall: ty.free_vars().into_iter().collect(),
        ty: ty.clone(),
    }
}

/// A finite map from type-variable names to types.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    map: HashMap<String, Type>,
}

impl Subst {
    pub fn new() -> Subst {
        Subst::default()
    }

    pub fn singleton(name: impl Into<String>, ty: Type) -> Subst {
        Subst {
            map: HashMap::from([(name.into(), ty)]),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.map.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: Type) {
        self.map.insert(name.into(), ty);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `s1.compose(s2)` applies `s2` first when the result is applied to a
    /// type: the composed map is `{ n ↦ s2(t) | (n,t) ∈ s1 } ∪ s2`, with
    /// keys of `s1` shadowing those of `s2`.
    pub fn compose(&self, other: &Subst) -> Subst {
        let mut map = other.map.clone();
        for (name, ty) in &self.map {
            map.insert(name.clone(), ty.apply(other));
        }
        Subst { map }
    }
}

/// Type environment: label → scheme, extended copy-on-write.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    types: im::HashMap<String, Scheme>,
}

impl TypeEnv {
    pub fn new() -> TypeEnv {
        TypeEnv::default()
    }

    pub fn get(&self, name: &str) -> Option<&Scheme> {
        self.types.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, scheme: Scheme) {
        self.types.insert(name.into(), scheme);
    }

    /// A new environment with one extra binding; the receiver is untouched.
    pub fn extend(&self, name: impl Into<String>, scheme: Scheme) -> TypeEnv {
        TypeEnv {
            types: self.types.update(name.into(), scheme),
        }
    }

    pub fn apply(&self, subst: &Subst) -> TypeEnv {
        TypeEnv {
            types: self
                .types
                .iter()
                .map(|(name, scheme)| (name.clone(), scheme.apply(subst)))
                .collect(),
        }
    }
}

/// Build an annotation type from a grammar-named node tree.
pub fn type_from_node(node: &SyntaxNode) -> Result<Type, ParseError> {
    if node.has_error() {
        return Err(ParseError::ErrorNode);
    }
    match node.kind {
        "var" => Ok(Type::var(node.text.clone())),
        "type_cons" => {
            let name = node.children[0].text.clone();
            let args = node.children[1..]
                .iter()
                .map(type_from_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Type::Cons { name, args })
        }
        "type_rec" | "type_union" => {
            let union = node.kind == "type_union";
            let mut entries = BTreeMap::new();
            let mut rest = None;
            let mut i = 0;
            while i < node.children.len() {
                let child = &node.children[i];
                if child.kind == "rest" {
                    rest = Some(child.text.clone());
                    i += 1;
                    continue;
                }
                let label = child.text.clone();
                if entries.contains_key(&label) {
                    return Err(ParseError::DuplicateTypeProp(label));
                }
                entries.insert(label, type_from_node(&node.children[i + 1])?);
                i += 2;
            }
            Ok(Type::Rec {
                entries,
                rest,
                union,
            })
        }
        kind => Err(ParseError::InvalidNode(kind.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replaces_variables() {
        let subst = Subst::singleton("a", Type::int());
        assert_eq!(Type::var("a").apply(&subst), Type::int());
        assert_eq!(Type::var("b").apply(&subst), Type::var("b"));
        assert_eq!(
            Type::list(Type::var("a")).apply(&subst),
            Type::list(Type::int())
        );
    }

    #[test]
    fn apply_flattens_row_rests() {
        // {a: Int |r} under r ↦ {b: Str |s} becomes {a: Int, b: Str |s}
        let row = Type::record(BTreeMap::from([("a".into(), Type::int())]), Some("r".into()));
        let inner = Type::record(
            BTreeMap::from([("b".into(), Type::string())]),
            Some("s".into()),
        );
        let subst = Subst::singleton("r", inner);
        let expected = Type::record(
            BTreeMap::from([("a".into(), Type::int()), ("b".into(), Type::string())]),
            Some("s".into()),
        );
        assert_eq!(row.apply(&subst), expected);
    }

    #[test]
    fn compose_applies_right_substitution_first() {
        // (s1 ∘ s2)(t) = s2(s1(t)) for t mentioning s1's domain
        let s1 = Subst::singleton("a", Type::var("b"));
        let s2 = Subst::singleton("b", Type::int());
        let composed = s1.compose(&s2);
        assert_eq!(Type::var("a").apply(&composed), Type::int());
        assert_eq!(Type::var("b").apply(&composed), Type::int());
    }

    #[test]
    fn compose_left_keys_shadow() {
        let s1 = Subst::singleton("a", Type::int());
        let s2 = Subst::singleton("a", Type::string());
        assert_eq!(Type::var("a").apply(&s1.compose(&s2)), Type::int());
    }

    #[test]
    fn scheme_apply_shields_bound_variables() {
        let scheme = Scheme::poly(&["a"], Type::lam(vec![Type::var("a")], Type::var("b")));
        let subst = {
            let mut s = Subst::singleton("a", Type::int());
            s.insert("b", Type::string());
            s
        };
        let applied = scheme.apply(&subst);
        assert_eq!(
            applied.ty,
            Type::lam(vec![Type::var("a")], Type::string())
        );
    }

    #[test]
    fn generalize_quantifies_all_free_vars_sorted() {
        let ty = Type::lam(vec![Type::var("t2")], Type::var("t10"));
        let scheme = generalize(&ty);
        // lexicographic, matching the printer
        assert_eq!(scheme.forall, vec!["t10".to_string(), "t2".to_string()]);
    }

    #[test]
    fn env_extension_leaves_snapshot_untouched() {
        let env = TypeEnv::new().extend("x", Scheme::mono(Type::int()));
        let extended = env.extend("y", Scheme::mono(Type::string()));
        assert!(env.get("y").is_none());
        assert!(extended.get("x").is_some());
    }

    #[test]
    fn pretty_prints_rows_and_schemes() {
        assert_eq!(Type::unit().to_string(), "{}");
        assert_eq!(Type::never().to_string(), "[]");
        assert_eq!(Type::bool().to_string(), "[False {} | True {}]");
        let open = Type::record(BTreeMap::from([("a".into(), Type::int())]), Some("r".into()));
        assert_eq!(open.to_string(), "{a: Int |r}");
        let scheme = Scheme::poly(&["a"], Type::lam(vec![Type::var("a")], Type::var("a")));
        assert_eq!(scheme.to_string(), "∀a. Lam<a, a>");
        assert_eq!(
            Type::task(Type::int(), Type::var("e")).to_string(),
            "Task<Int, e>"
        );
    }
}
