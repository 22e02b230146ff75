//! Abstract syntax tree for fun
//!
//! Built from the grammar-named node tree produced by the parser. Node
//! kinds map to AST variants by name; `iapp` nodes are rewritten into
//! binary `App` with the operator marked symbolic. Construction rejects
//! error nodes, duplicate record labels, duplicate `when` constructor
//! names, duplicate lambda params, and non-variable nodes in binder
//! positions. ASTs are immutable once built.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::parser::{ParseError, SyntaxNode};
use crate::types::{generalize, type_from_node, Scheme};

pub type Ident = String;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    LitStr(String),
    /// String template; every part must check/evaluate to a string
    Str(Vec<Expr>),
    Var {
        name: Ident,
        is_symbol: bool,
    },
    App {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Lam {
        params: Vec<Ident>,
        body: Rc<Expr>,
    },
    Rec(Vec<(Ident, Expr)>),
    Prop {
        parent: Box<Expr>,
        prop: Ident,
    },
    Cons {
        name: Ident,
        payload: Option<Box<Expr>>,
    },
    When {
        value: Box<Expr>,
        clauses: Vec<WhenClause>,
        else_: Option<Box<Expr>>,
    },
    List(Vec<Expr>),
    Block {
        decs: Vec<Declaration>,
        result: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub cons_name: Ident,
    pub payload: Ident,
    pub consequence: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Assign { name: Ident, value: Expr },
    Annot { name: Ident, scheme: Scheme },
    Import { name: Ident, path: String },
}

impl Expr {
    pub fn var(name: impl Into<Ident>) -> Expr {
        Expr::Var {
            name: name.into(),
            is_symbol: false,
        }
    }

    pub fn sym(name: impl Into<Ident>) -> Expr {
        Expr::Var {
            name: name.into(),
            is_symbol: true,
        }
    }
}

/// Build an expression from a grammar-named node tree.
pub fn from_node(node: &SyntaxNode) -> Result<Expr, ParseError> {
    if node.has_error() {
        return Err(ParseError::ErrorNode);
    }
    expr_from_node(node)
}

fn expr_from_node(node: &SyntaxNode) -> Result<Expr, ParseError> {
    match node.kind {
        "int" => {
            let value = node
                .text
                .parse::<i64>()
                .map_err(|_| ParseError::InvalidInt(node.text.clone()))?;
            Ok(Expr::Int(value))
        }
        "lit_str" => Ok(Expr::LitStr(node.text.clone())),
        "str" => {
            let parts = node
                .children
                .iter()
                .map(expr_from_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Str(parts))
        }
        "var" => Ok(Expr::var(node.text.clone())),
        "sym" => Ok(Expr::sym(node.text.clone())),
        "app" => {
            let func = expr_from_node(&node.children[0])?;
            let args = node.children[1..]
                .iter()
                .map(expr_from_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::App {
                func: Box::new(func),
                args,
            })
        }
        "iapp" => {
            let lhs = expr_from_node(&node.children[0])?;
            let op = expr_from_node(&node.children[1])?;
            let rhs = expr_from_node(&node.children[2])?;
            Ok(Expr::App {
                func: Box::new(op),
                args: vec![lhs, rhs],
            })
        }
        "lam" => {
            let (body, params) = node
                .children
                .split_last()
                .expect("lam node has a body child");
            let mut names = Vec::new();
            let mut seen = HashSet::new();
            for param in params {
                let name = expect_var(param)?;
                if !seen.insert(name.clone()) {
                    return Err(ParseError::DuplicateParam(name));
                }
                names.push(name);
            }
            Ok(Expr::Lam {
                params: names,
                body: Rc::new(expr_from_node(body)?),
            })
        }
        "rec" => {
            let mut entries = Vec::new();
            let mut seen = HashSet::new();
            for pair in node.children.chunks(2) {
                let label = expect_var(&pair[0])?;
                if !seen.insert(label.clone()) {
                    return Err(ParseError::DuplicateRecordProp(label));
                }
                entries.push((label, expr_from_node(&pair[1])?));
            }
            Ok(Expr::Rec(entries))
        }
        "prop" | "lhs" => {
            let parent = expr_from_node(&node.children[0])?;
            let prop = expect_var(&node.children[1])?;
            Ok(Expr::Prop {
                parent: Box::new(parent),
                prop,
            })
        }
        "cons" => {
            let name = node.children[0].text.clone();
            let payload = match node.children.get(1) {
                Some(child) => Some(Box::new(expr_from_node(child)?)),
                None => None,
            };
            Ok(Expr::Cons { name, payload })
        }
        "when" => {
            let value = expr_from_node(&node.children[0])?;
            let mut clauses = Vec::new();
            let mut seen = HashSet::new();
            let mut i = 1;
            while i + 3 <= node.children.len() {
                let cons_name = node.children[i].text.clone();
                if !seen.insert(cons_name.clone()) {
                    return Err(ParseError::DuplicateWhenClause(cons_name));
                }
                let payload = expect_var(&node.children[i + 1])?;
                let consequence = expr_from_node(&node.children[i + 2])?;
                clauses.push(WhenClause {
                    cons_name,
                    payload,
                    consequence,
                });
                i += 3;
            }
            let else_ = match node.children.get(i) {
                Some(child) => Some(Box::new(expr_from_node(child)?)),
                None => None,
            };
            Ok(Expr::When {
                value: Box::new(value),
                clauses,
                else_,
            })
        }
        "list" => {
            let items = node
                .children
                .iter()
                .map(expr_from_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::List(items))
        }
        "block" | "source_file" => {
            let (result, decs) = node
                .children
                .split_last()
                .expect("block node has a result child");
            let decs = decs
                .iter()
                .map(decl_from_node)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Block {
                decs,
                result: Box::new(expr_from_node(result)?),
            })
        }
        kind => Err(ParseError::InvalidNode(kind.to_string())),
    }
}

fn decl_from_node(node: &SyntaxNode) -> Result<Declaration, ParseError> {
    match node.kind {
        "assign" => Ok(Declaration::Assign {
            name: expect_var(&node.children[0])?,
            value: expr_from_node(&node.children[1])?,
        }),
        "annot" => {
            let name = expect_var(&node.children[0])?;
            let ty = type_from_node(&node.children[1])?;
            Ok(Declaration::Annot {
                name,
                scheme: generalize(&ty),
            })
        }
        "import" => Ok(Declaration::Import {
            name: expect_var(&node.children[0])?,
            path: node.children[1].text.clone(),
        }),
        kind => Err(ParseError::UnexpectedDeclaration(kind.to_string())),
    }
}

fn expect_var(node: &SyntaxNode) -> Result<Ident, ParseError> {
    if node.kind != "var" {
        return Err(ParseError::ExpectedVariable(node.kind));
    }
    Ok(node.text.clone())
}

// ============================================================================
// Pretty printing
// ============================================================================

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(n) => write!(f, "{}", n),
            Expr::LitStr(s) => write!(f, "{}", s),
            Expr::Str(parts) => {
                write!(f, "`")?;
                for part in parts {
                    match part {
                        Expr::LitStr(s) => write!(f, "{}", s)?,
                        expr => write!(f, "{{{}}}", expr)?,
                    }
                }
                write!(f, "`")
            }
            Expr::Var { name, .. } => write!(f, "{}", name),
            Expr::App { func, args } => {
                if let Expr::Var {
                    is_symbol: true, ..
                } = func.as_ref()
                {
                    if args.len() == 2 {
                        return write!(f, "{} {} {}", args[0], func, args[1]);
                    }
                }
                write!(f, "{}(", func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Lam { params, body } => write!(f, "\\{} -> {}", params.join(", "), body),
            Expr::Rec(entries) => {
                write!(f, "{{")?;
                for (i, (label, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", label, value)?;
                }
                write!(f, "}}")
            }
            Expr::Prop { parent, prop } => write!(f, "{}.{}", parent, prop),
            Expr::Cons { name, payload } => match payload {
                Some(payload) => write!(f, "{} {}", name, payload),
                None => write!(f, "{}", name),
            },
            Expr::When {
                value,
                clauses,
                else_,
            } => {
                write!(f, "when {} is ", value)?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", clause)?;
                }
                if let Some(else_) = else_ {
                    write!(f, "; else {}", else_)?;
                }
                Ok(())
            }
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Block { decs, result } => {
                write!(f, "(")?;
                for dec in decs {
                    write!(f, "{};", dec)?;
                }
                write!(f, "{})", result)
            }
        }
    }
}

impl fmt::Display for WhenClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.cons_name, self.payload, self.consequence
        )
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Assign { name, value } => write!(f, "{} = {}", name, value),
            Declaration::Annot { name, scheme } => write!(f, "{} : {}", name, scheme),
            Declaration::Import { name, path } => write!(f, "import {} `{}`", name, path),
        }
    }
}
