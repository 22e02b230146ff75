//! fun - a small, statically typed, purely functional language with
//! row-polymorphic records and variants

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod infer;
pub mod lexer;
pub mod lsp;
pub mod module;
pub mod parser;
pub mod types;

pub use ast::{Declaration, Expr};
pub use builtins::StdEnv;
pub use eval::{Evaluator, Value};
pub use infer::Inferrer;
pub use lexer::Lexer;
pub use module::{Module, Program, INLINE_MODULE};
pub use parser::Parser;
pub use types::{Scheme, Subst, Type, TypeEnv};
