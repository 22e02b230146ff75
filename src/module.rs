//! Program state and module linking
//!
//! A `Program` owns the standard environment, the inferrer, the module
//! cache, and the import stack. Each module runs through parse → AST →
//! infer → generalize → eval and is cached under the import path it was
//! requested by, verbatim. Paths resolve relative to the directory of the
//! importing module (the top of the import stack); the REPL's inline
//! module uses a sentinel path that is never pushed.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::ast::{self, Expr};
use crate::builtins::StdEnv;
use crate::eval::{EvalError, Evaluator, Value};
use crate::infer::{Inferrer, TypeError};
use crate::parser::{self, ParseError};
use crate::types::{generalize, Scheme};

/// Sentinel path for REPL input; never pushed onto the import stack, so
/// inline imports resolve from the working directory.
pub const INLINE_MODULE: &str = "<root>";

/// The result of running one source file.
#[derive(Debug)]
pub struct Module {
    pub path: String,
    pub expr: Expr,
    pub value: Value,
    pub scheme: Scheme,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.value, self.scheme)
    }
}

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("module `{path}` does not exist")]
    NotFound { path: String },
    #[error("failed to read module `{path}`: {source}")]
    ReadFailure {
        path: String,
        source: io::Error,
    },
    #[error("import cycle detected: {}", .chain.join(" -> "))]
    ImportCycle { chain: Vec<String> },
    #[error("failed to parse module {path}: {source}")]
    Parse { path: String, source: ParseError },
    #[error("failed to infer module type: {path}: {source}")]
    Type { path: String, source: TypeError },
    #[error("failed to evaluate module: {path}: {source}")]
    Eval { path: String, source: EvalError },
}

pub struct Program {
    inferrer: Rc<Inferrer>,
    evaluator: Evaluator,
    env: StdEnv,
    modules: HashMap<String, Rc<Module>>,
    /// Resolved paths of modules currently loading; top is the importer.
    import_stack: Vec<PathBuf>,
}

impl Program {
    pub fn new() -> Program {
        Program {
            inferrer: Rc::new(Inferrer::new()),
            evaluator: Evaluator,
            env: StdEnv::new(),
            modules: HashMap::new(),
            import_stack: Vec::new(),
        }
    }

    pub fn evaluator(&self) -> Evaluator {
        self.evaluator
    }

    /// Loaded modules, keyed by the import path they were requested by.
    pub fn modules(&self) -> &HashMap<String, Rc<Module>> {
        &self.modules
    }

    /// Parse, type-check, and evaluate one module.
    pub fn run(&mut self, source: &str, path: &str) -> Result<Rc<Module>, ProgramError> {
        let pushed = path != INLINE_MODULE;
        if pushed {
            self.import_stack.push(PathBuf::from(path));
        }
        let result = self.run_inner(source, path);
        if pushed {
            self.import_stack.pop();
        }
        result
    }

    fn run_inner(&mut self, source: &str, path: &str) -> Result<Rc<Module>, ProgramError> {
        let parse_err = |source: ParseError| ProgramError::Parse {
            path: path.to_string(),
            source,
        };
        let tree = parser::parse(source).map_err(parse_err)?;
        let expr = ast::from_node(&tree).map_err(parse_err)?;

        let inferrer = self.inferrer.clone();
        let types = self.env.types();
        let (_, ty) = inferrer
            .infer(&expr, &types, self)
            .map_err(|source| ProgramError::Type {
                path: path.to_string(),
                source,
            })?;
        let scheme = generalize(&ty);

        let evaluator = self.evaluator;
        let values = self.env.values();
        let value = evaluator
            .eval(&expr, &values, self)
            .map_err(|source| ProgramError::Eval {
                path: path.to_string(),
                source,
            })?;

        Ok(Rc::new(Module {
            path: path.to_string(),
            expr,
            value,
            scheme,
        }))
    }

    /// Load a module by import path, memoized under the requested path
    /// verbatim. A module whose resolved path is already loading is an
    /// import cycle.
    pub fn import(&mut self, path: &str) -> Result<Rc<Module>, ProgramError> {
        if let Some(module) = self.modules.get(path) {
            return Ok(module.clone());
        }

        let resolved = self.resolve(path);
        if self.import_stack.iter().any(|loading| loading == &resolved) {
            let mut chain: Vec<String> = self
                .import_stack
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(resolved.display().to_string());
            return Err(ProgramError::ImportCycle { chain });
        }

        debug!("loading module `{}` from {}", path, resolved.display());
        let source = match fs::read_to_string(&resolved) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ProgramError::NotFound {
                    path: path.to_string(),
                })
            }
            Err(source) => {
                return Err(ProgramError::ReadFailure {
                    path: path.to_string(),
                    source,
                })
            }
        };

        let resolved_path = resolved.to_str().unwrap_or(path).to_string();
        let module = self.run(&source, &resolved_path)?;
        self.modules.insert(path.to_string(), module.clone());
        Ok(module)
    }

    /// Modules resolve relative to the directory of the importing module;
    /// the root (and the REPL) resolve from the working directory.
    fn resolve(&self, path: &str) -> PathBuf {
        match self.import_stack.last().and_then(|p| p.parent()) {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_an_inline_module() {
        let mut program = Program::new();
        let module = program.run("(id = \\x -> x; id(3))", INLINE_MODULE).unwrap();
        assert_eq!(module.to_string(), "3 : Int");
    }

    #[test]
    fn inline_modules_are_not_cached() {
        let mut program = Program::new();
        program.run("1", INLINE_MODULE).unwrap();
        assert!(program.modules.is_empty());
        assert!(program.import_stack.is_empty());
    }

    #[test]
    fn missing_module_reports_its_path() {
        let mut program = Program::new();
        let error = program.import("no_such_module.fun").unwrap_err();
        assert!(matches!(error, ProgramError::NotFound { path } if path == "no_such_module.fun"));
    }

    #[test]
    fn import_stack_unwinds_after_failures() {
        let mut program = Program::new();
        assert!(program.run("r.b", "bad.fun").is_err());
        assert!(program.import_stack.is_empty());
    }
}
