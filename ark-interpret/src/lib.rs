#![forbid(unsafe_code)]

//! The tree-walking evaluator.
//!
//! Walks a parsed [`Program`](ark_ast::Program) against a scope chain,
//! dispatching effects through the intrinsic registry and the sandbox in
//! the runtime context. Control transfer (`return`, `break`, `continue`,
//! tail calls) is modeled as an explicit result variant, never as a host
//! panic or exception.

mod flow;
mod interpreter;
mod ops;

use std::path::Path;

use ark_ast::Program;
use miette::Diagnostic;
use thiserror::Error;

pub use interpreter::{Interpreter, evaluate};

/// Parses a module for the import machinery. The grammar and parser live
/// outside this crate; hosts inject them through this seam.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Program, ModuleError>;
}

#[derive(Debug, Error, Diagnostic)]
#[error("module error: {message}")]
#[diagnostic(code(ark::interpret::module))]
pub struct ModuleError {
    pub message: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
