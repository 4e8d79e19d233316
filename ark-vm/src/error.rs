use std::fmt;

use ark_bytecode::BytecodeError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum VmErrorKind {
    #[error("stack overflow (depth limit {0})")]
    StackOverflow(usize),

    #[error("stack underflow executing {0}")]
    StackUnderflow(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("execution timed out after {0} steps")]
    ExecutionTimeout(u64),

    #[error("type mismatch: cannot apply {op} to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("type mismatch: cannot apply {op} to {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },

    #[error("load from unset variable slot {0}")]
    UnsetVariable(u16),

    #[error("invalid constant index {0}")]
    BadConstant(u16),

    #[error(transparent)]
    Malformed(#[from] BytecodeError),
}

/// A VM fault: the kind plus the program counter of the faulting
/// instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub pc: usize,
}

impl VmError {
    pub fn new(kind: VmErrorKind, pc: usize) -> Self {
        Self { kind, pc }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pc {})", self.kind, self.pc)
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl miette::Diagnostic for VmError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("ark::vm"))
    }
}
