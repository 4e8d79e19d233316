use std::fmt;

use ark_ast::Span;
use ark_sandbox::SandboxViolation;
use thiserror::Error;

/// What went wrong, independent of where.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("type mismatch: cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("type mismatch: cannot apply '{op}' to {operand}")]
    UnaryTypeMismatch {
        op: String,
        operand: &'static str,
    },

    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),

    #[error("recursion limit of {0} exceeded")]
    RecursionLimitExceeded(usize),

    #[error("linearity violation: '{0}' was consumed and may not be read")]
    LinearityViolation(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown attribute '{attr}' on {ty}")]
    UnknownAttribute { ty: &'static str, attr: String },

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("wrong number of arguments for '{name}': expected {expected}, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("intrinsic '{name}' failed: {message}")]
    IntrinsicFailed { name: String, message: String },

    #[error("cannot import '{path}': {reason}")]
    ImportFailed { path: String, reason: String },

    #[error("'{0}' outside of a loop")]
    StrayLoopSignal(&'static str),

    #[error(transparent)]
    Sandbox(#[from] SandboxViolation),
}

/// One annotated frame of the call trace, innermost first.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceFrame {
    pub function: String,
    pub span: Span,
}

/// An evaluator error: the kind, the position of the failing node when the
/// node carried one, and the call trace accumulated while unwinding.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Option<Span>,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, span: Option<Span>) -> Self {
        Self {
            kind,
            span,
            trace: Vec::new(),
        }
    }

    pub fn at(kind: RuntimeErrorKind, span: Span) -> Self {
        Self::new(kind, Some(span))
    }

    /// Appends a frame while unwinding through a call; frames end up
    /// ordered innermost to outermost.
    pub fn with_frame(mut self, function: impl Into<String>, span: Span) -> Self {
        self.trace.push(TraceFrame {
            function: function.into(),
            span,
        });
        self
    }

    /// Attaches a position if the error does not have one yet.
    pub fn ensure_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        for frame in &self.trace {
            write!(f, "\n  in {} at {}", frame.function, frame.span)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl miette::Diagnostic for RuntimeError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("ark::runtime"))
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        Self::new(kind, None)
    }
}

impl From<SandboxViolation> for RuntimeError {
    fn from(v: SandboxViolation) -> Self {
        Self::new(RuntimeErrorKind::Sandbox(v), None)
    }
}
