use ark_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

/// A malformed ARKB byte stream. Compiler output never triggers these;
/// they guard against truncated files and foreign bytes.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("not an ARKB program (bad magic)")]
    #[diagnostic(code(ark::bytecode::format))]
    BadMagic,

    #[error("unsupported ARKB version {0:#04x}")]
    #[diagnostic(code(ark::bytecode::format))]
    UnsupportedVersion(u8),

    #[error("truncated program while reading {0}")]
    #[diagnostic(code(ark::bytecode::format))]
    Truncated(&'static str),

    #[error("unknown constant tag {tag:#04x} at byte {offset}")]
    #[diagnostic(code(ark::bytecode::format))]
    UnknownConstantTag { tag: u8, offset: usize },

    #[error("string constant at byte {offset} is not valid UTF-8")]
    #[diagnostic(code(ark::bytecode::format))]
    InvalidUtf8 { offset: usize },

    #[error("unknown opcode {byte:#04x} at code offset {offset}")]
    #[diagnostic(code(ark::bytecode::format))]
    UnknownOpcode { byte: u8, offset: usize },
}

#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum CompileError {
    #[error("cannot compile {what} to bytecode")]
    #[diagnostic(code(ark::bytecode::unsupported))]
    Unsupported { what: String, span: Span },

    #[error("undefined variable '{name}'")]
    #[diagnostic(code(ark::bytecode::resolve))]
    UndefinedVariable { name: String, span: Span },

    #[error("undefined function '{name}'")]
    #[diagnostic(code(ark::bytecode::resolve))]
    UndefinedFunction { name: String, span: Span },

    #[error("wrong number of arguments for '{name}': expected {expected}, got {got}")]
    #[diagnostic(code(ark::bytecode::resolve))]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("'break' outside of a loop")]
    #[diagnostic(code(ark::bytecode::structure))]
    BreakOutsideLoop { span: Span },

    #[error("'continue' outside of a loop")]
    #[diagnostic(code(ark::bytecode::structure))]
    ContinueOutsideLoop { span: Span },

    #[error("'return' outside of a function")]
    #[diagnostic(code(ark::bytecode::structure))]
    ReturnOutsideFunction { span: Span },

    #[error("constant pool limit exceeded")]
    #[diagnostic(code(ark::bytecode::limit))]
    TooManyConstants,

    #[error("variable slot limit exceeded")]
    #[diagnostic(code(ark::bytecode::limit))]
    TooManyVariables,

    #[error("call with more than 255 arguments")]
    #[diagnostic(code(ark::bytecode::limit))]
    TooManyArgs { span: Span },

    #[error("string constant longer than 65535 bytes")]
    #[diagnostic(code(ark::bytecode::limit))]
    StringTooLong,

    #[error("emitted code exceeds the 16-bit address space")]
    #[diagnostic(code(ark::bytecode::limit))]
    CodeTooLarge,

    /// An unresolved label at finalization is a bug in the emitter, not in
    /// the input program.
    #[error("internal compiler error: unresolved label {0}")]
    #[diagnostic(code(ark::bytecode::internal))]
    UnresolvedLabel(usize),
}
