#![forbid(unsafe_code)]

//! The ARKB stack machine.
//!
//! Executes compiled bytes under the limits configured in the runtime
//! context: a step counter against runaway loops, an operand-stack depth
//! cap, and per-opcode operand validation. Errors carry the program
//! counter; bytecode has no symbolic frame information by design.

mod error;
mod vm;

pub use error::{VmError, VmErrorKind};
pub use vm::{Vm, run_vm};
