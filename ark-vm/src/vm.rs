use ark_bytecode::{ArkbProgram, Constant, Opcode};
use ark_core::{RuntimeContext, Value};

use crate::error::{VmError, VmErrorKind};

/// Decodes and executes an ARKB program to completion.
pub fn run_vm(ctx: &RuntimeContext, bytes: &[u8]) -> Result<Value, VmError> {
    Vm::new(ctx, bytes)?.run()
}

struct Frame {
    return_pc: usize,
    /// Operand-stack height at entry, with the arguments already pushed
    /// popped off; RETURN truncates back to this before pushing the
    /// return value, so callee leftovers never leak into the caller.
    base: usize,
}

pub struct Vm<'ctx> {
    ctx: &'ctx RuntimeContext,
    program: ArkbProgram,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    vars: Vec<Option<Value>>,
    pc: usize,
    steps: u64,
    trace: bool,
}

impl<'ctx> Vm<'ctx> {
    pub fn new(ctx: &'ctx RuntimeContext, bytes: &[u8]) -> Result<Self, VmError> {
        let program =
            ArkbProgram::from_bytes(bytes).map_err(|e| VmError::new(e.into(), 0))?;
        Ok(Self {
            ctx,
            program,
            stack: Vec::new(),
            frames: Vec::new(),
            vars: Vec::new(),
            pc: 0,
            steps: 0,
            trace: false,
        })
    }

    /// Trace mode writes each decoded instruction to the print sink
    /// before executing it.
    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn run(&mut self) -> Result<Value, VmError> {
        let max_steps = self.ctx.limits().max_steps;

        while self.pc < self.program.code.len() {
            self.steps += 1;
            if self.steps > max_steps {
                return Err(self.fault(VmErrorKind::ExecutionTimeout(max_steps)));
            }

            let at = self.pc;
            let byte = self.program.code[at];
            let op = Opcode::from_byte(byte).ok_or_else(|| {
                self.fault_at(
                    VmErrorKind::Malformed(ark_bytecode::BytecodeError::UnknownOpcode {
                        byte,
                        offset: at,
                    }),
                    at,
                )
            })?;

            let width = op.operand_width();
            if at + 1 + width > self.program.code.len() {
                return Err(self.fault_at(
                    VmErrorKind::Malformed(ark_bytecode::BytecodeError::Truncated("operand")),
                    at,
                ));
            }
            if self.trace {
                self.ctx
                    .print_line(&format!("[vm] {at:04} {}", op.mnemonic()));
            }
            if self.stack.len() < op.stack_inputs() {
                return Err(self.fault_at(VmErrorKind::StackUnderflow(op.mnemonic()), at));
            }

            self.pc = at + 1 + width;
            match op {
                Opcode::PushConst => {
                    let idx = self.operand_u16(at);
                    let value = self
                        .program
                        .constants
                        .get(idx as usize)
                        .map(constant_value)
                        .ok_or_else(|| self.fault_at(VmErrorKind::BadConstant(idx), at))?;
                    self.push(value, at)?;
                }
                Opcode::LoadVar => {
                    let slot = self.operand_u16(at);
                    let value = self
                        .vars
                        .get(slot as usize)
                        .and_then(|v| v.clone())
                        .ok_or_else(|| self.fault_at(VmErrorKind::UnsetVariable(slot), at))?;
                    self.push(value, at)?;
                }
                Opcode::StoreVar => {
                    let slot = self.operand_u16(at) as usize;
                    let value = self.pop();
                    if self.vars.len() <= slot {
                        self.vars.resize(slot + 1, None);
                    }
                    self.vars[slot] = Some(value);
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::CmpEq
                | Opcode::CmpLt
                | Opcode::CmpGt => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    let out = self.binary(op, lhs, rhs, at)?;
                    self.push(out, at)?;
                }
                Opcode::Jump => {
                    self.pc = self.operand_u16(at) as usize;
                }
                Opcode::JumpIfFalse => {
                    let cond = self.pop();
                    if !cond.is_truthy() {
                        self.pc = self.operand_u16(at) as usize;
                    }
                }
                Opcode::Call => {
                    let addr = self.operand_u16(at) as usize;
                    let argc = self.program.code[at + 3] as usize;
                    if self.stack.len() < argc {
                        return Err(self.fault_at(VmErrorKind::StackUnderflow("CALL"), at));
                    }
                    if self.frames.len() >= self.ctx.limits().max_stack_depth {
                        return Err(self.fault_at(
                            VmErrorKind::StackOverflow(self.ctx.limits().max_stack_depth),
                            at,
                        ));
                    }
                    self.frames.push(Frame {
                        return_pc: self.pc,
                        base: self.stack.len() - argc,
                    });
                    self.pc = addr;
                }
                Opcode::Return => {
                    let frame = self
                        .frames
                        .pop()
                        .ok_or_else(|| self.fault_at(VmErrorKind::StackUnderflow("RETURN"), at))?;
                    let value = if self.stack.len() > frame.base {
                        self.pop()
                    } else {
                        Value::Unit
                    };
                    self.stack.truncate(frame.base);
                    self.push(value, at)?;
                    self.pc = frame.return_pc;
                }
                Opcode::Print => {
                    let value = self.pop();
                    self.ctx.print_line(&value.to_string());
                }
                Opcode::Halt => break,
                Opcode::Pop => {
                    self.pop();
                }
                Opcode::Dup => {
                    let top = self.stack[self.stack.len() - 1].clone();
                    self.push(top, at)?;
                }
                Opcode::Neg => {
                    let value = self.pop();
                    let out = match value {
                        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
                        Value::Float(x) => Value::Float(-x),
                        other => {
                            return Err(self.fault_at(
                                VmErrorKind::UnaryTypeMismatch {
                                    op: "NEG",
                                    operand: other.type_name(),
                                },
                                at,
                            ));
                        }
                    };
                    self.push(out, at)?;
                }
                Opcode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()), at)?;
                }
            }
        }

        Ok(self.stack.pop().unwrap_or(Value::Unit))
    }

    fn binary(
        &self,
        op: Opcode,
        lhs: Value,
        rhs: Value,
        at: usize,
    ) -> Result<Value, VmError> {
        use Value::{Float, Integer, Str};
        let out = match (op, &lhs, &rhs) {
            (Opcode::Add, Str(_), _) | (Opcode::Add, _, Str(_)) => {
                Str(format!("{lhs}{rhs}"))
            }
            (Opcode::Add, Integer(a), Integer(b)) => Integer(a.wrapping_add(*b)),
            (Opcode::Sub, Integer(a), Integer(b)) => Integer(a.wrapping_sub(*b)),
            (Opcode::Mul, Integer(a), Integer(b)) => Integer(a.wrapping_mul(*b)),
            (Opcode::Div, Integer(a), Integer(b)) => {
                if *b == 0 {
                    return Err(self.fault_at(VmErrorKind::DivisionByZero, at));
                }
                Integer(a.wrapping_div(*b))
            }
            (Opcode::Mod, Integer(a), Integer(b)) => {
                if *b == 0 {
                    return Err(self.fault_at(VmErrorKind::DivisionByZero, at));
                }
                Integer(a.wrapping_rem(*b))
            }
            (Opcode::Add, Float(a), Float(b)) => Float(a + b),
            (Opcode::Sub, Float(a), Float(b)) => Float(a - b),
            (Opcode::Mul, Float(a), Float(b)) => Float(a * b),
            (Opcode::Div, Float(a), Float(b)) => {
                if *b == 0.0 {
                    return Err(self.fault_at(VmErrorKind::DivisionByZero, at));
                }
                Float(a / b)
            }
            (Opcode::Mod, Float(a), Float(b)) => {
                if *b == 0.0 {
                    return Err(self.fault_at(VmErrorKind::DivisionByZero, at));
                }
                Float(a % b)
            }
            (Opcode::CmpEq, _, _) => Value::Bool(lhs == rhs),
            (Opcode::CmpLt, Integer(a), Integer(b)) => Value::Bool(a < b),
            (Opcode::CmpGt, Integer(a), Integer(b)) => Value::Bool(a > b),
            (Opcode::CmpLt, Float(a), Float(b)) => Value::Bool(a < b),
            (Opcode::CmpGt, Float(a), Float(b)) => Value::Bool(a > b),
            (Opcode::CmpLt, Str(a), Str(b)) => Value::Bool(a < b),
            (Opcode::CmpGt, Str(a), Str(b)) => Value::Bool(a > b),
            _ => {
                return Err(self.fault_at(
                    VmErrorKind::TypeMismatch {
                        op: op.mnemonic(),
                        lhs: lhs.type_name(),
                        rhs: rhs.type_name(),
                    },
                    at,
                ));
            }
        };
        Ok(out)
    }

    fn operand_u16(&self, at: usize) -> u16 {
        u16::from_be_bytes([self.program.code[at + 1], self.program.code[at + 2]])
    }

    /// Depth-checked push; the operand stack never grows past the
    /// configured cap.
    fn push(&mut self, value: Value, at: usize) -> Result<(), VmError> {
        let limit = self.ctx.limits().max_stack_depth;
        if self.stack.len() >= limit {
            return Err(self.fault_at(VmErrorKind::StackOverflow(limit), at));
        }
        self.stack.push(value);
        Ok(())
    }

    /// Only called after the operand-count validation for the opcode.
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Unit)
    }

    fn fault(&self, kind: VmErrorKind) -> VmError {
        VmError::new(kind, self.pc)
    }

    fn fault_at(&self, kind: VmErrorKind, pc: usize) -> VmError {
        VmError::new(kind, pc)
    }
}

fn constant_value(c: &Constant) -> Value {
    match c {
        Constant::Integer(n) => Value::Integer(*n),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Float(x) => Value::Float(*x),
    }
}
