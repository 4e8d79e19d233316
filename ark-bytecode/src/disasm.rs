use std::fmt::Write;

use crate::error::BytecodeError;
use crate::opcode::Opcode;
use crate::program::{ArkbProgram, Constant, VERSION};

/// Renders ARKB bytes as a readable listing: the constant pool, then one
/// line per instruction with its code offset, mnemonic, and operands.
/// Total over compiler output — every emitted byte decodes to a known
/// opcode or this returns an error naming the offending byte.
pub fn disassemble(bytes: &[u8]) -> Result<String, BytecodeError> {
    let program = ArkbProgram::from_bytes(bytes)?;
    let mut out = String::new();

    let _ = writeln!(out, "; ARKB v{VERSION}");
    let _ = writeln!(out, "; constants: {}", program.constants.len());
    for (i, c) in program.constants.iter().enumerate() {
        let rendered = match c {
            Constant::Integer(n) => format!("Integer {n}"),
            Constant::Str(s) => format!("String {s:?}"),
            Constant::Bool(b) => format!("Boolean {b}"),
            Constant::Float(x) => format!("Float {x}"),
        };
        let _ = writeln!(out, ";   [{i}] {rendered}");
    }

    let code = &program.code;
    let mut pc = 0usize;
    while pc < code.len() {
        let byte = code[pc];
        let op = Opcode::from_byte(byte).ok_or(BytecodeError::UnknownOpcode {
            byte,
            offset: pc,
        })?;
        let _ = write!(out, "{pc:04}  {}", op.mnemonic());
        let after = pc + 1;
        match op {
            Opcode::PushConst => {
                let idx = read_u16(code, after)?;
                let _ = write!(out, " {idx}");
                if let Some(c) = program.constants.get(idx as usize) {
                    match c {
                        Constant::Integer(n) => {
                            let _ = write!(out, "\t; {n}");
                        }
                        Constant::Str(s) => {
                            let _ = write!(out, "\t; {s:?}");
                        }
                        Constant::Bool(b) => {
                            let _ = write!(out, "\t; {b}");
                        }
                        Constant::Float(x) => {
                            let _ = write!(out, "\t; {x}");
                        }
                    }
                }
            }
            Opcode::LoadVar | Opcode::StoreVar => {
                let slot = read_u16(code, after)?;
                let _ = write!(out, " {slot}");
            }
            Opcode::Jump | Opcode::JumpIfFalse => {
                let target = read_u16(code, after)?;
                let _ = write!(out, " {target:04}");
            }
            Opcode::Call => {
                let addr = read_u16(code, after)?;
                let argc = *code
                    .get(after + 2)
                    .ok_or(BytecodeError::Truncated("CALL argc"))?;
                let _ = write!(out, " {addr:04} argc={argc}");
            }
            _ => {}
        }
        out.push('\n');
        pc = after + op.operand_width();
    }

    Ok(out)
}

fn read_u16(code: &[u8], at: usize) -> Result<u16, BytecodeError> {
    let hi = *code.get(at).ok_or(BytecodeError::Truncated("operand"))?;
    let lo = *code
        .get(at + 1)
        .ok_or(BytecodeError::Truncated("operand"))?;
    Ok(u16::from_be_bytes([hi, lo]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_names_every_instruction() {
        let program = ArkbProgram {
            constants: vec![Constant::Integer(5)],
            code: vec![
                0x01, 0x00, 0x00, // PUSH_CONST 0
                0x12, // DUP
                0x04, // ADD
                0x0F, // PRINT
                0x10, // HALT
            ],
        };
        let text = disassemble(&program.to_bytes()).unwrap();
        for mnemonic in ["PUSH_CONST", "DUP", "ADD", "PRINT", "HALT"] {
            assert!(text.contains(mnemonic), "missing {mnemonic} in {text}");
        }
        assert!(!text.contains("UNKNOWN"));
    }

    #[test]
    fn foreign_opcode_is_an_error_with_offset() {
        let program = ArkbProgram {
            constants: vec![],
            code: vec![0x10, 0xEE],
        };
        let err = disassemble(&program.to_bytes()).unwrap_err();
        assert_eq!(
            err,
            BytecodeError::UnknownOpcode {
                byte: 0xEE,
                offset: 1
            }
        );
    }
}
