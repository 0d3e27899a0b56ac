//! Instruction decoding and listings.

use std::fmt;

use super::opcode::{Opcode, OperandKind, read_i16, read_u24};
use crate::error::{Error, Result};
use crate::gc::heap::Heap;
use crate::gc::object::BytecodeRef;

/// Decoded operands of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operands
    None,
    /// An unsigned count
    Byte(u8),
    /// An inline integer
    Int(i8),
    /// A literal index
    Literal(u32),
    /// A jump offset relative to the opcode byte
    Offset(i16),
    /// Name, params, docs and body literal indices
    Lambda([u32; 4]),
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// The opcode
    pub opcode: Opcode,
    /// Its operands
    pub operands: Operands,
}

impl Instruction {
    /// Offset of the following instruction.
    pub fn next(&self) -> usize {
        self.offset + self.opcode.encoded_len()
    }

    /// Absolute target of a jump or `try`.
    pub fn target(&self) -> Option<usize> {
        match self.operands {
            Operands::Offset(off) => self.offset.checked_add_signed(isize::from(off)),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}  {}", self.offset, self.opcode.mnemonic())?;
        match self.operands {
            Operands::None => Ok(()),
            Operands::Byte(n) => write!(f, " {}", n),
            Operands::Int(n) => write!(f, " {}", n),
            Operands::Literal(i) => write!(f, " #{}", i),
            Operands::Offset(off) => match self.target() {
                Some(target) => write!(f, " {:+} -> {:04x}", off, target),
                None => write!(f, " {:+}", off),
            },
            Operands::Lambda([name, params, docs, body]) => {
                write!(f, " #{} #{} #{} #{}", name, params, docs, body)
            }
        }
    }
}

/// Decodes the instruction at `offset`.
pub fn decode(ops: &[u8], offset: usize) -> Result<Instruction> {
    let byte = *ops
        .get(offset)
        .ok_or_else(|| Error::bytecode(format!("offset {:#x} past end of code", offset)))?;
    let opcode = Opcode::try_from(byte)
        .map_err(|b| Error::bytecode(format!("unknown opcode {:#04x} at {:#x}", b, offset)))?;
    let truncated = || {
        Error::bytecode(format!(
            "{} at {:#x} is truncated",
            opcode.mnemonic(),
            offset
        ))
    };
    let at = offset + 1;
    let operands = match opcode.operands() {
        OperandKind::None => Operands::None,
        OperandKind::Byte => Operands::Byte(*ops.get(at).ok_or_else(truncated)?),
        OperandKind::SignedByte => Operands::Int(*ops.get(at).ok_or_else(truncated)? as i8),
        OperandKind::Literal => Operands::Literal(read_u24(ops, at).ok_or_else(truncated)?),
        OperandKind::Offset => Operands::Offset(read_i16(ops, at).ok_or_else(truncated)?),
        OperandKind::Lambda => {
            let mut indices = [0; 4];
            for (i, index) in indices.iter_mut().enumerate() {
                *index = read_u24(ops, at + 3 * i).ok_or_else(truncated)?;
            }
            Operands::Lambda(indices)
        }
    };
    Ok(Instruction {
        offset,
        opcode,
        operands,
    })
}

/// Decodes a whole instruction stream.
pub fn decode_all(ops: &[u8]) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < ops.len() {
        let inst = decode(ops, offset)?;
        offset = inst.next();
        out.push(inst);
    }
    Ok(out)
}

/// Renders a listing of `code`, one instruction per line, with literal
/// operands shown alongside their index.
pub fn disassemble(heap: &Heap, code: BytecodeRef) -> Result<String> {
    let bytecode = heap.get(code)?;
    let literals = &heap.get(bytecode.literals)?.items;
    let literal = |i: u32| match literals.get(i as usize) {
        Some(value) => value.display(heap).to_string(),
        None => String::from("<out of range>"),
    };

    let mut out = String::new();
    for inst in decode_all(&bytecode.ops)? {
        out.push_str(&inst.to_string());
        match inst.operands {
            Operands::Literal(i) => {
                out.push_str("\t; ");
                out.push_str(&literal(i));
            }
            Operands::Lambda([name, params, ..]) => {
                out.push_str(&format!("\t; {} {}", literal(name), literal(params)));
            }
            _ => {}
        }
        out.push('\n');
    }
    Ok(out)
}
