//! Bytecode encoding, assembly and disassembly.

pub mod builder;
pub mod disasm;
pub mod opcode;

pub use builder::{BytecodeBuilder, Label};
pub use disasm::{Instruction, Operands, decode, decode_all, disassemble};
pub use opcode::Opcode;
