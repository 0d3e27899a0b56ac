//! The instruction set.
//!
//! Operands follow the opcode byte. Literal operands are 3-byte big-endian
//! indices into the code's literal array; jump offsets are 2-byte signed
//! big-endian distances measured from the opcode byte.

use corvid_macros::opcodes;

opcodes! {
    /// A VM instruction.
    pub enum Opcode: u8 {
        /// Do nothing
        Nop = 0x00 => ("nop", 1),
        /// Return the top of stack from the current call
        Ret = 0x01 => ("ret", 1),
        /// Push a signed byte as an integer
        PushIntByte = 0x02 => ("push/int/byte", 2),
        /// Add two integers
        IntAdd = 0x03 => ("add/int", 1),
        /// Apply a function to the given number of arguments
        Apply = 0x04 => ("apply", 2),
        /// Push the value bound to a symbol
        Get = 0x05 => ("get", 4),
        /// Push a literal
        PushLiteral = 0x06 => ("push/lit", 4),
        /// Bind a symbol in the current closure
        Def = 0x07 => ("def", 4),
        /// Overwrite an existing binding
        Set = 0x08 => ("set", 4),
        /// Unconditional jump
        Jmp = 0x09 => ("jmp", 3),
        /// Jump if truthy
        Jt = 0x0A => ("jt", 3),
        /// Jump if falsy
        Jf = 0x0B => ("jf", 3),
        /// Duplicate the top of stack
        Dup = 0x0C => ("dup", 1),
        /// Discard the top of stack
        Drop = 0x0D => ("drop", 1),
        /// Head of a pair
        Car = 0x11 => ("car", 1),
        /// Tail of a pair
        Cdr = 0x12 => ("cdr", 1),
        /// Push the current closure as an environment
        ClosurePush = 0x13 => ("closure/push", 1),
        /// Allocate a pair
        Cons = 0x14 => ("cons", 1),
        /// Enter a let scope
        Let = 0x15 => ("let", 1),
        /// Leave the innermost frame
        ClosurePop = 0x16 => ("closure/pop", 1),
        /// Create a lambda from name, params, docs and body literals
        Fn = 0x17 => ("fn", 13),
        /// Create a macro from name, params, docs and body literals
        Macro = 0x18 => ("macro", 13),
        /// Install an exception handler
        Try = 0x19 => ("try", 3),
        /// Push true
        PushTrue = 0x1B => ("push/true", 1),
        /// Push false
        PushFalse = 0x1C => ("push/false", 1),
        /// Evaluate a bytecode array in an environment
        Eval = 0x1D => ("eval", 1),
        /// Less than
        Lt = 0x1E => ("<", 1),
        /// Less than or equal
        Le = 0x1F => ("<=", 1),
        /// Equal
        Eq = 0x20 => ("==", 1),
        /// Greater than or equal
        Ge = 0x21 => (">=", 1),
        /// Greater than
        Gt = 0x22 => (">", 1),
        /// Increment an integer
        IncInt = 0x23 => ("inc/int", 1),
        /// Push nil
        PushNil = 0x24 => ("push/nil", 1),
        /// Generic addition
        Add = 0x25 => ("+", 1),
        /// Generic subtraction
        Sub = 0x26 => ("-", 1),
        /// Generic multiplication
        Mul = 0x27 => ("*", 1),
        /// Generic division
        Div = 0x28 => ("/", 1),
        /// Remainder
        Rem = 0x29 => ("rem", 1),
        /// Whether a number is zero
        ZeroPred = 0x2A => ("zero?", 1),
        /// Second element of a list
        Cadr = 0x2C => ("cadr", 1),
        /// Collect the given number of values into a list
        List = 0x2E => ("list", 2),
        /// Raise the top of stack
        Throw = 0x2F => ("throw", 1),
        /// Apply a function to an argument list
        ApplyCollection = 0x30 => ("apply/collection", 1),
        /// Shift left
        Shl = 0x31 => ("bit/shl", 1),
        /// Arithmetic shift right
        Shr = 0x32 => ("bit/shr", 1),
        /// Bitwise and
        BitAnd = 0x33 => ("bit/and", 1),
        /// Bitwise or
        BitOr = 0x34 => ("bit/or", 1),
        /// Bitwise exclusive or
        BitXor = 0x35 => ("bit/xor", 1),
        /// Bitwise complement
        BitNot = 0x36 => ("bit/not", 1),
        /// Not equal
        Ne = 0x38 => ("!=", 1),
    }
}

/// Shape of an instruction's operand bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operands
    None,
    /// One unsigned byte
    Byte,
    /// One signed byte
    SignedByte,
    /// A literal index
    Literal,
    /// A jump offset
    Offset,
    /// Four literal indices
    Lambda,
}

impl Opcode {
    /// Operand layout of this opcode.
    pub const fn operands(self) -> OperandKind {
        match self {
            Opcode::PushIntByte => OperandKind::SignedByte,
            Opcode::Apply | Opcode::List => OperandKind::Byte,
            Opcode::Get | Opcode::PushLiteral | Opcode::Def | Opcode::Set => OperandKind::Literal,
            Opcode::Jmp | Opcode::Jt | Opcode::Jf | Opcode::Try => OperandKind::Offset,
            Opcode::Fn | Opcode::Macro => OperandKind::Lambda,
            _ => OperandKind::None,
        }
    }
}

/// Largest literal index a 3-byte operand can hold, plus one.
pub const MAX_LITERALS: usize = 1 << 24;

/// Longest relative jump, in bytes, either way.
pub const MAX_JUMP: i16 = i16::MAX;

/// Reads a 3-byte big-endian literal index.
#[inline]
pub fn read_u24(ops: &[u8], at: usize) -> Option<u32> {
    let bytes = ops.get(at..at + 3)?;
    Some(u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]))
}

/// Reads a 2-byte big-endian signed offset.
#[inline]
pub fn read_i16(ops: &[u8], at: usize) -> Option<i16> {
    let bytes = ops.get(at..at + 2)?;
    Some(i16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Appends a 3-byte big-endian literal index.
pub fn write_u24(ops: &mut Vec<u8>, index: u32) {
    ops.extend_from_slice(&index.to_be_bytes()[1..]);
}

/// Overwrites a 2-byte big-endian signed offset.
pub fn patch_i16(ops: &mut [u8], at: usize, offset: i16) {
    ops[at..at + 2].copy_from_slice(&offset.to_be_bytes());
}
