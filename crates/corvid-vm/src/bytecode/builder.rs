//! Bytecode assembly.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::opcode::{MAX_JUMP, MAX_LITERALS, Opcode, OperandKind, patch_i16, write_u24};
use crate::error::{Error, Result};
use crate::gc::heap::Heap;
use crate::gc::object::{Array, BytecodeArray, BytecodeRef, SymbolRef};
use crate::gc::roots::Root;
use crate::runtime::value::Value;

/// A jump target, bound to an offset with [`BytecodeBuilder::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug)]
struct Fixup {
    /// Offset of the jump's opcode byte
    at: usize,
    label: Label,
}

/// Incrementally assembles a bytecode array and its literal pool.
///
/// Literal values are not rooted while the builder holds them; the caller
/// keeps them reachable until [`BytecodeBuilder::finish`] returns.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    ops: Vec<u8>,
    literals: Vec<Value>,
    symbols: FxHashMap<SymbolRef, u32>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl BytecodeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes emitted so far.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Literals pooled so far.
    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    /// Emits an operand-less instruction.
    ///
    /// # Panics
    ///
    /// Panics if `op` takes operands.
    pub fn op(&mut self, op: Opcode) -> &mut Self {
        assert_eq!(
            op.operands(),
            OperandKind::None,
            "{} takes operands",
            op.mnemonic()
        );
        self.ops.push(op as u8);
        self
    }

    /// Emits an instruction with a single byte operand.
    ///
    /// # Panics
    ///
    /// Panics if `op` does not take a byte operand.
    pub fn op_byte(&mut self, op: Opcode, operand: u8) -> &mut Self {
        assert!(
            matches!(op.operands(), OperandKind::Byte | OperandKind::SignedByte),
            "{} does not take a byte",
            op.mnemonic()
        );
        self.ops.push(op as u8);
        self.ops.push(operand);
        self
    }

    /// Pushes an integer, inline when it fits in a signed byte.
    pub fn push_int(&mut self, n: i64) -> Result<&mut Self> {
        match i8::try_from(n) {
            Ok(byte) => Ok(self.op_byte(Opcode::PushIntByte, byte as u8)),
            Err(_) => self.push(Value::Int(n)),
        }
    }

    /// Pushes any value, using the dedicated opcodes for nil and booleans.
    pub fn push(&mut self, value: Value) -> Result<&mut Self> {
        match value {
            Value::Nil => Ok(self.op(Opcode::PushNil)),
            Value::Bool(true) => Ok(self.op(Opcode::PushTrue)),
            Value::Bool(false) => Ok(self.op(Opcode::PushFalse)),
            Value::Int(n) if i8::try_from(n).is_ok() => self.push_int(n),
            other => self.op_literal(Opcode::PushLiteral, other),
        }
    }

    /// Emits `get` for `sym`.
    pub fn get(&mut self, sym: SymbolRef) -> Result<&mut Self> {
        self.op_literal(Opcode::Get, Value::Symbol(sym))
    }

    /// Emits `def` for `sym`.
    pub fn def(&mut self, sym: SymbolRef) -> Result<&mut Self> {
        self.op_literal(Opcode::Def, Value::Symbol(sym))
    }

    /// Emits `set` for `sym`.
    pub fn set(&mut self, sym: SymbolRef) -> Result<&mut Self> {
        self.op_literal(Opcode::Set, Value::Symbol(sym))
    }

    /// Emits `apply` with `argc` arguments.
    pub fn apply(&mut self, argc: u8) -> &mut Self {
        self.op_byte(Opcode::Apply, argc)
    }

    /// Pools `value`, returning its index. Symbols are pooled once.
    pub fn literal(&mut self, value: Value) -> Result<u32> {
        if let Value::Symbol(sym) = value {
            if let Some(index) = self.symbols.get(&sym) {
                return Ok(*index);
            }
        }
        if self.literals.len() >= MAX_LITERALS {
            return Err(Error::bytecode(format!(
                "literal pool exceeds {} entries",
                MAX_LITERALS
            )));
        }
        let index = self.literals.len() as u32;
        self.literals.push(value);
        if let Value::Symbol(sym) = value {
            self.symbols.insert(sym, index);
        }
        Ok(index)
    }

    /// Emits an instruction whose operand is a literal.
    pub fn op_literal(&mut self, op: Opcode, value: Value) -> Result<&mut Self> {
        if op.operands() != OperandKind::Literal {
            return Err(Error::bytecode(format!(
                "{} does not take a literal",
                op.mnemonic()
            )));
        }
        let index = self.literal(value)?;
        self.ops.push(op as u8);
        write_u24(&mut self.ops, index);
        Ok(self)
    }

    /// Emits `fn` or `macro` from its four parts.
    pub fn lambda(
        &mut self,
        op: Opcode,
        name: Value,
        params: Value,
        docs: Value,
        body: Value,
    ) -> Result<&mut Self> {
        if op.operands() != OperandKind::Lambda {
            return Err(Error::bytecode(format!(
                "{} does not build a procedure",
                op.mnemonic()
            )));
        }
        let indices = [
            self.literal(name)?,
            self.literal(params)?,
            self.literal(docs)?,
            self.literal(body)?,
        ];
        self.ops.push(op as u8);
        for index in indices {
            write_u24(&mut self.ops, index);
        }
        Ok(self)
    }

    /// Creates an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> Result<&mut Self> {
        let offset = self.ops.len();
        let slot = self
            .labels
            .get_mut(label.0)
            .ok_or_else(|| Error::bytecode(format!("unknown label {}", label.0)))?;
        if slot.is_some() {
            return Err(Error::bytecode(format!("label {} bound twice", label.0)));
        }
        *slot = Some(offset);
        Ok(self)
    }

    /// Emits a jump or `try` to `label`, patched once the label is bound.
    pub fn jump(&mut self, op: Opcode, label: Label) -> Result<&mut Self> {
        if op.operands() != OperandKind::Offset {
            return Err(Error::bytecode(format!("{} is not a jump", op.mnemonic())));
        }
        self.fixups.push(Fixup {
            at: self.ops.len(),
            label,
        });
        self.ops.extend_from_slice(&[op as u8, 0, 0]);
        Ok(self)
    }

    /// Resolves jumps and returns the raw instruction stream and literals.
    pub fn assemble(mut self) -> Result<(Vec<u8>, Vec<Value>)> {
        for fixup in std::mem::take(&mut self.fixups) {
            let target = self
                .labels
                .get(fixup.label.0)
                .copied()
                .flatten()
                .ok_or_else(|| Error::bytecode(format!("label {} never bound", fixup.label.0)))?;
            let distance = target as i64 - fixup.at as i64;
            let offset = i16::try_from(distance)
                .ok()
                .filter(|offset| *offset >= -MAX_JUMP)
                .ok_or_else(|| {
                    Error::bytecode(format!(
                        "jump at {} to {} is out of range",
                        fixup.at, target
                    ))
                })?;
            patch_i16(&mut self.ops, fixup.at + 1, offset);
        }
        Ok((self.ops, self.literals))
    }

    /// Allocates the finished bytecode array.
    pub fn finish(self, heap: &mut Heap) -> Result<BytecodeRef> {
        let (ops, literals) = self.assemble()?;
        let literals = heap.allocate(Array { items: literals })?;
        let mut scope = heap.root_scope();
        scope.push(Root::Array(literals));
        scope.allocate(BytecodeArray {
            ops: Rc::from(ops),
            literals,
        })
    }
}
