//! Value representation.

use std::fmt;

use crate::gc::heap::Heap;
use crate::gc::object::{
    ArrayRef, BufferRef, BytecodeRef, ClosureRef, NativeRef, PairRef, StringRef, SymbolRef,
    TreeBoxRef,
};

/// A tagged value.
///
/// Scalars are stored inline. Everything else is a typed handle into one of
/// the heap's slabs, so values are `Copy` and carry no ownership.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// The empty list, also used as "no value".
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Cons cell
    Pair(PairRef),
    /// Immutable string
    String(StringRef),
    /// Interned symbol
    Symbol(SymbolRef),
    /// Compiled procedure
    Lambda(ClosureRef),
    /// Compiled macro
    Macro(ClosureRef),
    /// A closure used as a first-class environment
    Environment(ClosureRef),
    /// Host function
    NativeFunc(NativeRef),
    /// Environment tree, boxed so inserts show through every alias
    Tree(TreeBoxRef),
    /// Array of values
    Array(ArrayRef),
    /// Compiled instruction stream
    Bytecode(BytecodeRef),
    /// Raw bytes
    Buffer(BufferRef),
    /// Raised condition: `(kind message irritant [trace])`
    Exception(PairRef),
}

impl Value {
    /// Returns true for `Nil`.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness used by conditional jumps: only nil and false are falsy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Returns true for numeric values.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the symbol payload, if any.
    pub fn as_symbol(&self) -> Option<SymbolRef> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    /// Returns the closure behind a lambda, macro or environment.
    pub fn as_closure(&self) -> Option<ClosureRef> {
        match self {
            Value::Lambda(c) | Value::Macro(c) | Value::Environment(c) => Some(*c),
            _ => None,
        }
    }

    /// Name of the value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Pair(_) => "pair",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Lambda(_) => "lambda",
            Value::Macro(_) => "macro",
            Value::Environment(_) => "environment",
            Value::NativeFunc(_) => "native-function",
            Value::Tree(_) => "tree",
            Value::Array(_) => "array",
            Value::Bytecode(_) => "bytecode-array",
            Value::Buffer(_) => "buffer",
            Value::Exception(_) => "exception",
        }
    }

    /// Diagnostic rendering for traces and the command line.
    ///
    /// This is not a reader-compatible printer: nesting and list length are
    /// cut off, and objects without a textual form print as `#<type>`.
    pub fn display(self, heap: &Heap) -> ValueDisplay<'_> {
        ValueDisplay {
            heap,
            value: self,
            depth: 0,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

const MAX_DISPLAY_DEPTH: usize = 8;
const MAX_DISPLAY_ITEMS: usize = 32;

/// Formatter returned by [`Value::display`].
pub struct ValueDisplay<'h> {
    heap: &'h Heap,
    value: Value,
    depth: usize,
}

impl ValueDisplay<'_> {
    fn nested(&self, value: Value) -> Self {
        ValueDisplay {
            heap: self.heap,
            value,
            depth: self.depth + 1,
        }
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, head: PairRef) -> fmt::Result {
        f.write_str("(")?;
        let mut cursor = Value::Pair(head);
        let mut count = 0;
        while let Value::Pair(p) = cursor {
            let Ok(pair) = self.heap.get(p) else {
                return f.write_str("#<dangling>)");
            };
            if count > 0 {
                f.write_str(" ")?;
            }
            if count == MAX_DISPLAY_ITEMS {
                return f.write_str("...)");
            }
            write!(f, "{}", self.nested(pair.car))?;
            cursor = pair.cdr;
            count += 1;
        }
        if !cursor.is_nil() {
            write!(f, " . {}", self.nested(cursor))?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.depth > MAX_DISPLAY_DEPTH {
            return f.write_str("...");
        }
        match self.value {
            Value::Nil => f.write_str("nil"),
            Value::Bool(true) => f.write_str("#t"),
            Value::Bool(false) => f.write_str("#f"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => match self.heap.get(s) {
                Ok(s) => write!(f, "{:?}", s.as_str()),
                Err(_) => f.write_str("#<dangling>"),
            },
            Value::Symbol(s) => match self.heap.symbol_name(s) {
                Ok(name) => f.write_str(name),
                Err(_) => f.write_str("#<dangling>"),
            },
            Value::Pair(p) => self.write_list(f, p),
            Value::Exception(p) => {
                f.write_str("#<exception ")?;
                self.write_list(f, p)?;
                f.write_str(">")
            }
            Value::Lambda(c) | Value::Macro(c) => {
                let name = self
                    .heap
                    .get(c)
                    .ok()
                    .and_then(|closure| closure.name)
                    .and_then(|s| self.heap.symbol_name(s).ok());
                match name {
                    Some(name) => write!(f, "#<{} {}>", self.value.type_name(), name),
                    None => write!(f, "#<{}>", self.value.type_name()),
                }
            }
            Value::NativeFunc(n) => match self
                .heap
                .get(n)
                .ok()
                .and_then(|native| self.heap.symbol_name(native.name).ok())
            {
                Some(name) => write!(f, "#<native {}>", name),
                None => f.write_str("#<native>"),
            },
            Value::Array(a) => match self.heap.get(a) {
                Ok(array) => {
                    f.write_str("#[")?;
                    for (i, item) in array.items.iter().take(MAX_DISPLAY_ITEMS).enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", self.nested(*item))?;
                    }
                    if array.items.len() > MAX_DISPLAY_ITEMS {
                        f.write_str(" ...")?;
                    }
                    f.write_str("]")
                }
                Err(_) => f.write_str("#<dangling>"),
            },
            other => write!(f, "#<{}>", other.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Float(0.0).is_truthy());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Tree(crate::gc::slab::Ref::new(0)).type_name(), "tree");
    }

    #[test]
    fn test_default_is_nil() {
        assert_eq!(Value::default(), Value::Nil);
        assert!(Value::default().is_nil());
    }
}
