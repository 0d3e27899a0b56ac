//! Heap object layouts.
//!
//! Each type here lives in its own slab. Cross references are typed slab
//! handles; the collector discovers them through [`GcTrace`].

use std::fmt;
use std::rc::Rc;

use super::heap::Heap;
use super::roots::{Root, RootMark};
use super::slab::Ref;
use crate::error::Error;
use crate::runtime::value::Value;

/// Handle to a [`Pair`].
pub type PairRef = Ref<Pair>;
/// Handle to a [`Str`].
pub type StringRef = Ref<Str>;
/// Handle to a [`Symbol`].
pub type SymbolRef = Ref<Symbol>;
/// Handle to a [`Closure`].
pub type ClosureRef = Ref<Closure>;
/// Handle to a [`TreeNode`].
pub type TreeRef = Ref<TreeNode>;
/// Handle to a [`TreeBox`].
pub type TreeBoxRef = Ref<TreeBox>;
/// Handle to an [`Array`].
pub type ArrayRef = Ref<Array>;
/// Handle to a [`BytecodeArray`].
pub type BytecodeRef = Ref<BytecodeArray>;
/// Handle to a [`NativeFunction`].
pub type NativeRef = Ref<NativeFunction>;
/// Handle to a [`Buffer`].
pub type BufferRef = Ref<Buffer>;

/// Trait for objects that hold references to other heap objects.
pub trait GcTrace {
    /// Appends every outgoing reference to `refs`.
    fn trace_refs(&self, refs: &mut Vec<Root>);
}

/// A cons cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    /// Head
    pub car: Value,
    /// Tail
    pub cdr: Value,
}

impl GcTrace for Pair {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.push(Root::Value(self.car));
        refs.push(Root::Value(self.cdr));
    }
}

/// An immutable string. The text is released when the slot is swept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Str {
    text: Box<str>,
}

impl Str {
    /// Copies `text` into a new string object.
    pub fn new(text: &str) -> Self {
        Self { text: text.into() }
    }

    /// Borrows the text.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl GcTrace for Str {
    fn trace_refs(&self, _refs: &mut Vec<Root>) {}
}

/// Size of a symbol's text buffer, terminator included.
pub const SYMBOL_BUFFER: usize = 94;

/// Longest symbol name kept; longer names are truncated.
pub const SYMBOL_MAX_LEN: usize = SYMBOL_BUFFER - 1;

/// An interned symbol: a fixed-size name buffer and its hash.
#[derive(Clone)]
pub struct Symbol {
    buf: [u8; SYMBOL_MAX_LEN],
    len: u8,
    hash: u32,
}

impl Symbol {
    /// Cuts `text` at the buffer boundary, backing off to a character
    /// boundary.
    pub fn truncate(text: &str) -> &str {
        if text.len() <= SYMBOL_MAX_LEN {
            return text;
        }
        let mut end = SYMBOL_MAX_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    pub(crate) fn new(text: &str, hash: u32) -> Self {
        let text = Self::truncate(text);
        let mut buf = [0; SYMBOL_MAX_LEN];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        Self {
            buf,
            len: text.len() as u8,
            hash,
        }
    }

    /// The symbol's name.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or_default()
    }

    /// Precomputed hash of the name.
    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl GcTrace for Symbol {
    fn trace_refs(&self, _refs: &mut Vec<Root>) {}
}

/// What a closure is being used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureKind {
    /// Lexical scope of a compiled procedure or macro
    Lambda,
    /// Procedure-call frame
    Call,
    /// Local scope pushed by `let`
    Let,
    /// Exception-handler frame
    Try,
    /// Top-level environment
    Root,
}

/// A scope, procedure, macro or VM control frame.
#[derive(Debug, Clone)]
pub struct Closure {
    /// What the closure represents
    pub kind: ClosureKind,
    /// Enclosing scope
    pub parent: Option<ClosureRef>,
    /// Local bindings
    pub bindings: Option<TreeRef>,
    /// Metadata such as documentation
    pub meta: Option<TreeRef>,
    /// Compiled body, or the saved code of a dormant frame
    pub text: Option<BytecodeRef>,
    /// Saved instruction pointer
    pub ip: usize,
    /// Saved value-stack pointer
    pub sp: usize,
    /// Root-stack position when the frame was pushed
    pub root_mark: RootMark,
    /// Parameter list of a procedure
    pub params: Value,
    /// Handler of a try frame
    pub handler: Value,
    /// Name of a procedure
    pub name: Option<SymbolRef>,
}

impl Closure {
    /// Creates an empty closure of the given kind.
    pub fn new(parent: Option<ClosureRef>, kind: ClosureKind) -> Self {
        Self {
            kind,
            parent,
            bindings: None,
            meta: None,
            text: None,
            ip: 0,
            sp: 0,
            root_mark: RootMark::default(),
            params: Value::Nil,
            handler: Value::Nil,
            name: None,
        }
    }
}

impl GcTrace for Closure {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.extend(self.parent.map(Root::Closure));
        refs.extend(self.bindings.map(Root::Tree));
        refs.extend(self.meta.map(Root::Tree));
        refs.extend(self.text.map(Root::Bytecode));
        refs.extend(self.name.map(Root::Symbol));
        refs.push(Root::Value(self.params));
        refs.push(Root::Value(self.handler));
    }
}

/// A node of an environment tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    /// Binding name
    pub key: SymbolRef,
    /// Bound value
    pub value: Value,
    /// Smaller keys
    pub left: Option<TreeRef>,
    /// Larger keys
    pub right: Option<TreeRef>,
    /// Height of the subtree rooted here, leaves are 1
    pub height: u16,
}

impl TreeNode {
    /// A childless node.
    pub fn leaf(key: SymbolRef, value: Value) -> Self {
        Self {
            key,
            value,
            left: None,
            right: None,
            height: 1,
        }
    }
}

impl GcTrace for TreeNode {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.push(Root::Symbol(self.key));
        refs.push(Root::Value(self.value));
        refs.extend(self.left.map(Root::Tree));
        refs.extend(self.right.map(Root::Tree));
    }
}

/// The cell a tree value points at.
///
/// Inserting may rebalance the tree onto a new root node; storing that root
/// back here lets every alias of the value see the insert.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TreeBox {
    /// Root node; `None` is the empty tree
    pub root: Option<TreeRef>,
}

impl GcTrace for TreeBox {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.extend(self.root.map(Root::Tree));
    }
}

/// A growable array of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    /// Elements
    pub items: Vec<Value>,
}

impl GcTrace for Array {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.extend(self.items.iter().copied().map(Root::Value));
    }
}

/// Compiled code: an instruction stream and its literal pool.
#[derive(Debug, Clone)]
pub struct BytecodeArray {
    /// Encoded instructions, shared with running VM contexts
    pub ops: Rc<[u8]>,
    /// Literal pool referenced by 3-byte operands
    pub literals: ArrayRef,
}

impl GcTrace for BytecodeArray {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.push(Root::Array(self.literals));
    }
}

/// Signature of a host function.
///
/// `caller` is the closure active at the call site. Arguments stay rooted
/// for the duration of the call.
pub type NativeFn = fn(heap: &mut Heap, caller: ClosureRef, args: &[Value]) -> Result<Value, Error>;

/// How many arguments a host function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// At most `n` arguments; missing ones are passed as nil
    Fixed(usize),
    /// Any number of arguments
    Variadic,
}

/// A host function.
#[derive(Clone)]
pub struct NativeFunction {
    /// Name the function was registered under
    pub name: SymbolRef,
    /// Accepted arguments
    pub arity: Arity,
    /// Implementation
    pub fp: NativeFn,
    /// Metadata such as documentation
    pub meta: Option<TreeRef>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl GcTrace for NativeFunction {
    fn trace_refs(&self, refs: &mut Vec<Root>) {
        refs.push(Root::Symbol(self.name));
        refs.extend(self.meta.map(Root::Tree));
    }
}

/// A byte buffer. The bytes are released when the slot is swept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    /// Contents
    pub data: Vec<u8>,
    /// Whether writes are refused
    pub immutable: bool,
}

impl GcTrace for Buffer {
    fn trace_refs(&self, _refs: &mut Vec<Root>) {}
}
