//! Explicit root stack.
//!
//! Host code that holds a heap reference only in a Rust local across an
//! allocation must pin it here first, because a collection may run inside
//! any allocation. Entries are pushed on entry to a scope and popped back to
//! a saved [`RootMark`] on exit; [`RootScope`] does the popping on drop.

use std::ops::{Deref, DerefMut};

use super::heap::Heap;
use super::object::{ArrayRef, BytecodeRef, ClosureRef, SymbolRef, TreeRef};
use crate::runtime::value::Value;

/// A reference pinned against collection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Root {
    /// Any value
    Value(Value),
    /// A closure
    Closure(ClosureRef),
    /// A symbol
    Symbol(SymbolRef),
    /// An environment-tree node
    Tree(TreeRef),
    /// An array
    Array(ArrayRef),
    /// A bytecode array
    Bytecode(BytecodeRef),
}

impl From<Value> for Root {
    fn from(value: Value) -> Self {
        Root::Value(value)
    }
}

impl From<ClosureRef> for Root {
    fn from(closure: ClosureRef) -> Self {
        Root::Closure(closure)
    }
}

impl From<SymbolRef> for Root {
    fn from(symbol: SymbolRef) -> Self {
        Root::Symbol(symbol)
    }
}

impl From<TreeRef> for Root {
    fn from(tree: TreeRef) -> Self {
        Root::Tree(tree)
    }
}

impl From<BytecodeRef> for Root {
    fn from(text: BytecodeRef) -> Self {
        Root::Bytecode(text)
    }
}

/// A saved root-stack position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RootMark(usize);

/// Stack of pinned references.
#[derive(Debug, Default)]
pub struct RootStack {
    entries: Vec<Root>,
}

impl RootStack {
    /// Creates an empty root stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current position.
    pub fn mark(&self) -> RootMark {
        RootMark(self.entries.len())
    }

    /// Pins `root` and returns the position to pop back to.
    pub fn push(&mut self, root: impl Into<Root>) -> RootMark {
        let mark = self.mark();
        self.entries.push(root.into());
        mark
    }

    /// Rewinds to `mark`, releasing everything pushed after it.
    pub fn pop(&mut self, mark: RootMark) {
        debug_assert!(mark.0 <= self.entries.len(), "root stack popped past its top");
        self.entries.truncate(mark.0);
    }

    /// Number of pinned entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pinned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the pinned entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Root> {
        self.entries.iter()
    }
}

/// Scope guard over the heap's root stack.
///
/// Dereferences to the [`Heap`]; everything pushed through it is popped when
/// the guard drops.
pub struct RootScope<'h> {
    heap: &'h mut Heap,
    mark: RootMark,
}

impl<'h> RootScope<'h> {
    pub(crate) fn new(heap: &'h mut Heap) -> Self {
        let mark = heap.roots.mark();
        Self { heap, mark }
    }

    /// Pins `root` until the scope ends.
    pub fn push(&mut self, root: impl Into<Root>) {
        self.heap.roots.push(root);
    }
}

impl Deref for RootScope<'_> {
    type Target = Heap;

    fn deref(&self) -> &Heap {
        self.heap
    }
}

impl DerefMut for RootScope<'_> {
    fn deref_mut(&mut self) -> &mut Heap {
        self.heap
    }
}

impl Drop for RootScope<'_> {
    fn drop(&mut self) {
        self.heap.roots.pop(self.mark);
    }
}
