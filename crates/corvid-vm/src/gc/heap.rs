//! The heap: one slab per object class plus the state the collector needs
//! to find roots.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::collector::{GcStats, MarkMaps};
use super::object::{
    Array, Buffer, BytecodeArray, Closure, GcTrace, NativeFunction, Pair, Str, Symbol,
    SymbolRef, TreeBox, TreeNode, TreeRef,
};
use super::roots::{RootScope, RootStack};
use super::slab::{Ref, Slab, SlabClass};
use crate::config::HeapConfig;
use crate::error::{Error, ExceptionKind, Result};
use crate::runtime::context::Thread;
use crate::runtime::symbol::SymbolTable;
use crate::runtime::value::Value;

/// An object type with a slab of its own.
pub trait HeapObject: GcTrace + Sized {
    /// The slab class holding this type.
    const CLASS: SlabClass;

    /// Borrows the slab for this type.
    fn slab(heap: &Heap) -> &Slab<Self>;

    /// Mutably borrows the slab for this type.
    fn slab_mut(heap: &mut Heap) -> &mut Slab<Self>;
}

macro_rules! heap_object {
    ($ty:ty, $field:ident, $class:expr) => {
        impl HeapObject for $ty {
            const CLASS: SlabClass = $class;

            #[inline]
            fn slab(heap: &Heap) -> &Slab<Self> {
                &heap.$field
            }

            #[inline]
            fn slab_mut(heap: &mut Heap) -> &mut Slab<Self> {
                &mut heap.$field
            }
        }
    };
}

heap_object!(Pair, pairs, SlabClass::Pair);
heap_object!(Str, strings, SlabClass::String);
heap_object!(Symbol, symbols, SlabClass::Symbol);
heap_object!(Closure, closures, SlabClass::Closure);
heap_object!(TreeNode, trees, SlabClass::Tree);
heap_object!(Array, arrays, SlabClass::Array);
heap_object!(BytecodeArray, bytecode, SlabClass::Bytecode);
heap_object!(NativeFunction, natives, SlabClass::Native);
heap_object!(Buffer, buffers, SlabClass::Buffer);
heap_object!(TreeBox, tree_boxes, SlabClass::TreeBox);

/// Symbols the runtime refers to by identity.
#[derive(Debug, Clone)]
pub(crate) struct WellKnown {
    pub exception_kinds: [SymbolRef; ExceptionKind::ALL.len()],
    pub documentation: SymbolRef,
}

impl WellKnown {
    pub fn kind(&self, kind: ExceptionKind) -> SymbolRef {
        let index = ExceptionKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        self.exception_kinds[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = SymbolRef> + '_ {
        self.exception_kinds
            .iter()
            .copied()
            .chain(std::iter::once(self.documentation))
    }
}

/// Occupancy of one slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabUsage {
    /// Slab class
    pub class: SlabClass,
    /// Live objects
    pub active: usize,
    /// Slots ever handed out
    pub high_water: usize,
    /// Maximum objects
    pub capacity: usize,
}

/// Owner of every slab, the symbol table, the root stack and the stack of
/// running VM contexts.
///
/// The heap is single-threaded; share it across threads only behind an
/// external lock.
pub struct Heap {
    pub(crate) pairs: Slab<Pair>,
    pub(crate) strings: Slab<Str>,
    pub(crate) symbols: Slab<Symbol>,
    pub(crate) closures: Slab<Closure>,
    pub(crate) trees: Slab<TreeNode>,
    pub(crate) arrays: Slab<Array>,
    pub(crate) bytecode: Slab<BytecodeArray>,
    pub(crate) natives: Slab<NativeFunction>,
    pub(crate) buffers: Slab<Buffer>,
    pub(crate) tree_boxes: Slab<TreeBox>,
    pub(crate) symbol_table: SymbolTable,
    pub(crate) roots: RootStack,
    pub(crate) threads: Vec<Thread>,
    pub(crate) marks: MarkMaps,
    pub(crate) stats: GcStats,
    pub(crate) collect_soon: bool,
    pub(crate) well_known: WellKnown,
    config: HeapConfig,
    interrupt: Arc<AtomicBool>,
}

impl Heap {
    /// Reserves every slab and interns the runtime's well-known symbols.
    pub fn new(config: HeapConfig) -> Result<Self> {
        config.validate()?;
        let capacity = &config.capacity;

        let mut symbols = Slab::new(SlabClass::Symbol, capacity.symbols);
        let mut symbol_table = SymbolTable::new(capacity.symbols);
        let mut kinds = Vec::with_capacity(ExceptionKind::ALL.len());
        for kind in ExceptionKind::ALL {
            kinds.push(symbol_table.intern(&mut symbols, kind.name())?);
        }
        let exception_kinds = kinds
            .try_into()
            .map_err(|_| Error::corrupted("exception kind table size mismatch"))?;
        let documentation = symbol_table.intern(&mut symbols, "documentation")?;

        tracing::debug!(?capacity, "heap reserved");

        Ok(Self {
            pairs: Slab::new(SlabClass::Pair, capacity.pairs),
            strings: Slab::new(SlabClass::String, capacity.strings),
            symbols,
            closures: Slab::new(SlabClass::Closure, capacity.closures),
            trees: Slab::new(SlabClass::Tree, capacity.trees),
            arrays: Slab::new(SlabClass::Array, capacity.arrays),
            bytecode: Slab::new(SlabClass::Bytecode, capacity.bytecode),
            natives: Slab::new(SlabClass::Native, capacity.natives),
            buffers: Slab::new(SlabClass::Buffer, capacity.buffers),
            tree_boxes: Slab::new(SlabClass::TreeBox, capacity.tree_boxes),
            symbol_table,
            roots: RootStack::new(),
            threads: Vec::new(),
            marks: MarkMaps::default(),
            stats: GcStats::default(),
            collect_soon: false,
            well_known: WellKnown {
                exception_kinds,
                documentation,
            },
            config,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The configuration the heap was built with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Collector statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Occupancy of the slab for `class`.
    pub fn usage(&self, class: SlabClass) -> SlabUsage {
        fn of<T>(slab: &Slab<T>) -> SlabUsage {
            SlabUsage {
                class: slab.class(),
                active: slab.active(),
                high_water: slab.high_water(),
                capacity: slab.capacity(),
            }
        }
        match class {
            SlabClass::Pair => of(&self.pairs),
            SlabClass::String => of(&self.strings),
            SlabClass::Symbol => of(&self.symbols),
            SlabClass::Closure => of(&self.closures),
            SlabClass::Tree => of(&self.trees),
            SlabClass::Array => of(&self.arrays),
            SlabClass::Bytecode => of(&self.bytecode),
            SlabClass::Native => of(&self.natives),
            SlabClass::Buffer => of(&self.buffers),
            SlabClass::TreeBox => of(&self.tree_boxes),
        }
    }

    /// The explicit root stack.
    pub fn roots(&self) -> &RootStack {
        &self.roots
    }

    /// Mutable access to the explicit root stack.
    pub fn roots_mut(&mut self) -> &mut RootStack {
        &mut self.roots
    }

    /// Opens a scope whose root pushes are undone when it drops.
    pub fn root_scope(&mut self) -> RootScope<'_> {
        RootScope::new(self)
    }

    /// Number of VM invocations currently running.
    pub fn nesting(&self) -> usize {
        self.threads.len()
    }

    /// Places `object` in its slab.
    ///
    /// A full slab triggers a collection, during which everything `object`
    /// refers to is kept alive; if the collection frees nothing of this
    /// class the result is [`Error::OutOfMemory`].
    pub fn allocate<T: HeapObject>(&mut self, object: T) -> Result<Ref<T>> {
        let object = match T::slab_mut(self).allocate(object) {
            Ok(r) => {
                self.note_allocation::<T>();
                return Ok(r);
            }
            Err(object) => object,
        };

        let mark = self.roots.mark();
        let mut pending = Vec::new();
        object.trace_refs(&mut pending);
        for root in pending {
            self.roots.push(root);
        }
        self.collect();
        self.roots.pop(mark);

        match T::slab_mut(self).allocate(object) {
            Ok(r) => {
                self.note_allocation::<T>();
                Ok(r)
            }
            Err(_) => {
                tracing::warn!(class = %T::CLASS, "slab exhausted after collection");
                Err(Error::OutOfMemory(T::CLASS))
            }
        }
    }

    fn note_allocation<T: HeapObject>(&mut self) {
        let headroom = T::slab(self).headroom();
        if headroom <= self.config.headroom_slots(T::CLASS) {
            self.collect_soon = true;
        }
    }

    /// Returns a slot to its free list. The caller guarantees nothing still
    /// refers to it.
    pub fn free<T: HeapObject>(&mut self, r: Ref<T>) {
        T::slab_mut(self).free(r);
    }

    /// Borrows a live object.
    #[inline]
    pub fn get<T: HeapObject>(&self, r: Ref<T>) -> Result<&T> {
        T::slab(self).get(r).ok_or(Error::Dangling {
            class: T::CLASS,
            index: r.index(),
        })
    }

    /// Mutably borrows a live object.
    #[inline]
    pub fn get_mut<T: HeapObject>(&mut self, r: Ref<T>) -> Result<&mut T> {
        T::slab_mut(self).get_mut(r).ok_or(Error::Dangling {
            class: T::CLASS,
            index: r.index(),
        })
    }

    /// Interns `name`.
    pub fn intern(&mut self, name: &str) -> Result<SymbolRef> {
        match self.symbol_table.intern(&mut self.symbols, name) {
            Err(Error::OutOfMemory(_)) if self.config.gc.reclaim_symbols => {
                self.collect();
                self.symbol_table.intern(&mut self.symbols, name)
            }
            other => other,
        }
    }

    /// Interns `name` as a symbol value.
    pub fn symbol(&mut self, name: &str) -> Result<Value> {
        self.intern(name).map(Value::Symbol)
    }

    /// Finds an already interned symbol.
    pub fn lookup_symbol(&self, name: &str) -> Option<SymbolRef> {
        self.symbol_table.lookup(&self.symbols, name)
    }

    /// Name of a symbol.
    pub fn symbol_name(&self, sym: SymbolRef) -> Result<&str> {
        self.get(sym).map(Symbol::as_str)
    }

    /// Allocates a pair.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value> {
        self.allocate(Pair { car, cdr }).map(Value::Pair)
    }

    /// Head of a pair; nil for anything else.
    pub fn car(&self, value: Value) -> Result<Value> {
        match value {
            Value::Pair(p) | Value::Exception(p) => Ok(self.get(p)?.car),
            _ => Ok(Value::Nil),
        }
    }

    /// Tail of a pair; nil for anything else.
    pub fn cdr(&self, value: Value) -> Result<Value> {
        match value {
            Value::Pair(p) | Value::Exception(p) => Ok(self.get(p)?.cdr),
            _ => Ok(Value::Nil),
        }
    }

    /// Allocates a string.
    pub fn string(&mut self, text: &str) -> Result<Value> {
        self.allocate(Str::new(text)).map(Value::String)
    }

    /// Text of a string value.
    pub fn string_text(&self, value: Value) -> Option<&str> {
        match value {
            Value::String(s) => self.get(s).ok().map(Str::as_str),
            _ => None,
        }
    }

    /// Allocates an array.
    pub fn array(&mut self, items: Vec<Value>) -> Result<Value> {
        self.allocate(Array { items }).map(Value::Array)
    }

    /// Allocates a mutable buffer.
    pub fn buffer(&mut self, data: Vec<u8>) -> Result<Value> {
        self.allocate(Buffer {
            data,
            immutable: false,
        })
        .map(Value::Buffer)
    }

    /// Boxes a tree root as a tree value.
    pub fn tree(&mut self, root: Option<TreeRef>) -> Result<Value> {
        self.allocate(TreeBox { root }).map(Value::Tree)
    }

    /// Builds a proper list of `items`.
    pub fn list(&mut self, items: &[Value]) -> Result<Value> {
        let mut scope = self.root_scope();
        for item in items {
            scope.push(*item);
        }
        let mut list = Value::Nil;
        for item in items.iter().rev() {
            list = scope.cons(*item, list)?;
        }
        Ok(list)
    }

    /// Collects the elements of a list. An improper tail is ignored; a
    /// cyclic list stops once every pair could have been visited.
    pub fn list_to_vec(&self, list: Value) -> Result<Vec<Value>> {
        let limit = self.pairs.high_water();
        let mut items = Vec::new();
        let mut cursor = list;
        while let Value::Pair(p) = cursor {
            if items.len() > limit {
                break;
            }
            let pair = self.get(p)?;
            items.push(pair.car);
            cursor = pair.cdr;
        }
        Ok(items)
    }

    /// Flag that, once raised, makes the VM throw `interrupt` at its next
    /// check.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Clears and returns the interrupt flag.
    pub(crate) fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::AcqRel)
    }
}
