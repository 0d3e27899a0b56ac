//! Fixed-capacity slab allocator.
//!
//! Every heap object class lives in its own slab: a vector reserved once at
//! start-up that never reallocates, so slot indices stay valid for the life
//! of the heap. Freed slots go on a free-index stack kept apart from the
//! payloads.
//!
//! ```text
//! slots: [Used][Used][Free][Used][Free][ .. reserved .. ]
//!                     ^          ^      ^
//!                     |          |      high-water mark
//! free:  [2, 4] ------+----------+
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Object classes that own a slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlabClass {
    /// Cons cells.
    Pair,
    /// Immutable strings.
    String,
    /// Interned symbols.
    Symbol,
    /// Scopes, procedures and VM frames.
    Closure,
    /// Environment-tree nodes.
    Tree,
    /// Value arrays, including literal pools.
    Array,
    /// Compiled instruction streams.
    Bytecode,
    /// Host functions.
    Native,
    /// Raw byte buffers.
    Buffer,
    /// Boxed roots of tree values.
    TreeBox,
}

impl SlabClass {
    /// Every class, in mark-map order.
    pub const ALL: [SlabClass; 10] = [
        SlabClass::Pair,
        SlabClass::String,
        SlabClass::Symbol,
        SlabClass::Closure,
        SlabClass::Tree,
        SlabClass::Array,
        SlabClass::Bytecode,
        SlabClass::Native,
        SlabClass::Buffer,
        SlabClass::TreeBox,
    ];

    /// Human-readable class name.
    pub fn name(self) -> &'static str {
        match self {
            SlabClass::Pair => "pair",
            SlabClass::String => "string",
            SlabClass::Symbol => "symbol",
            SlabClass::Closure => "closure",
            SlabClass::Tree => "tree",
            SlabClass::Array => "array",
            SlabClass::Bytecode => "bytecode",
            SlabClass::Native => "native",
            SlabClass::Buffer => "buffer",
            SlabClass::TreeBox => "tree-box",
        }
    }
}

impl fmt::Display for SlabClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed index into a slab.
pub struct Ref<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    pub(crate) const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// Returns the slot index of this reference.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Ref<T> {}

impl<T> PartialOrd for Ref<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ref<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let name = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{}#{}", name, self.index)
    }
}

enum Slot<T> {
    Free,
    Used(T),
}

/// A fixed-capacity pool of objects of one class.
pub struct Slab<T> {
    class: SlabClass,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    active: usize,
}

impl<T> Slab<T> {
    /// Creates an empty slab that can hold at most `capacity` objects.
    pub fn new(class: SlabClass, capacity: usize) -> Self {
        Self {
            class,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            active: 0,
        }
    }

    /// Places `object` in a slot, preferring the free list over the
    /// high-water mark.
    ///
    /// When the slab is full the object is handed back so the caller can
    /// collect and retry.
    #[allow(clippy::result_large_err)]
    pub fn allocate(&mut self, object: T) -> Result<Ref<T>, T> {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Slot::Used(object);
            self.active += 1;
            return Ok(Ref::new(index));
        }
        if self.slots.len() < self.capacity {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Used(object));
            self.active += 1;
            return Ok(Ref::new(index));
        }
        Err(object)
    }

    /// Returns a slot to the free list and hands back its payload.
    ///
    /// Freeing an already free slot is a no-op returning `None`.
    pub fn free(&mut self, r: Ref<T>) -> Option<T> {
        self.free_index(r.index())
    }

    pub(crate) fn free_index(&mut self, index: usize) -> Option<T> {
        let slot = self.slots.get_mut(index)?;
        match std::mem::replace(slot, Slot::Free) {
            Slot::Used(object) => {
                self.free.push(index as u32);
                self.active -= 1;
                Some(object)
            }
            Slot::Free => None,
        }
    }

    /// Borrows the object behind `r`, if the slot is live.
    #[inline]
    pub fn get(&self, r: Ref<T>) -> Option<&T> {
        match self.slots.get(r.index()) {
            Some(Slot::Used(object)) => Some(object),
            _ => None,
        }
    }

    /// Mutably borrows the object behind `r`, if the slot is live.
    #[inline]
    pub fn get_mut(&mut self, r: Ref<T>) -> Option<&mut T> {
        match self.slots.get_mut(r.index()) {
            Some(Slot::Used(object)) => Some(object),
            _ => None,
        }
    }

    /// Whether slot `index` currently holds an object.
    pub fn is_live(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Slot::Used(_)))
    }

    /// Iterates over every live object.
    pub fn iter(&self) -> impl Iterator<Item = (Ref<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Used(object) => Some((Ref::new(index as u32), object)),
                Slot::Free => None,
            })
    }

    /// Class of the objects in this slab.
    #[inline]
    pub fn class(&self) -> SlabClass {
        self.class
    }

    /// Maximum number of objects.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live objects.
    #[inline]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Number of slots ever handed out.
    #[inline]
    pub fn high_water(&self) -> usize {
        self.slots.len()
    }

    /// Slots that can still be allocated without a collection.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.capacity - self.active
    }

    /// Indices currently on the free list.
    pub fn free_indices(&self) -> &[u32] {
        &self.free
    }

    /// Whether no slot is left on the free list or above the high-water
    /// mark.
    pub fn is_full(&self) -> bool {
        self.active >= self.capacity
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("class", &self.class)
            .field("active", &self.active)
            .field("high_water", &self.slots.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
