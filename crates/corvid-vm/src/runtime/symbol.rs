//! Symbol interning.
//!
//! An open-addressing directory over the symbol slab. Each directory slot is
//! `0` when empty, `n > 0` when occupied by slab index `n - 1`, and `-n` once
//! that occupant has been forgotten. A back index records the directory slot
//! of every live symbol so forgetting can tombstone the right entry.

use crate::error::{Error, Result};
use crate::gc::object::{Symbol, SymbolRef};
use crate::gc::slab::{Ref, Slab, SlabClass};

/// Directory of interned symbols.
#[derive(Debug)]
pub struct SymbolTable {
    index: Vec<i32>,
    back: Vec<u32>,
}

enum Probe {
    Found(SymbolRef),
    Vacant(usize),
}

impl SymbolTable {
    /// Creates a directory with `capacity` slots, normally the capacity of
    /// the symbol slab.
    pub fn new(capacity: usize) -> Self {
        Self {
            index: vec![0; capacity],
            back: vec![0; capacity],
        }
    }

    /// Rolling hash of a symbol name.
    pub fn hash(text: &str) -> u32 {
        text.bytes()
            .fold(0x1234_5678u32, |h, b| h.rotate_left(4).wrapping_add(u32::from(b)))
    }

    fn probe(&self, slab: &Slab<Symbol>, text: &str, hash: u32) -> Result<Probe> {
        let capacity = self.index.len();
        if capacity == 0 {
            return Err(Error::OutOfMemory(SlabClass::Symbol));
        }
        let start = hash as usize % capacity;
        let mut tombstone = None;
        let mut slot = start;
        loop {
            match self.index[slot] {
                0 => return Ok(Probe::Vacant(tombstone.unwrap_or(slot))),
                entry if entry < 0 => {
                    tombstone.get_or_insert(slot);
                }
                entry => {
                    let candidate = Ref::new((entry - 1) as u32);
                    let matches = slab
                        .get(candidate)
                        .is_some_and(|sym| sym.hash() == hash && sym.as_str() == text);
                    if matches {
                        return Ok(Probe::Found(candidate));
                    }
                }
            }
            slot = (slot + 1) % capacity;
            if slot == start {
                break;
            }
        }
        tombstone
            .map(Probe::Vacant)
            .ok_or(Error::OutOfMemory(SlabClass::Symbol))
    }

    /// Returns the symbol for `text`, creating it if needed.
    ///
    /// Names longer than the symbol buffer are truncated first, so two long
    /// names sharing a prefix intern to the same symbol.
    pub fn intern(&mut self, slab: &mut Slab<Symbol>, text: &str) -> Result<SymbolRef> {
        let text = Symbol::truncate(text);
        let hash = Self::hash(text);
        match self.probe(slab, text, hash)? {
            Probe::Found(sym) => Ok(sym),
            Probe::Vacant(slot) => {
                let sym = slab
                    .allocate(Symbol::new(text, hash))
                    .map_err(|_| Error::OutOfMemory(SlabClass::Symbol))?;
                let index = sym.index();
                if index >= self.back.len() {
                    slab.free(sym);
                    return Err(Error::OutOfMemory(SlabClass::Symbol));
                }
                self.index[slot] = index as i32 + 1;
                self.back[index] = slot as u32;
                Ok(sym)
            }
        }
    }

    /// Returns the symbol for `text` without creating it.
    pub fn lookup(&self, slab: &Slab<Symbol>, text: &str) -> Option<SymbolRef> {
        let text = Symbol::truncate(text);
        match self.probe(slab, text, Self::hash(text)) {
            Ok(Probe::Found(sym)) => Some(sym),
            _ => None,
        }
    }

    /// Tombstones `sym` in the directory and frees its slab slot.
    pub fn forget(&mut self, slab: &mut Slab<Symbol>, sym: SymbolRef) {
        let index = sym.index();
        if !slab.is_live(index) {
            return;
        }
        let slot = self.back[index] as usize;
        debug_assert_eq!(self.index[slot], index as i32 + 1);
        self.index[slot] = -(index as i32 + 1);
        slab.free(sym);
    }

    /// Number of directory slots.
    pub fn capacity(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::object::SYMBOL_MAX_LEN;

    fn table(capacity: usize) -> (SymbolTable, Slab<Symbol>) {
        (
            SymbolTable::new(capacity),
            Slab::new(SlabClass::Symbol, capacity),
        )
    }

    #[test]
    fn test_intern_is_idempotent() {
        let (mut table, mut slab) = table(64);
        let a = table.intern(&mut slab, "foo").unwrap();
        let b = table.intern(&mut slab, "foo").unwrap();
        let c = table.intern(&mut slab, "bar").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(slab.active(), 2);
        assert_eq!(slab.get(a).unwrap().as_str(), "foo");
    }

    #[test]
    fn test_long_names_truncate_deterministically() {
        let (mut table, mut slab) = table(64);
        let base = "n".repeat(SYMBOL_MAX_LEN);
        let a = table.intern(&mut slab, &format!("{}tail-one", base)).unwrap();
        let b = table.intern(&mut slab, &format!("{}tail-two", base)).unwrap();
        assert_eq!(a, b);
        assert_eq!(slab.get(a).unwrap().as_str(), base);
    }

    #[test]
    fn test_hash_matches_rolling_mix() {
        assert_eq!(SymbolTable::hash(""), 0x1234_5678);
        assert_eq!(SymbolTable::hash("a"), 0x2345_6781 + 0x61);
    }

    #[test]
    fn test_full_table_reports_out_of_memory() {
        let (mut table, mut slab) = table(4);
        for name in ["a", "b", "c", "d"] {
            table.intern(&mut slab, name).unwrap();
        }
        let err = table.intern(&mut slab, "e").unwrap_err();
        assert!(matches!(err, Error::OutOfMemory(SlabClass::Symbol)));
        assert!(table.intern(&mut slab, "c").is_ok());
    }

    #[test]
    fn test_forget_leaves_tombstone_that_is_reused() {
        let (mut table, mut slab) = table(8);
        let names = ["alpha", "beta", "gamma"];
        let syms: Vec<_> = names
            .iter()
            .map(|n| table.intern(&mut slab, n).unwrap())
            .collect();

        table.forget(&mut slab, syms[1]);
        assert_eq!(table.lookup(&slab, "beta"), None);
        assert_eq!(table.lookup(&slab, "alpha"), Some(syms[0]));
        assert_eq!(table.lookup(&slab, "gamma"), Some(syms[2]));

        let again = table.intern(&mut slab, "beta").unwrap();
        assert_eq!(slab.get(again).unwrap().as_str(), "beta");
        assert_eq!(slab.active(), 3);
    }

    #[test]
    fn test_colliding_names_probe_linearly() {
        let (mut table, mut slab) = table(1);
        let a = table.intern(&mut slab, "only").unwrap();
        assert_eq!(table.lookup(&slab, "only"), Some(a));
        assert!(table.intern(&mut slab, "other").is_err());
    }
}
