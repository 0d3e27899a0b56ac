//! Mark-sweep collection.
//!
//! Mark starts from the root stack, every registered VM context, the
//! well-known symbols and every slab's free list, then drains a gray
//! worklist. A slot is pushed through at most once per cycle: its bit in the
//! class's mark map is checked before it is set, which makes cyclic
//! structures safe. Sweep frees every live slot below the high-water mark
//! whose bit is clear and clears the bits of the rest.

use std::time::{Duration, Instant};

use super::heap::{Heap, HeapObject};
use super::object::{
    Array, Buffer, BytecodeArray, Closure, NativeFunction, Pair, Str, Symbol, TreeBox,
    TreeNode,
};
use super::roots::Root;
use super::slab::{Ref, SlabClass};
use crate::runtime::value::Value;

/// Per-class mark bits, kept outside the slot payloads.
#[derive(Debug, Default)]
pub(crate) struct MarkMaps {
    maps: [Vec<bool>; SlabClass::ALL.len()],
}

impl MarkMaps {
    fn map(&mut self, class: SlabClass) -> &mut Vec<bool> {
        &mut self.maps[class as usize]
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Slots freed, indexed like [`SlabClass::ALL`]
    pub freed: [usize; SlabClass::ALL.len()],
    /// Wall time spent
    pub elapsed: Duration,
}

impl CycleReport {
    /// Slots freed from `class`.
    pub fn freed(&self, class: SlabClass) -> usize {
        self.freed[class as usize]
    }

    /// Slots freed across every class.
    pub fn total_freed(&self) -> usize {
        self.freed.iter().sum()
    }
}

/// Running totals over every cycle.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Completed cycles
    pub cycles: u64,
    /// Slots freed over all cycles
    pub freed: u64,
    /// Most recent cycle
    pub last: Option<CycleReport>,
}

struct Marker<'h> {
    heap: &'h Heap,
    marks: &'h mut MarkMaps,
    gray: Vec<Root>,
}

impl<'h> Marker<'h> {
    fn drain(&mut self) {
        while let Some(root) = self.gray.pop() {
            match root {
                Root::Value(value) => self.visit_value(value),
                Root::Closure(c) => self.visit(c),
                Root::Symbol(s) => self.visit(s),
                Root::Tree(t) => self.visit(t),
                Root::Array(a) => self.visit(a),
                Root::Bytecode(b) => self.visit(b),
            }
        }
    }

    fn visit_value(&mut self, value: Value) {
        match value {
            Value::Pair(p) | Value::Exception(p) => self.visit(p),
            Value::String(s) => self.visit(s),
            Value::Symbol(s) => self.visit(s),
            Value::Lambda(c) | Value::Macro(c) | Value::Environment(c) => self.visit(c),
            Value::NativeFunc(n) => self.visit(n),
            Value::Tree(b) => self.visit(b),
            Value::Array(a) => self.visit(a),
            Value::Bytecode(b) => self.visit(b),
            Value::Buffer(b) => self.visit(b),
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {}
        }
    }

    fn visit<T: HeapObject>(&mut self, r: Ref<T>) {
        let map = self.marks.map(T::CLASS);
        match map.get_mut(r.index()) {
            Some(bit) if !*bit => *bit = true,
            _ => return,
        }
        if let Some(object) = T::slab(self.heap).get(r) {
            object.trace_refs(&mut self.gray);
        }
    }
}

impl Heap {
    /// Runs a full collection cycle.
    pub fn collect(&mut self) -> CycleReport {
        let start = Instant::now();
        let mut marks = std::mem::take(&mut self.marks);
        self.reset_marks(&mut marks);

        let mut marker = Marker {
            heap: self,
            marks: &mut marks,
            gray: Vec::new(),
        };
        marker.gray.extend(self.roots.iter().copied());
        for thread in &self.threads {
            marker.gray.extend(thread.values.iter().copied().map(Root::Value));
            marker.gray.extend(thread.closures.iter().copied().map(Root::Closure));
            marker.gray.push(Root::Bytecode(thread.text));
        }
        marker.gray.extend(self.well_known.iter().map(Root::Symbol));
        marker.drain();

        let mut report = CycleReport {
            cycle: self.stats.cycles + 1,
            ..CycleReport::default()
        };
        report.freed[SlabClass::Pair as usize] = self.sweep::<Pair>(&mut marks);
        report.freed[SlabClass::String as usize] = self.sweep::<Str>(&mut marks);
        report.freed[SlabClass::Closure as usize] = self.sweep::<Closure>(&mut marks);
        report.freed[SlabClass::Tree as usize] = self.sweep::<TreeNode>(&mut marks);
        report.freed[SlabClass::Array as usize] = self.sweep::<Array>(&mut marks);
        report.freed[SlabClass::Bytecode as usize] = self.sweep::<BytecodeArray>(&mut marks);
        report.freed[SlabClass::Native as usize] = self.sweep::<NativeFunction>(&mut marks);
        report.freed[SlabClass::Buffer as usize] = self.sweep::<Buffer>(&mut marks);
        report.freed[SlabClass::TreeBox as usize] = self.sweep::<TreeBox>(&mut marks);
        report.freed[SlabClass::Symbol as usize] = self.sweep_symbols(&mut marks);

        self.marks = marks;
        self.collect_soon = false;
        report.elapsed = start.elapsed();
        self.stats.cycles = report.cycle;
        self.stats.freed += report.total_freed() as u64;

        tracing::debug!(
            cycle = report.cycle,
            freed = report.total_freed(),
            elapsed_us = report.elapsed.as_micros() as u64,
            "garbage collection finished"
        );
        for class in SlabClass::ALL {
            let usage = self.usage(class);
            tracing::trace!(
                class = %class,
                freed = report.freed(class),
                active = usage.active,
                capacity = usage.capacity,
                "slab after sweep"
            );
        }

        self.stats.last = Some(report.clone());
        report
    }

    /// Collects if an allocation has left some slab within its headroom.
    pub fn collect_if_necessary(&mut self) -> bool {
        if self.collect_soon {
            self.collect();
            true
        } else {
            false
        }
    }

    /// Sizes every mark map to its slab's high-water mark and pre-marks
    /// free slots so sweep leaves them alone.
    fn reset_marks(&self, marks: &mut MarkMaps) {
        fn reset<T: HeapObject>(heap: &Heap, marks: &mut MarkMaps) {
            let slab = T::slab(heap);
            let map = marks.map(T::CLASS);
            map.clear();
            map.resize(slab.high_water(), false);
            for &index in slab.free_indices() {
                map[index as usize] = true;
            }
        }
        reset::<Pair>(self, marks);
        reset::<Str>(self, marks);
        reset::<Symbol>(self, marks);
        reset::<Closure>(self, marks);
        reset::<TreeNode>(self, marks);
        reset::<Array>(self, marks);
        reset::<BytecodeArray>(self, marks);
        reset::<NativeFunction>(self, marks);
        reset::<Buffer>(self, marks);
        reset::<TreeBox>(self, marks);
    }

    fn sweep<T: HeapObject>(&mut self, marks: &mut MarkMaps) -> usize {
        let map = marks.map(T::CLASS);
        let slab = T::slab_mut(self);
        let mut freed = 0;
        for (index, bit) in map.iter_mut().enumerate() {
            if *bit {
                *bit = false;
            } else if slab.free_index(index).is_some() {
                freed += 1;
            }
        }
        freed
    }

    fn sweep_symbols(&mut self, marks: &mut MarkMaps) -> usize {
        let map = marks.map(SlabClass::Symbol);
        if !self.config().gc.reclaim_symbols {
            map.iter_mut().for_each(|bit| *bit = false);
            return 0;
        }
        let mut freed = 0;
        for (index, bit) in map.iter_mut().enumerate() {
            if *bit {
                *bit = false;
            } else if self.symbols.is_live(index) {
                self.symbol_table
                    .forget(&mut self.symbols, Ref::new(index as u32));
                freed += 1;
            }
        }
        freed
    }
}
