//! Collector and application natives.

use crate::error::Result;
use crate::gc::heap::Heap;
use crate::gc::object::ClosureRef;
use crate::runtime::value::Value;
use crate::vm;

/// `(garbage-collect)` runs a full cycle and returns how many slots it freed.
pub fn garbage_collect(heap: &mut Heap, _caller: ClosureRef, _args: &[Value]) -> Result<Value> {
    let report = heap.collect();
    Ok(Value::Int(report.total_freed() as i64))
}

/// `(apply f args)`
pub fn apply(heap: &mut Heap, caller: ClosureRef, args: &[Value]) -> Result<Value> {
    vm::apply(heap, caller, args[0], args[1])
}
