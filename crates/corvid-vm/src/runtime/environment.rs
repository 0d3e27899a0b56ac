//! Lexical environments.
//!
//! A closure's bindings tree is one scope; its `parent` link is the
//! enclosing scope. Lookups and assignments walk the chain outward, while
//! definitions always land in the closure they are made in.

use crate::error::{ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::gc::object::{ClosureRef, SymbolRef};
use crate::runtime::tree;
use crate::runtime::value::Value;

/// Finds the nearest binding of `sym`, starting at `closure`.
pub fn lookup(heap: &Heap, closure: ClosureRef, sym: SymbolRef) -> Result<Option<Value>> {
    let mut cursor = Some(closure);
    while let Some(c) = cursor {
        let scope = heap.get(c)?;
        if let Some(value) = tree::get(heap, scope.bindings, sym)? {
            return Ok(Some(value));
        }
        cursor = scope.parent;
    }
    Ok(None)
}

/// Resolves `sym`, raising `unbound-variable` when nothing binds it.
pub fn get(heap: &mut Heap, closure: ClosureRef, sym: SymbolRef) -> Result<Value> {
    match lookup(heap, closure, sym)? {
        Some(value) => Ok(value),
        None => Err(heap.exception(
            ExceptionKind::UnboundVariable,
            "can't resolve symbol",
            Value::Symbol(sym),
        )),
    }
}

/// Binds `sym` in `closure` itself, shadowing any outer binding.
pub fn define(heap: &mut Heap, closure: ClosureRef, sym: SymbolRef, value: Value) -> Result<()> {
    let bindings = heap.get(closure)?.bindings;
    let mut scope = heap.root_scope();
    scope.push(value);
    let bindings = tree::insert(&mut scope, bindings, sym, value)?;
    scope.get_mut(closure)?.bindings = Some(bindings);
    Ok(())
}

/// Overwrites the nearest existing binding of `sym`.
///
/// Returns `false`, changing nothing, when no scope on the chain binds it.
pub fn set(heap: &mut Heap, closure: ClosureRef, sym: SymbolRef, value: Value) -> Result<bool> {
    let mut cursor = Some(closure);
    while let Some(c) = cursor {
        let (bindings, parent) = {
            let scope = heap.get(c)?;
            (scope.bindings, scope.parent)
        };
        if let Some(node) = tree::find(heap, bindings, sym)? {
            heap.get_mut(node)?.value = value;
            return Ok(true);
        }
        cursor = parent;
    }
    Ok(false)
}
