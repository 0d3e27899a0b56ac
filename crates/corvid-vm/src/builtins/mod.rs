//! Host functions installed into every root closure.
//!
//! The set is deliberately small: tree access for code that uses trees
//! as records, a collector entry point and `apply`. Embedders register
//! their own with [`function::define_native`].

pub mod system;
pub mod tree;

use crate::error::{ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::gc::object::{Arity, ClosureRef, NativeFn, SymbolRef};
use crate::runtime::function;
use crate::runtime::value::Value;

const NATIVES: &[(&str, Arity, NativeFn)] = &[
    ("tree/new", Arity::Variadic, tree::new),
    ("tree/ref", Arity::Fixed(2), tree::get),
    ("tree/has?", Arity::Fixed(2), tree::has),
    ("tree/set!", Arity::Fixed(3), tree::set),
    ("tree/size", Arity::Fixed(1), tree::size),
    ("tree/dup", Arity::Fixed(1), tree::dup),
    ("tree/keys", Arity::Fixed(1), tree::keys),
    ("tree/values", Arity::Fixed(1), tree::values),
    ("garbage-collect", Arity::Fixed(0), system::garbage_collect),
    ("apply", Arity::Fixed(2), system::apply),
];

/// Binds every core host function in `root`.
pub fn install(heap: &mut Heap, root: ClosureRef) -> Result<()> {
    for &(name, arity, fp) in NATIVES {
        function::define_native(heap, root, name, arity, fp)?;
    }
    tracing::debug!(count = NATIVES.len(), "installed core natives");
    Ok(())
}

/// Raises `type-error` unless `value` is a symbol.
pub(crate) fn expect_symbol(heap: &mut Heap, value: Value) -> Result<SymbolRef> {
    match value {
        Value::Symbol(sym) => Ok(sym),
        other => Err(heap.exception(ExceptionKind::TypeError, "expected a symbol", other)),
    }
}
