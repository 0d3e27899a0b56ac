//! Tree natives.
//!
//! Nil is accepted wherever a tree is expected and behaves as the empty
//! tree. `tree/set!` updates a tree in place, so every binding of it sees
//! the new key; on nil it returns a fresh tree.

use super::expect_symbol;
use crate::error::{ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::gc::object::{ClosureRef, TreeRef};
use crate::gc::roots::Root;
use crate::runtime::tree;
use crate::runtime::value::Value;

fn expect_tree(heap: &mut Heap, value: Value) -> Result<Option<TreeRef>> {
    match value {
        Value::Tree(b) => Ok(heap.get(b)?.root),
        Value::Nil => Ok(None),
        other => Err(heap.exception(ExceptionKind::TypeError, "expected a tree", other)),
    }
}

/// `(tree/new key value ...)`
pub fn new(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    if args.len() % 2 != 0 {
        let args = heap.list(args)?;
        return Err(heap.exception(
            ExceptionKind::ArityError,
            "tree/new expects key value pairs",
            args,
        ));
    }
    let mut scope = heap.root_scope();
    let mut t = None;
    for pair in args.chunks_exact(2) {
        let key = expect_symbol(&mut scope, pair[0])?;
        let root = tree::insert(&mut scope, t, key, pair[1])?;
        scope.push(Root::Tree(root));
        t = Some(root);
    }
    scope.tree(t)
}

/// `(tree/ref tree key)`, nil when unbound.
pub fn get(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    let key = expect_symbol(heap, args[1])?;
    Ok(tree::get(heap, t, key)?.unwrap_or(Value::Nil))
}

/// `(tree/has? tree key)`
pub fn has(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    let key = expect_symbol(heap, args[1])?;
    Ok(Value::Bool(tree::has(heap, t, key)?))
}

/// `(tree/set! tree key value)`
pub fn set(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    let key = expect_symbol(heap, args[1])?;
    let root = tree::insert(heap, t, key, args[2])?;
    match args[0] {
        Value::Tree(b) => {
            heap.get_mut(b)?.root = Some(root);
            Ok(args[0])
        }
        _ => heap.tree(Some(root)),
    }
}

/// `(tree/size tree)`
pub fn size(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    Ok(Value::Int(tree::size(heap, t)? as i64))
}

/// `(tree/dup tree)`
pub fn dup(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    let copy = tree::duplicate(heap, t)?;
    heap.tree(copy)
}

/// `(tree/keys tree)`
pub fn keys(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    tree::keys(heap, t)
}

/// `(tree/values tree)`
pub fn values(heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    let t = expect_tree(heap, args[0])?;
    tree::values(heap, t)
}
