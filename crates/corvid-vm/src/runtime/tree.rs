//! AVL trees mapping symbols to values.
//!
//! These back closure bindings and first-class tree values. Keys are ordered
//! by symbol slab index. Bindings are only ever added or overwritten; a whole
//! tree goes away with its owner.
//!
//! Every function takes the tree as `Option<TreeRef>`, `None` being the
//! empty tree. The caller keeps the tree's owner reachable while inserting,
//! since inserting allocates.

use std::cmp::Ordering;

use crate::error::Result;
use crate::gc::heap::Heap;
use crate::gc::object::{SymbolRef, TreeNode, TreeRef};
use crate::gc::roots::Root;
use crate::runtime::value::Value;

fn height(heap: &Heap, tree: Option<TreeRef>) -> Result<i32> {
    match tree {
        Some(t) => Ok(i32::from(heap.get(t)?.height)),
        None => Ok(0),
    }
}

fn update_height(heap: &mut Heap, t: TreeRef) -> Result<()> {
    let node = *heap.get(t)?;
    let h = height(heap, node.left)?.max(height(heap, node.right)?) + 1;
    heap.get_mut(t)?.height = h as u16;
    Ok(())
}

fn balance_factor(heap: &Heap, t: TreeRef) -> Result<i32> {
    let node = heap.get(t)?;
    Ok(height(heap, node.left)? - height(heap, node.right)?)
}

fn rotate_right(heap: &mut Heap, t: TreeRef) -> Result<TreeRef> {
    let Some(pivot) = heap.get(t)?.left else {
        return Ok(t);
    };
    let moved = heap.get(pivot)?.right;
    heap.get_mut(pivot)?.right = Some(t);
    heap.get_mut(t)?.left = moved;
    update_height(heap, t)?;
    update_height(heap, pivot)?;
    Ok(pivot)
}

fn rotate_left(heap: &mut Heap, t: TreeRef) -> Result<TreeRef> {
    let Some(pivot) = heap.get(t)?.right else {
        return Ok(t);
    };
    let moved = heap.get(pivot)?.left;
    heap.get_mut(pivot)?.left = Some(t);
    heap.get_mut(t)?.right = moved;
    update_height(heap, t)?;
    update_height(heap, pivot)?;
    Ok(pivot)
}

/// Restores the AVL bound at `t` after `key` was inserted below it.
fn rebalance(heap: &mut Heap, t: TreeRef, key: SymbolRef) -> Result<TreeRef> {
    let balance = balance_factor(heap, t)?;
    let node = *heap.get(t)?;
    if balance > 1 {
        if let Some(left) = node.left {
            if key > heap.get(left)?.key {
                let rotated = rotate_left(heap, left)?;
                heap.get_mut(t)?.left = Some(rotated);
            }
        }
        return rotate_right(heap, t);
    }
    if balance < -1 {
        if let Some(right) = node.right {
            if key < heap.get(right)?.key {
                let rotated = rotate_right(heap, right)?;
                heap.get_mut(t)?.right = Some(rotated);
            }
        }
        return rotate_left(heap, t);
    }
    Ok(t)
}

/// Binds `key` to `value`, returning the new root.
///
/// An existing binding is overwritten in place; otherwise a node is
/// allocated and the path back to the root is rebalanced.
pub fn insert(
    heap: &mut Heap,
    tree: Option<TreeRef>,
    key: SymbolRef,
    value: Value,
) -> Result<TreeRef> {
    let Some(t) = tree else {
        return heap.allocate(TreeNode::leaf(key, value));
    };
    let node = *heap.get(t)?;
    match key.cmp(&node.key) {
        Ordering::Equal => {
            heap.get_mut(t)?.value = value;
            return Ok(t);
        }
        Ordering::Less => {
            let left = insert(heap, node.left, key, value)?;
            heap.get_mut(t)?.left = Some(left);
        }
        Ordering::Greater => {
            let right = insert(heap, node.right, key, value)?;
            heap.get_mut(t)?.right = Some(right);
        }
    }
    update_height(heap, t)?;
    rebalance(heap, t, key)
}

/// Finds the node holding `key`.
pub fn find(heap: &Heap, tree: Option<TreeRef>, key: SymbolRef) -> Result<Option<TreeRef>> {
    let mut cursor = tree;
    while let Some(t) = cursor {
        let node = heap.get(t)?;
        cursor = match key.cmp(&node.key) {
            Ordering::Equal => return Ok(Some(t)),
            Ordering::Less => node.left,
            Ordering::Greater => node.right,
        };
    }
    Ok(None)
}

/// Value bound to `key`, if any.
pub fn get(heap: &Heap, tree: Option<TreeRef>, key: SymbolRef) -> Result<Option<Value>> {
    match find(heap, tree, key)? {
        Some(t) => Ok(Some(heap.get(t)?.value)),
        None => Ok(None),
    }
}

/// Whether `key` is bound.
pub fn has(heap: &Heap, tree: Option<TreeRef>, key: SymbolRef) -> Result<bool> {
    Ok(find(heap, tree, key)?.is_some())
}

/// Copies the tree structure; values are shared.
pub fn duplicate(heap: &mut Heap, tree: Option<TreeRef>) -> Result<Option<TreeRef>> {
    let Some(t) = tree else {
        return Ok(None);
    };
    let node = *heap.get(t)?;
    let mut scope = heap.root_scope();
    let left = duplicate(&mut scope, node.left)?;
    if let Some(left) = left {
        scope.push(Root::Tree(left));
    }
    let right = duplicate(&mut scope, node.right)?;
    let copy = scope.allocate(TreeNode {
        left,
        right,
        ..node
    })?;
    Ok(Some(copy))
}

/// Number of bindings.
pub fn size(heap: &Heap, tree: Option<TreeRef>) -> Result<usize> {
    let mut count = 0;
    let mut pending: Vec<TreeRef> = tree.into_iter().collect();
    while let Some(t) = pending.pop() {
        let node = heap.get(t)?;
        count += 1;
        pending.extend(node.left);
        pending.extend(node.right);
    }
    Ok(count)
}

/// Every binding in key order.
pub fn entries(heap: &Heap, tree: Option<TreeRef>) -> Result<Vec<(SymbolRef, Value)>> {
    let mut out = Vec::new();
    let mut stack = Vec::new();
    let mut cursor = tree;
    loop {
        while let Some(t) = cursor {
            stack.push(t);
            cursor = heap.get(t)?.left;
        }
        let Some(t) = stack.pop() else {
            break;
        };
        let node = heap.get(t)?;
        out.push((node.key, node.value));
        cursor = node.right;
    }
    Ok(out)
}

/// Keys in order, as a list of symbols.
pub fn keys(heap: &mut Heap, tree: Option<TreeRef>) -> Result<Value> {
    let items: Vec<Value> = entries(heap, tree)?
        .into_iter()
        .map(|(k, _)| Value::Symbol(k))
        .collect();
    heap.list(&items)
}

/// Values in key order, as a list.
pub fn values(heap: &mut Heap, tree: Option<TreeRef>) -> Result<Value> {
    let items: Vec<Value> = entries(heap, tree)?.into_iter().map(|(_, v)| v).collect();
    heap.list(&items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;

    fn heap() -> Heap {
        Heap::new(HeapConfig::small()).unwrap()
    }

    fn symbols(heap: &mut Heap, n: usize) -> Vec<SymbolRef> {
        (0..n).map(|i| heap.intern(&format!("s{}", i)).unwrap()).collect()
    }

    /// Checks the AVL bound and stored heights, returning the height.
    fn check(heap: &Heap, tree: Option<TreeRef>) -> i32 {
        let Some(t) = tree else { return 0 };
        let node = *heap.get(t).unwrap();
        let l = check(heap, node.left);
        let r = check(heap, node.right);
        assert!((l - r).abs() <= 1, "unbalanced at {:?}", t);
        assert_eq!(i32::from(node.height), l.max(r) + 1);
        l.max(r) + 1
    }

    #[test]
    fn test_in_order_is_sorted_and_balanced() {
        let mut heap = heap();
        let syms = symbols(&mut heap, 200);
        // A scrambled but deterministic insertion order.
        let mut tree = None;
        for i in 0..syms.len() {
            let k = syms[(i * 37) % syms.len()];
            tree = Some(insert(&mut heap, tree, k, Value::Int(i as i64)).unwrap());
        }
        let h = check(&heap, tree);
        // 1.44 * log2(201) is just over 11.
        assert!(h <= 11, "height {} exceeds the AVL bound", h);

        let keys: Vec<_> = entries(&heap, tree).unwrap().into_iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(size(&heap, tree).unwrap(), 200);
    }

    #[test]
    fn test_ascending_and_descending_inserts_stay_balanced() {
        let mut heap = heap();
        let syms = symbols(&mut heap, 64);
        let mut up = None;
        let mut down = None;
        for (i, k) in syms.iter().enumerate() {
            up = Some(insert(&mut heap, up, *k, Value::Int(i as i64)).unwrap());
        }
        for (i, k) in syms.iter().rev().enumerate() {
            down = Some(insert(&mut heap, down, *k, Value::Int(i as i64)).unwrap());
        }
        assert_eq!(check(&heap, up), 7);
        assert_eq!(check(&heap, down), 7);
    }

    #[test]
    fn test_zig_zag_inserts_use_double_rotation() {
        let mut heap = heap();
        let syms = symbols(&mut heap, 3);
        let (a, b, c) = (syms[0], syms[1], syms[2]);

        let mut tree = Some(insert(&mut heap, None, c, Value::Nil).unwrap());
        tree = Some(insert(&mut heap, tree, a, Value::Nil).unwrap());
        tree = Some(insert(&mut heap, tree, b, Value::Nil).unwrap());
        assert_eq!(heap.get(tree.unwrap()).unwrap().key, b);

        let mut tree = Some(insert(&mut heap, None, a, Value::Nil).unwrap());
        tree = Some(insert(&mut heap, tree, c, Value::Nil).unwrap());
        tree = Some(insert(&mut heap, tree, b, Value::Nil).unwrap());
        assert_eq!(heap.get(tree.unwrap()).unwrap().key, b);
        check(&heap, tree);
    }

    #[test]
    fn test_get_after_insert_and_overwrite() {
        let mut heap = heap();
        let syms = symbols(&mut heap, 10);
        let mut tree = None;
        for (i, k) in syms.iter().enumerate() {
            tree = Some(insert(&mut heap, tree, *k, Value::Int(i as i64)).unwrap());
        }
        assert_eq!(get(&heap, tree, syms[4]).unwrap(), Some(Value::Int(4)));

        tree = Some(insert(&mut heap, tree, syms[4], Value::Bool(true)).unwrap());
        assert_eq!(get(&heap, tree, syms[4]).unwrap(), Some(Value::Bool(true)));
        assert_eq!(size(&heap, tree).unwrap(), 10);

        let missing = heap.intern("missing").unwrap();
        assert!(!has(&heap, tree, missing).unwrap());
        assert!(has(&heap, tree, syms[9]).unwrap());
        assert_eq!(get(&heap, None, missing).unwrap(), None);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut heap = heap();
        let syms = symbols(&mut heap, 8);
        let mut tree = None;
        for k in &syms {
            tree = Some(insert(&mut heap, tree, *k, Value::Int(1)).unwrap());
        }
        let copy = duplicate(&mut heap, tree).unwrap();
        assert_ne!(copy, tree);
        insert(&mut heap, copy, syms[0], Value::Int(2)).unwrap();

        assert_eq!(get(&heap, tree, syms[0]).unwrap(), Some(Value::Int(1)));
        assert_eq!(get(&heap, copy, syms[0]).unwrap(), Some(Value::Int(2)));
        assert_eq!(size(&heap, copy).unwrap(), 8);
        assert_eq!(heap.roots().len(), 0);
    }

    #[test]
    fn test_keys_and_values_follow_key_order() {
        let mut heap = heap();
        let syms = symbols(&mut heap, 3);
        let mut tree = None;
        for (i, k) in syms.iter().enumerate().rev() {
            tree = Some(insert(&mut heap, tree, *k, Value::Int(i as i64)).unwrap());
        }
        let keys = keys(&mut heap, tree).unwrap();
        let values = values(&mut heap, tree).unwrap();
        assert_eq!(
            heap.list_to_vec(keys).unwrap(),
            syms.iter().copied().map(Value::Symbol).collect::<Vec<_>>()
        );
        assert_eq!(
            heap.list_to_vec(values).unwrap(),
            vec![Value::Int(0), Value::Int(1), Value::Int(2)]
        );
    }
}
