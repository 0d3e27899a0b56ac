//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - dispatch loop, call and return protocol, unwinding
//! - `arith` - numeric, comparison and bit operations

pub mod arith;
mod interpreter;

pub use interpreter::{TRACE_TARGET, evaluate};

use crate::error::{Error, Result};
use crate::gc::heap::Heap;
use crate::gc::object::ClosureRef;
use crate::gc::roots::Root;
use crate::runtime::function;
use crate::runtime::value::Value;

/// Applies `fun` to the argument list `args` from host code.
///
/// Lambdas and macros run in a nested VM invocation; host functions are
/// called directly with `caller` as their calling closure.
pub fn apply(heap: &mut Heap, caller: ClosureRef, fun: Value, args: Value) -> Result<Value> {
    let mut scope = heap.root_scope();
    scope.push(Root::Closure(caller));
    scope.push(fun);
    scope.push(args);
    match fun {
        Value::Lambda(c) | Value::Macro(c) => {
            let frame = function::call_frame(&mut scope, args, c)?;
            scope.push(Root::Closure(frame));
            let text = scope
                .get(frame)?
                .text
                .ok_or_else(|| Error::corrupted("procedure has no code"))?;
            evaluate(&mut scope, frame, text, false)
        }
        Value::NativeFunc(n) => {
            let items = scope.list_to_vec(args)?;
            function::call_native(&mut scope, caller, n, &items)
        }
        other => Err(function::not_applicable(&mut scope, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BytecodeBuilder, Opcode};
    use crate::config::HeapConfig;
    use crate::error::ExceptionKind;
    use crate::gc::object::{Arity, Closure, ClosureKind};
    use crate::runtime::environment;

    fn setup() -> (Heap, ClosureRef) {
        let mut heap = Heap::new(HeapConfig::small()).unwrap();
        let root = heap.allocate(Closure::new(None, ClosureKind::Root)).unwrap();
        heap.roots_mut().push(root);
        (heap, root)
    }

    fn run(heap: &mut Heap, root: ClosureRef, build: impl FnOnce(&mut BytecodeBuilder)) -> Result<Value> {
        let mut b = BytecodeBuilder::new();
        build(&mut b);
        let code = b.finish(heap)?;
        heap.roots_mut().push(Value::Bytecode(code));
        evaluate(heap, root, code, false)
    }

    fn kind_of(heap: &Heap, result: Result<Value>) -> Option<ExceptionKind> {
        match result {
            Err(Error::Thrown(value)) => heap.exception_kind(value),
            _ => None,
        }
    }

    #[test]
    fn test_int_add() {
        let (mut heap, root) = setup();
        let v = run(&mut heap, root, |b| {
            b.push_int(1).unwrap().push_int(2).unwrap().op(Opcode::IntAdd).op(Opcode::Ret);
        })
        .unwrap();
        assert_eq!(v, Value::Int(3));
        assert_eq!(heap.nesting(), 0);
    }

    #[test]
    fn test_apply_lambda_from_host() {
        let (mut heap, root) = setup();
        let x = heap.intern("x").unwrap();
        let params = heap.list(&[Value::Symbol(x)]).unwrap();
        heap.roots_mut().push(params);

        let mut body = BytecodeBuilder::new();
        body.get(x).unwrap().op(Opcode::IncInt).op(Opcode::Ret);
        let body = Value::Bytecode(body.finish(&mut heap).unwrap());
        heap.roots_mut().push(body);

        let f = function::lambda(&mut heap, root, Value::Nil, params, Value::Nil, body).unwrap();
        heap.roots_mut().push(f);
        let args = heap.list(&[Value::Int(41)]).unwrap();
        let v = apply(&mut heap, root, Value::Lambda(f), args).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    fn add_all(_heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
        Ok(Value::Int(args.iter().filter_map(Value::as_int).sum()))
    }

    #[test]
    fn test_apply_native_from_host() {
        let (mut heap, root) = setup();
        let f = function::define_native(&mut heap, root, "add-all", Arity::Variadic, add_all).unwrap();
        let args = heap
            .list(&[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(apply(&mut heap, root, f, args).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_applying_a_number_is_type_error() {
        let (mut heap, root) = setup();
        let err = apply(&mut heap, root, Value::Int(1), Value::Nil).unwrap_err();
        let thrown = err.thrown().unwrap();
        assert_eq!(heap.exception_kind(thrown), Some(ExceptionKind::TypeError));
    }

    #[test]
    fn test_def_binds_in_base_closure() {
        let (mut heap, root) = setup();
        let y = heap.intern("y").unwrap();
        run(&mut heap, root, |b| {
            b.push_int(9).unwrap().def(y).unwrap().op(Opcode::Ret);
        })
        .unwrap();
        assert_eq!(environment::lookup(&heap, root, y).unwrap(), Some(Value::Int(9)));
    }

    #[test]
    fn test_underflow_on_empty_ret() {
        let (mut heap, root) = setup();
        let r = run(&mut heap, root, |b| {
            b.op(Opcode::Ret);
        });
        assert_eq!(kind_of(&heap, r), Some(ExceptionKind::StackUnderflow));
    }
}
