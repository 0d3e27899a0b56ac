//! End-to-end tests for the heap, the collector and the interpreter.
//!
//! Programs are assembled with `BytecodeBuilder` and run through `Runtime`.

use corvid_vm::bytecode::{BytecodeBuilder, Opcode};
use corvid_vm::config::SlabCapacities;
use corvid_vm::gc::SlabClass;
use corvid_vm::gc::object::SYMBOL_MAX_LEN;
use corvid_vm::{Arity, BytecodeRef, ClosureRef, Error, ExceptionKind, Heap, HeapConfig, Result, Runtime, Value};
use std::sync::atomic::Ordering;

fn runtime() -> Runtime {
    Runtime::with_config(HeapConfig::small()).unwrap()
}

/// Assembles a program and keeps it rooted for the rest of the test.
fn assemble(rt: &mut Runtime, build: impl FnOnce(&mut BytecodeBuilder)) -> BytecodeRef {
    let mut b = BytecodeBuilder::new();
    build(&mut b);
    let code = b.finish(rt.heap_mut()).unwrap();
    rt.heap_mut().roots_mut().push(Value::Bytecode(code));
    code
}

/// Assembles a procedure body as a rooted literal.
fn body(rt: &mut Runtime, build: impl FnOnce(&mut BytecodeBuilder)) -> Value {
    Value::Bytecode(assemble(rt, build))
}

/// A rooted parameter list.
fn params(rt: &mut Runtime, names: &[&str]) -> Value {
    let mut syms = Vec::new();
    for name in names {
        syms.push(rt.heap_mut().symbol(name).unwrap());
    }
    let list = rt.heap_mut().list(&syms).unwrap();
    rt.heap_mut().roots_mut().push(list);
    list
}

fn thrown_kind(rt: &Runtime, result: Result<Value>) -> Option<ExceptionKind> {
    match result {
        Err(Error::Thrown(exception)) => rt.heap().exception_kind(exception),
        other => panic!("expected a thrown exception, got {:?}", other),
    }
}

fn identity(_heap: &mut Heap, _caller: ClosureRef, args: &[Value]) -> Result<Value> {
    Ok(args[0])
}

// ============================================================================
// Interpreter
// ============================================================================

#[test]
fn test_int_add_returns_three() {
    let mut rt = runtime();
    let code = assemble(&mut rt, |b| {
        b.push_int(1).unwrap().push_int(2).unwrap();
        b.op(Opcode::IntAdd).op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(3));
}

#[test]
fn test_pop_on_empty_stack_is_underflow() {
    let mut rt = runtime();
    let code = assemble(&mut rt, |b| {
        b.op(Opcode::Drop).op(Opcode::PushNil).op(Opcode::Ret);
    });
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::StackUnderflow));
}

#[test]
fn test_try_handler_receives_thrown_value() {
    let mut rt = runtime();
    let handler = rt.define_native("identity", Arity::Fixed(1), identity).unwrap();
    let code = assemble(&mut rt, |b| {
        let resume = b.label();
        b.op_literal(Opcode::PushLiteral, handler).unwrap();
        b.jump(Opcode::Try, resume).unwrap();
        b.push_int(7).unwrap().op(Opcode::Throw);
        b.bind(resume).unwrap().op(Opcode::Ret);
    });
    let caught = rt.evaluate(code).unwrap();
    assert!(matches!(caught, Value::Exception(_)));
    assert_eq!(rt.heap().car(caught).unwrap(), Value::Int(7));
}

#[test]
fn test_lambda_handler_resumes_after_try() {
    let mut rt = runtime();
    let e = rt.intern("e").unwrap();
    let params = params(&mut rt, &["e"]);
    let handler_body = body(&mut rt, |b| {
        b.get(e).unwrap().op(Opcode::Car).op(Opcode::Ret);
    });
    let code = assemble(&mut rt, |b| {
        let resume = b.label();
        b.lambda(Opcode::Fn, Value::Nil, params, Value::Nil, handler_body)
            .unwrap();
        b.jump(Opcode::Try, resume).unwrap();
        b.push_int(7).unwrap().op(Opcode::Throw);
        b.bind(resume).unwrap();
        b.push_int(1).unwrap().op(Opcode::Add).op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(8));
}

#[test]
fn test_try_without_throw_pops_its_frame() {
    let mut rt = runtime();
    let handler = rt.define_native("identity", Arity::Fixed(1), identity).unwrap();
    let code = assemble(&mut rt, |b| {
        let done = b.label();
        b.op_literal(Opcode::PushLiteral, handler).unwrap();
        b.jump(Opcode::Try, done).unwrap();
        b.push_int(5).unwrap().op(Opcode::ClosurePop);
        b.bind(done).unwrap().op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(5));
}

#[test]
fn test_runaway_recursion_is_too_deep() {
    let config = HeapConfig {
        vm: corvid_vm::config::VmConfig {
            max_frames: 64,
            ..Default::default()
        },
        ..HeapConfig::small()
    };
    let mut rt = Runtime::with_config(config).unwrap();
    let f = rt.intern("f").unwrap();
    let recurse = body(&mut rt, |b| {
        b.get(f).unwrap().apply(0).op(Opcode::Ret);
    });
    let code = assemble(&mut rt, |b| {
        b.lambda(Opcode::Fn, Value::Symbol(f), Value::Nil, Value::Nil, recurse)
            .unwrap();
        b.def(f).unwrap().apply(0).op(Opcode::Ret);
    });
    let exception = match rt.evaluate(code) {
        Err(Error::Thrown(exception)) => exception,
        other => panic!("expected too-deep, got {:?}", other),
    };
    assert_eq!(rt.heap().exception_kind(exception), Some(ExceptionKind::TooDeep));

    // The trace names the recursing lambda, innermost first.
    let trace = rt.heap().exception_trace(exception).unwrap();
    assert!(matches!(rt.heap().car(trace).unwrap(), Value::Lambda(_)));

    // The runtime is still usable.
    let code = assemble(&mut rt, |b| {
        b.push_int(1).unwrap().op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(1));
    assert_eq!(rt.heap().nesting(), 0);
}

fn reenter(heap: &mut Heap, caller: ClosureRef, args: &[Value]) -> Result<Value> {
    corvid_vm::vm::apply(heap, caller, args[0], Value::Nil)
}

/// Defines `f`, which calls itself through `reenter` so every call is a
/// fresh evaluator invocation, and returns code that calls it.
fn reentrant_recursion(rt: &mut Runtime) -> BytecodeRef {
    rt.define_native("reenter", Arity::Fixed(1), reenter).unwrap();
    let f = rt.intern("f").unwrap();
    let reenter_sym = rt.intern("reenter").unwrap();
    let recurse = body(rt, |b| {
        b.get(reenter_sym).unwrap().get(f).unwrap().apply(1).op(Opcode::Ret);
    });
    assemble(rt, |b| {
        b.lambda(Opcode::Fn, Value::Symbol(f), Value::Nil, Value::Nil, recurse)
            .unwrap();
        b.def(f).unwrap().apply(0).op(Opcode::Ret);
    })
}

#[test]
fn test_nested_invocations_are_bounded() {
    let config = HeapConfig {
        vm: corvid_vm::config::VmConfig {
            max_nesting: 8,
            ..Default::default()
        },
        ..HeapConfig::small()
    };
    let mut rt = Runtime::with_config(config).unwrap();
    let code = reentrant_recursion(&mut rt);
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::TooDeep));
    assert_eq!(rt.heap().nesting(), 0);
}

#[test]
fn test_default_nesting_limit_fits_a_small_stack() {
    let outcome = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let mut rt = Runtime::new().unwrap();
            let code = reentrant_recursion(&mut rt);
            let result = rt.evaluate(code);
            (thrown_kind(&rt, result), rt.heap().nesting())
        })
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(outcome, (Some(ExceptionKind::TooDeep), 0));
}

#[test]
fn test_throw_inside_called_lambda_reaches_enclosing_try() {
    let mut rt = runtime();
    let handler = rt.define_native("identity", Arity::Fixed(1), identity).unwrap();
    let f = rt.intern("f").unwrap();
    let thrower = body(&mut rt, |b| {
        b.push_int(9).unwrap().op(Opcode::Throw);
    });
    let code = assemble(&mut rt, |b| {
        let resume = b.label();
        b.lambda(Opcode::Fn, Value::Symbol(f), Value::Nil, Value::Nil, thrower)
            .unwrap();
        b.def(f).unwrap().op(Opcode::Drop);
        b.op_literal(Opcode::PushLiteral, handler).unwrap();
        b.jump(Opcode::Try, resume).unwrap();
        b.get(f).unwrap().apply(0).op(Opcode::ClosurePop).op(Opcode::Ret);
        b.bind(resume).unwrap().op(Opcode::Ret);
    });
    let roots = rt.heap().roots().len();

    let caught = rt.evaluate(code).unwrap();
    assert!(matches!(caught, Value::Exception(_)));
    assert_eq!(rt.heap().car(caught).unwrap(), Value::Int(9));
    assert_eq!(rt.heap().nesting(), 0);
    assert_eq!(rt.heap().roots().len(), roots);
}

fn return_nine(_heap: &mut Heap, _caller: ClosureRef, _args: &[Value]) -> Result<Value> {
    Ok(Value::Int(9))
}

#[test]
fn test_throw_inside_nested_invocation_reaches_outer_try() {
    let mut rt = runtime();
    let handler = rt.define_native("identity", Arity::Fixed(1), identity).unwrap();
    rt.define_native("reenter", Arity::Fixed(1), reenter).unwrap();
    rt.define_native("nine", Arity::Fixed(0), return_nine).unwrap();
    let reenter_sym = rt.intern("reenter").unwrap();
    let nine = rt.intern("nine").unwrap();
    let f = rt.intern("f").unwrap();
    // The throw happens two evaluator levels below the try.
    let thrower = body(&mut rt, |b| {
        b.get(nine).unwrap().apply(0).op(Opcode::Throw);
    });
    let code = assemble(&mut rt, |b| {
        let resume = b.label();
        b.lambda(Opcode::Fn, Value::Symbol(f), Value::Nil, Value::Nil, thrower)
            .unwrap();
        b.def(f).unwrap().op(Opcode::Drop);
        b.op_literal(Opcode::PushLiteral, handler).unwrap();
        b.jump(Opcode::Try, resume).unwrap();
        b.get(reenter_sym).unwrap().get(f).unwrap().apply(1);
        b.op(Opcode::ClosurePop).op(Opcode::Ret);
        b.bind(resume).unwrap().op(Opcode::Ret);
    });
    let roots = rt.heap().roots().len();

    let caught = rt.evaluate(code).unwrap();
    assert!(matches!(caught, Value::Exception(_)));
    assert_eq!(rt.heap().car(caught).unwrap(), Value::Int(9));
    assert_eq!(rt.heap().nesting(), 0);
    assert_eq!(rt.heap().roots().len(), roots);
}

#[test]
fn test_handler_rethrow_reaches_outer_try() {
    let mut rt = runtime();
    let outer_handler = rt.define_native("identity", Arity::Fixed(1), identity).unwrap();
    let e = rt.intern("e").unwrap();
    let params = params(&mut rt, &["e"]);
    let rethrow = body(&mut rt, |b| {
        b.get(e).unwrap().op(Opcode::Car);
        b.push_int(1).unwrap().op(Opcode::Add).op(Opcode::Throw);
    });
    let code = assemble(&mut rt, |b| {
        let outer = b.label();
        let inner = b.label();
        b.op_literal(Opcode::PushLiteral, outer_handler).unwrap();
        b.jump(Opcode::Try, outer).unwrap();
        b.lambda(Opcode::Fn, Value::Nil, params, Value::Nil, rethrow)
            .unwrap();
        b.jump(Opcode::Try, inner).unwrap();
        b.push_int(9).unwrap().op(Opcode::Throw);
        b.bind(inner).unwrap();
        b.push_int(-1).unwrap().op(Opcode::Ret);
        b.bind(outer).unwrap().op(Opcode::Ret);
    });
    let roots = rt.heap().roots().len();

    let caught = rt.evaluate(code).unwrap();
    assert!(matches!(caught, Value::Exception(_)));
    assert_eq!(rt.heap().car(caught).unwrap(), Value::Int(10));
    assert_eq!(rt.heap().nesting(), 0);
    assert_eq!(rt.heap().roots().len(), roots);
}

#[test]
fn test_set_through_parent_chain() {
    let mut rt = runtime();
    let x = rt.intern("x").unwrap();
    let setter = body(&mut rt, |b| {
        b.push_int(2).unwrap().set(x).unwrap().op(Opcode::Ret);
    });
    let code = assemble(&mut rt, |b| {
        b.push_int(1).unwrap().def(x).unwrap().op(Opcode::Drop);
        b.lambda(Opcode::Fn, Value::Nil, Value::Nil, Value::Nil, setter)
            .unwrap();
        b.apply(0).op(Opcode::Drop);
        b.get(x).unwrap().op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(2));
}

#[test]
fn test_set_of_unbound_symbol_is_thrown() {
    let mut rt = runtime();
    let nowhere = rt.intern("nowhere").unwrap();
    let code = assemble(&mut rt, |b| {
        b.push_int(1).unwrap().set(nowhere).unwrap().op(Opcode::Ret);
    });
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::UnboundVariable));
}

#[test]
fn test_let_scope_shadows_then_pops() {
    let mut rt = runtime();
    let x = rt.intern("x").unwrap();
    let code = assemble(&mut rt, |b| {
        b.push_int(1).unwrap().def(x).unwrap().op(Opcode::Drop);
        b.op(Opcode::Let);
        b.push_int(9).unwrap().def(x).unwrap().op(Opcode::Drop);
        b.get(x).unwrap();
        b.op(Opcode::ClosurePop);
        b.get(x).unwrap().op(Opcode::Cons).op(Opcode::Ret);
    });
    let pair = rt.evaluate(code).unwrap();
    assert_eq!(rt.heap().car(pair).unwrap(), Value::Int(9));
    assert_eq!(rt.heap().cdr(pair).unwrap(), Value::Int(1));
}

#[test]
fn test_closures_capture_their_scope() {
    let mut rt = runtime();
    let n = rt.intern("n").unwrap();
    let inner = body(&mut rt, |b| {
        b.get(n).unwrap().op(Opcode::Ret);
    });
    let outer_params = params(&mut rt, &["n"]);
    let outer = body(&mut rt, |b| {
        b.lambda(Opcode::Fn, Value::Nil, Value::Nil, Value::Nil, inner)
            .unwrap();
        b.op(Opcode::Ret);
    });
    let code = assemble(&mut rt, |b| {
        b.lambda(Opcode::Fn, Value::Nil, outer_params, Value::Nil, outer)
            .unwrap();
        b.push_int(5).unwrap().apply(1).apply(0).op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(5));
}

#[test]
fn test_counting_loop() {
    let mut rt = runtime();
    let acc = rt.intern("acc").unwrap();
    let n = rt.intern("n").unwrap();
    let code = assemble(&mut rt, |b| {
        let top = b.label();
        let end = b.label();
        b.push_int(0).unwrap().def(acc).unwrap().op(Opcode::Drop);
        b.push_int(10).unwrap().def(n).unwrap().op(Opcode::Drop);
        b.bind(top).unwrap();
        b.get(n).unwrap().op(Opcode::ZeroPred);
        b.jump(Opcode::Jt, end).unwrap();
        b.get(acc).unwrap().get(n).unwrap().op(Opcode::Add);
        b.set(acc).unwrap().op(Opcode::Drop);
        b.get(n).unwrap().push_int(-1).unwrap().op(Opcode::Add);
        b.set(n).unwrap().op(Opcode::Drop);
        b.jump(Opcode::Jmp, top).unwrap();
        b.bind(end).unwrap();
        b.get(acc).unwrap().op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(55));
}

#[test]
fn test_eval_runs_code_in_an_environment() {
    let mut rt = runtime();
    let x = rt.intern("x").unwrap();
    let inner = body(&mut rt, |b| {
        b.get(x).unwrap().op(Opcode::IncInt).op(Opcode::Ret);
    });
    let code = assemble(&mut rt, |b| {
        b.push_int(3).unwrap().def(x).unwrap().op(Opcode::Drop);
        b.op_literal(Opcode::PushLiteral, inner).unwrap();
        b.op(Opcode::ClosurePush).op(Opcode::Eval).op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(4));
}

#[test]
fn test_apply_collection_with_native() {
    let mut rt = runtime();
    let tree_new = rt.intern("tree/new").unwrap();
    let tree_size = rt.intern("tree/size").unwrap();
    let a = rt.heap_mut().symbol("a").unwrap();
    let code = assemble(&mut rt, |b| {
        b.get(tree_size).unwrap();
        b.get(tree_new).unwrap();
        b.push(a).unwrap().push_int(1).unwrap().op_byte(Opcode::List, 2);
        b.op(Opcode::ApplyCollection);
        b.apply(1).op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(1));
}

#[test]
fn test_interrupt_stops_a_spinning_loop() {
    let mut rt = runtime();
    let code = assemble(&mut rt, |b| {
        let top = b.label();
        b.bind(top).unwrap();
        b.jump(Opcode::Jmp, top).unwrap();
    });
    rt.interrupt_handle().store(true, Ordering::Release);
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::Interrupt));
}

#[test]
fn test_interrupt_is_seen_after_a_collection_outside_loops() {
    let mut rt = runtime();
    let gc = rt.intern("garbage-collect").unwrap();
    let code = assemble(&mut rt, |b| {
        b.get(gc).unwrap().apply(0).op(Opcode::Drop);
        b.push_int(1).unwrap().op(Opcode::Ret);
    });
    rt.interrupt_handle().store(true, Ordering::Release);
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::Interrupt));
}

#[test]
fn test_interrupt_is_seen_after_an_allocation_collects() {
    let mut config = HeapConfig::small();
    config.capacity.pairs = 4;
    config.gc.headroom = 0.0;
    let mut rt = Runtime::with_config(config).unwrap();
    let code = assemble(&mut rt, |b| {
        for _ in 0..8 {
            b.op(Opcode::PushNil).op(Opcode::PushNil).op(Opcode::Cons).op(Opcode::Drop);
        }
        b.push_int(1).unwrap().op(Opcode::Ret);
    });
    rt.interrupt_handle().store(true, Ordering::Release);
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::Interrupt));
}

#[test]
fn test_running_off_the_end_is_no_return() {
    let mut rt = runtime();
    let code = assemble(&mut rt, |b| {
        b.push_int(1).unwrap();
    });
    let result = rt.evaluate(code);
    assert_eq!(thrown_kind(&rt, result), Some(ExceptionKind::NoReturn));
}

#[test]
fn test_uncaught_exception_restores_roots() {
    let mut rt = runtime();
    let before = rt.heap().roots().len();
    let missing = rt.intern("missing").unwrap();
    let mut b = BytecodeBuilder::new();
    b.get(missing).unwrap().op(Opcode::Ret);
    let code = b.finish(rt.heap_mut()).unwrap();
    assert!(rt.evaluate(code).is_err());
    assert_eq!(rt.heap().roots().len(), before);
}

#[test]
fn test_tree_set_is_visible_through_its_binding() {
    let mut rt = runtime();
    let tree_new = rt.intern("tree/new").unwrap();
    let tree_set = rt.intern("tree/set!").unwrap();
    let tree_size = rt.intern("tree/size").unwrap();
    let t = rt.intern("t").unwrap();
    let mut keys = Vec::new();
    for name in ["a", "b", "c", "d", "e"] {
        keys.push(rt.heap_mut().symbol(name).unwrap());
    }
    let code = assemble(&mut rt, |b| {
        b.get(tree_new).unwrap().push(keys[0]).unwrap().push_int(0).unwrap();
        b.apply(2).def(t).unwrap().op(Opcode::Drop);
        // Results are dropped: only the binding is read afterwards.
        for (i, key) in keys.iter().enumerate().skip(1) {
            b.get(tree_set).unwrap().get(t).unwrap();
            b.push(*key).unwrap().push_int(i as i64).unwrap();
            b.apply(3).op(Opcode::Drop);
        }
        b.get(tree_size).unwrap().get(t).unwrap().apply(1).op(Opcode::Ret);
    });
    assert_eq!(rt.evaluate(code).unwrap(), Value::Int(5));

    let tree_ref = rt.get("tree/ref").unwrap();
    let bound = rt.get("t").unwrap();
    for (i, key) in keys.iter().enumerate() {
        let args = rt.heap_mut().list(&[bound, *key]).unwrap();
        assert_eq!(rt.apply(tree_ref, args).unwrap(), Value::Int(i as i64));
    }
}

// ============================================================================
// Heap and collector
// ============================================================================

fn tiny(pairs: usize) -> Heap {
    let mut config = HeapConfig::small();
    config.capacity = SlabCapacities {
        pairs,
        ..SlabCapacities::uniform(256)
    };
    Heap::new(config).unwrap()
}

#[test]
fn test_allocation_does_not_alias_and_exhausts() {
    let mut heap = tiny(8);
    let mut list = Value::Nil;
    let mut seen = Vec::new();
    for i in 0..8 {
        list = heap.cons(Value::Int(i), list).unwrap();
        heap.roots_mut().push(list);
        assert!(!seen.contains(&list));
        seen.push(list);
    }
    assert!(matches!(
        heap.cons(Value::Nil, Value::Nil),
        Err(Error::OutOfMemory(SlabClass::Pair))
    ));
    assert_eq!(heap.list_to_vec(list).unwrap().len(), 8);
}

#[test]
fn test_freed_slots_are_reused() {
    let mut heap = tiny(8);
    let Value::Pair(first) = heap.cons(Value::Int(1), Value::Nil).unwrap() else {
        unreachable!()
    };
    heap.free(first);
    let Value::Pair(second) = heap.cons(Value::Int(2), Value::Nil).unwrap() else {
        unreachable!()
    };
    assert_eq!(first, second);
    assert_eq!(heap.usage(SlabClass::Pair).active, 1);
}

#[test]
fn test_interning_is_idempotent_and_truncates() {
    let mut heap = tiny(8);
    let a = heap.intern("alpha").unwrap();
    assert_eq!(heap.intern("alpha").unwrap(), a);
    assert_ne!(heap.intern("beta").unwrap(), a);

    let long = "x".repeat(200);
    let longer = "x".repeat(300);
    let sym = heap.intern(&long).unwrap();
    assert_eq!(heap.symbol_name(sym).unwrap().len(), SYMBOL_MAX_LEN);
    assert_eq!(heap.intern(&longer).unwrap(), sym);
}

#[test]
fn test_collector_keeps_roots_and_frees_garbage() {
    let mut heap = tiny(64);
    let kept = heap.list(&[Value::Int(1), Value::Int(2)]).unwrap();
    heap.roots_mut().push(kept);
    for _ in 0..10 {
        heap.cons(Value::Nil, Value::Nil).unwrap();
    }
    let report = heap.collect();
    assert_eq!(report.freed(SlabClass::Pair), 10);
    assert_eq!(heap.usage(SlabClass::Pair).active, 2);
    assert_eq!(
        heap.list_to_vec(kept).unwrap(),
        vec![Value::Int(1), Value::Int(2)]
    );
}

#[test]
fn test_collector_handles_cycles() {
    let mut heap = tiny(64);

    let rooted = heap.cons(Value::Int(1), Value::Nil).unwrap();
    let Value::Pair(r) = rooted else { unreachable!() };
    heap.get_mut(r).unwrap().cdr = rooted;
    let mark = heap.roots_mut().push(rooted);

    let garbage = heap.cons(Value::Int(2), Value::Nil).unwrap();
    let Value::Pair(g) = garbage else { unreachable!() };
    heap.get_mut(g).unwrap().cdr = garbage;

    assert_eq!(heap.collect().freed(SlabClass::Pair), 1);
    assert_eq!(heap.get(r).unwrap().car, Value::Int(1));
    assert!(heap.get(g).is_err());

    heap.roots_mut().pop(mark);
    assert_eq!(heap.collect().freed(SlabClass::Pair), 1);
}

#[test]
fn test_collection_during_execution_keeps_live_data() {
    let mut config = HeapConfig::small();
    config.capacity.pairs = 64;
    let mut rt = Runtime::with_config(config).unwrap();
    let keep = rt.intern("keep").unwrap();
    let n = rt.intern("n").unwrap();
    let code = assemble(&mut rt, |b| {
        let top = b.label();
        let end = b.label();
        b.push_int(1).unwrap().push_int(2).unwrap().op_byte(Opcode::List, 2);
        b.def(keep).unwrap().op(Opcode::Drop);
        b.push_int(100).unwrap().def(n).unwrap().op(Opcode::Drop);
        b.bind(top).unwrap();
        b.get(n).unwrap().op(Opcode::ZeroPred);
        b.jump(Opcode::Jt, end).unwrap();
        b.push_int(1).unwrap().op(Opcode::PushNil).op(Opcode::Cons).op(Opcode::Drop);
        b.get(n).unwrap().push_int(-1).unwrap().op(Opcode::Add);
        b.set(n).unwrap().op(Opcode::Drop);
        b.jump(Opcode::Jmp, top).unwrap();
        b.bind(end).unwrap();
        b.get(keep).unwrap().op(Opcode::Ret);
    });
    let kept = rt.evaluate(code).unwrap();
    assert!(rt.heap().stats().cycles > 0);
    assert_eq!(
        rt.heap().list_to_vec(kept).unwrap(),
        vec![Value::Int(1), Value::Int(2)]
    );
}
