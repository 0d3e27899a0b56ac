//! Procedures: compiled lambdas and host functions.

use crate::error::{Error, ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::gc::object::{
    Arity, Closure, ClosureKind, ClosureRef, NativeFn, NativeFunction, NativeRef, SymbolRef,
    TreeRef,
};
use crate::gc::roots::Root;
use crate::runtime::value::Value;
use crate::runtime::{environment, tree};

/// Creates a lambda closing over `parent`.
///
/// `params` is a list of symbols, optionally improper with a rest symbol in
/// tail position, or a lone rest symbol. `docs` may be a documentation
/// string or a metadata tree; anything else is ignored.
pub fn lambda(
    heap: &mut Heap,
    parent: ClosureRef,
    name: Value,
    params: Value,
    docs: Value,
    body: Value,
) -> Result<ClosureRef> {
    let Value::Bytecode(text) = body else {
        return Err(heap.exception(
            ExceptionKind::TypeError,
            "lambda body must be a bytecode array",
            body,
        ));
    };
    let mut scope = heap.root_scope();
    scope.push(Root::Closure(parent));
    scope.push(params);
    scope.push(docs);
    scope.push(body);

    let meta = metadata(&mut scope, docs)?;
    if let Some(meta) = meta {
        scope.push(Root::Tree(meta));
    }
    let mut closure = Closure::new(Some(parent), ClosureKind::Lambda);
    closure.text = Some(text);
    closure.params = params;
    closure.meta = meta;
    closure.name = name.as_symbol();
    scope.allocate(closure)
}

fn metadata(heap: &mut Heap, docs: Value) -> Result<Option<TreeRef>> {
    match docs {
        Value::Tree(b) => Ok(heap.get(b)?.root),
        Value::String(_) => {
            let key = heap.well_known.documentation;
            tree::insert(heap, None, key, docs).map(Some)
        }
        _ => Ok(None),
    }
}

/// Creates the call frame for applying `callee` to the list `args`.
///
/// Parameters are bound positionally; a missing argument binds nil and
/// surplus arguments are dropped unless the parameter list ends in a rest
/// symbol, which receives the remaining list.
pub fn call_frame(heap: &mut Heap, args: Value, callee: ClosureRef) -> Result<ClosureRef> {
    let (text, mut params) = {
        let lambda = heap.get(callee)?;
        (lambda.text, lambda.params)
    };
    let mut scope = heap.root_scope();
    scope.push(args);
    scope.push(Root::Closure(callee));

    let mut frame = Closure::new(Some(callee), ClosureKind::Call);
    frame.text = text;
    let frame = scope.allocate(frame)?;
    scope.push(Root::Closure(frame));

    let mut rest = args;
    loop {
        match params {
            Value::Pair(p) => {
                let param = *scope.get(p)?;
                let Value::Symbol(sym) = param.car else {
                    return Err(scope.exception(
                        ExceptionKind::TypeError,
                        "parameter must be a symbol",
                        param.car,
                    ));
                };
                let value = scope.car(rest)?;
                rest = scope.cdr(rest)?;
                environment::define(&mut scope, frame, sym, value)?;
                params = param.cdr;
            }
            Value::Symbol(sym) => {
                environment::define(&mut scope, frame, sym, rest)?;
                break;
            }
            _ => break,
        }
    }
    Ok(frame)
}

/// Calls a host function.
///
/// Fixed-arity functions receive exactly their declared count: missing
/// arguments are padded with nil and extra arguments raise `arity-error`.
pub fn call_native(
    heap: &mut Heap,
    caller: ClosureRef,
    native: NativeRef,
    args: &[Value],
) -> Result<Value> {
    let (fp, arity) = {
        let native = heap.get(native)?;
        (native.fp, native.arity)
    };
    match arity {
        Arity::Variadic => fp(heap, caller, args),
        Arity::Fixed(n) if args.len() > n => {
            let args = heap.list(args)?;
            Err(heap.exception(ExceptionKind::ArityError, "too many arguments", args))
        }
        Arity::Fixed(n) if args.len() < n => {
            let mut padded = args.to_vec();
            padded.resize(n, Value::Nil);
            fp(heap, caller, &padded)
        }
        Arity::Fixed(_) => fp(heap, caller, args),
    }
}

/// Allocates a host function without binding it.
pub fn native(heap: &mut Heap, name: SymbolRef, arity: Arity, fp: NativeFn) -> Result<Value> {
    heap.allocate(NativeFunction {
        name,
        arity,
        fp,
        meta: None,
    })
    .map(Value::NativeFunc)
}

/// Binds a host function under `name` in `env`.
pub fn define_native(
    heap: &mut Heap,
    env: ClosureRef,
    name: &str,
    arity: Arity,
    fp: NativeFn,
) -> Result<Value> {
    let sym = heap.intern(name)?;
    let mut scope = heap.root_scope();
    scope.push(Root::Symbol(sym));
    let value = native(&mut scope, sym, arity, fp)?;
    scope.push(value);
    environment::define(&mut scope, env, sym, value)?;
    Ok(value)
}

/// Documentation attached to a lambda, macro or host function.
pub fn documentation(heap: &Heap, fun: Value) -> Result<Option<Value>> {
    let meta = match fun {
        Value::Lambda(c) | Value::Macro(c) => heap.get(c)?.meta,
        Value::NativeFunc(n) => heap.get(n)?.meta,
        _ => return Ok(None),
    };
    tree::get(heap, meta, heap.well_known.documentation)
}

/// Raises `type-error` for a value that cannot be applied.
pub(crate) fn not_applicable(heap: &mut Heap, fun: Value) -> Error {
    heap.exception(ExceptionKind::TypeError, "can't apply to following val", fun)
}
