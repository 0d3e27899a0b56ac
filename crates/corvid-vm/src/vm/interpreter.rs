//! The bytecode interpreter.

use std::rc::Rc;

use super::arith::{self, BitOp};
use crate::bytecode::disasm::decode;
use crate::bytecode::opcode::{Opcode, read_i16, read_u24};
use crate::error::{Error, ExceptionKind, Result};
use crate::gc::heap::Heap;
use crate::gc::object::{ArrayRef, BytecodeRef, Closure, ClosureKind, ClosureRef, NativeRef, SymbolRef};
use crate::runtime::context::Thread;
use crate::runtime::value::Value;
use crate::runtime::{environment, function};

/// Target of the instruction trace.
pub const TRACE_TARGET: &str = "corvid_vm::trace";

/// Runs `code` with `closure` as the base frame until it returns.
///
/// Each call registers a fresh [`Thread`] on the heap for the duration of
/// the run. Exceptions no try frame catches come back as
/// [`Error::Thrown`]; the heap and the caller's stacks are left as they
/// were on entry.
pub fn evaluate(heap: &mut Heap, closure: ClosureRef, code: BytecodeRef, trace: bool) -> Result<Value> {
    if heap.threads.len() >= heap.config().vm.max_nesting {
        return Err(heap.exception(
            ExceptionKind::TooDeep,
            "evaluator nesting too deep",
            Value::Nil,
        ));
    }
    let saved = {
        let base = heap.get(closure)?;
        (base.ip, base.sp, base.text)
    };
    let mark = heap.roots.mark();
    let thread = Thread::new(closure, code, &heap.config().vm);
    heap.threads.push(thread);
    tracing::trace!(nesting = heap.threads.len(), "evaluate");

    let result = Machine::new(heap, code, trace).and_then(|mut m| m.run());

    heap.threads.pop();
    heap.roots.pop(mark);
    if let Ok(base) = heap.get_mut(closure) {
        (base.ip, base.sp, base.text) = saved;
    }
    result
}

enum Flow {
    Continue,
    Return(Value),
}

/// Interpreter registers for the innermost [`Thread`].
///
/// Stack contents live on the heap's thread so the collector can see them;
/// only the decoded view of the current code is cached here.
struct Machine<'h> {
    heap: &'h mut Heap,
    ops: Rc<[u8]>,
    literals: ArrayRef,
    ip: usize,
    trace: bool,
    /// Collector cycle count at the last interrupt check
    cycles: u64,
}

impl<'h> Machine<'h> {
    fn new(heap: &'h mut Heap, code: BytecodeRef, trace: bool) -> Result<Self> {
        let bytecode = heap.get(code)?;
        let ops = Rc::clone(&bytecode.ops);
        let literals = bytecode.literals;
        let cycles = heap.stats.cycles;
        Ok(Self {
            heap,
            ops,
            literals,
            ip: 0,
            trace,
            cycles,
        })
    }

    fn run(&mut self) -> Result<Value> {
        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return(value)) => return Ok(value),
                Err(Error::Thrown(exception)) => self.unwind(exception)?,
                Err(err) => return Err(err),
            }
        }
    }

    // Stack access

    fn thread(&mut self) -> Result<&mut Thread> {
        self.heap
            .threads
            .last_mut()
            .ok_or_else(|| Error::corrupted("no running thread"))
    }

    fn current(&self) -> Result<ClosureRef> {
        self.heap
            .threads
            .last()
            .and_then(|t| t.closures.last().copied())
            .ok_or_else(|| Error::corrupted("closure stack is empty"))
    }

    fn push(&mut self, value: Value) -> Result<()> {
        self.thread()?.values.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        match self.thread()?.values.pop() {
            Some(value) => Ok(value),
            None => Err(self.underflow()),
        }
    }

    fn peek(&mut self) -> Result<Value> {
        match self.thread()?.values.last().copied() {
            Some(value) => Ok(value),
            None => Err(self.underflow()),
        }
    }

    fn replace_top(&mut self, f: impl FnOnce(&mut Heap, Value) -> Result<Value>) -> Result<()> {
        let top = self.peek()?;
        let value = f(self.heap, top)?;
        if let Some(slot) = self.thread()?.values.last_mut() {
            *slot = value;
        }
        Ok(())
    }

    fn binary(&mut self, f: impl FnOnce(&mut Heap, Value, Value) -> Result<Value>) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let value = f(self.heap, a, b)?;
        self.push(value)
    }

    fn underflow(&mut self) -> Error {
        self.heap.exception(
            ExceptionKind::StackUnderflow,
            "value stack underflow",
            Value::Nil,
        )
    }

    fn raise(&mut self, kind: ExceptionKind, message: &str, irritant: Value) -> Error {
        self.heap.exception(kind, message, irritant)
    }

    // Code access

    fn load(&mut self, code: BytecodeRef) -> Result<()> {
        let bytecode = self.heap.get(code)?;
        self.ops = Rc::clone(&bytecode.ops);
        self.literals = bytecode.literals;
        self.thread()?.text = code;
        Ok(())
    }

    fn literal(&self, index: u32) -> Result<Value> {
        self.heap
            .get(self.literals)?
            .items
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::bytecode(format!("literal #{} out of range", index)))
    }

    fn literal_at(&self, at: usize) -> Result<Value> {
        let index = read_u24(&self.ops, at).ok_or_else(|| Error::bytecode("truncated operand"))?;
        self.literal(index)
    }

    fn symbol_at(&mut self, at: usize) -> Result<SymbolRef> {
        match self.literal_at(at)? {
            Value::Symbol(sym) => Ok(sym),
            other => Err(self.raise(ExceptionKind::TypeError, "expected a symbol", other)),
        }
    }

    fn byte_at(&self, at: usize) -> Result<u8> {
        self.ops
            .get(at)
            .copied()
            .ok_or_else(|| Error::bytecode("truncated operand"))
    }

    fn target_at(&self, at: usize) -> Result<usize> {
        let offset = read_i16(&self.ops, at + 1).ok_or_else(|| Error::bytecode("truncated jump"))?;
        at.checked_add_signed(isize::from(offset))
            .ok_or_else(|| Error::bytecode(format!("jump at {:#x} before start of code", at)))
    }

    fn check_interrupt(&mut self) -> Result<()> {
        if self.heap.take_interrupt() {
            return Err(self.raise(ExceptionKind::Interrupt, "interrupted", Value::Nil));
        }
        Ok(())
    }

    // Frames

    /// Records where the current frame resumes once control comes back.
    fn save_state(&mut self, ip: usize, sp: usize) -> Result<()> {
        let current = self.current()?;
        let text = self.thread()?.text;
        let closure = self.heap.get_mut(current)?;
        closure.ip = ip;
        closure.sp = sp;
        closure.text = Some(text);
        Ok(())
    }

    /// Resumes the frame at the top of the closure stack.
    fn restore_state(&mut self) -> Result<()> {
        let current = self.current()?;
        let (ip, sp, text) = {
            let closure = self.heap.get(current)?;
            (closure.ip, closure.sp, closure.text)
        };
        let text = text.ok_or_else(|| Error::corrupted("resumed frame has no code"))?;
        self.thread()?.values.truncate(sp);
        self.load(text)?;
        self.ip = ip;
        Ok(())
    }

    fn push_frame(&mut self, frame: ClosureRef) -> Result<()> {
        let max = self.heap.config().vm.max_frames;
        if self.thread()?.csp() >= max {
            return Err(self.raise(ExceptionKind::TooDeep, "closure stack overflow", Value::Nil));
        }
        let mark = self.heap.roots.mark();
        self.heap.get_mut(frame)?.root_mark = mark;
        let thread = self.thread()?;
        thread.closures.push(frame);
        thread.ensure_headroom();
        Ok(())
    }

    /// Pops every frame above index `k`, then frame `k` itself, rewinding
    /// the root stack to where it stood when that frame was pushed.
    fn pop_frames_to(&mut self, k: usize) -> Result<ClosureRef> {
        let frame = self.thread()?.closures[k];
        let mark = self.heap.get(frame)?.root_mark;
        self.thread()?.closures.truncate(k);
        self.heap.roots.pop(mark);
        Ok(frame)
    }

    /// Index of the innermost frame of `kind`, never the base frame.
    fn find_frame(&self, kind: ClosureKind) -> Result<Option<usize>> {
        let heap: &Heap = self.heap;
        let thread = heap
            .threads
            .last()
            .ok_or_else(|| Error::corrupted("no running thread"))?;
        for (k, frame) in thread.closures.iter().enumerate().skip(1).rev() {
            if heap.get(*frame)?.kind == kind {
                return Ok(Some(k));
            }
        }
        Ok(None)
    }

    // Calls

    /// Enters `callee` with the argument list `args`. The caller resumes at
    /// the current `ip` with its value stack cut back to `base`.
    fn enter(&mut self, callee: ClosureRef, args: Value, base: usize) -> Result<()> {
        let frame = function::call_frame(self.heap, args, callee)?;
        let text = self
            .heap
            .get(frame)?
            .text
            .ok_or_else(|| Error::corrupted("procedure has no code"))?;
        self.save_state(self.ip, base)?;
        self.push_frame(frame)?;
        self.thread()?.values.truncate(base);
        self.load(text)?;
        self.ip = 0;
        Ok(())
    }

    fn call_native(&mut self, native: NativeRef, args: &[Value], base: usize) -> Result<()> {
        let caller = self.current()?;
        let result = function::call_native(self.heap, caller, native, args)?;
        self.thread()?.values.truncate(base);
        self.push(result)
    }

    /// `apply`: the function sits below its `argc` arguments.
    fn apply_stack(&mut self, argc: usize) -> Result<()> {
        let sp = self.thread()?.sp();
        if sp < argc + 1 {
            return Err(self.underflow());
        }
        let base = sp - argc - 1;
        let (fun, args) = {
            let values = &self.thread()?.values;
            (values[base], values[base + 1..].to_vec())
        };
        match fun {
            Value::Lambda(c) | Value::Macro(c) => {
                let list = self.heap.list(&args)?;
                self.push(list)?;
                self.enter(c, list, base)
            }
            Value::NativeFunc(n) => self.call_native(n, &args, base),
            other => Err(function::not_applicable(self.heap, other)),
        }
    }

    /// `apply/collection`: the function and an argument list.
    fn apply_list(&mut self) -> Result<()> {
        let sp = self.thread()?.sp();
        if sp < 2 {
            return Err(self.underflow());
        }
        let base = sp - 2;
        let (fun, list) = {
            let values = &self.thread()?.values;
            (values[base], values[base + 1])
        };
        match fun {
            Value::Lambda(c) | Value::Macro(c) => self.enter(c, list, base),
            Value::NativeFunc(n) => {
                let args = self.heap.list_to_vec(list)?;
                self.call_native(n, &args, base)
            }
            other => Err(function::not_applicable(self.heap, other)),
        }
    }

    fn ret(&mut self) -> Result<Flow> {
        let value = self.peek()?;
        let Some(k) = self.find_frame(ClosureKind::Call)? else {
            return Ok(Flow::Return(value));
        };
        self.pop_frames_to(k)?;
        self.restore_state()?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    // Exceptions

    /// Transfers control to the innermost try frame's handler.
    ///
    /// Returns the exception as an error when no try frame is active, and
    /// keeps unwinding when the handler itself throws.
    fn unwind(&mut self, mut exception: Value) -> Result<()> {
        loop {
            let trace = {
                let mut scope = self.heap.root_scope();
                scope.push(exception);
                stack_trace(&mut scope)?
            };
            self.heap.attach_trace(exception, trace)?;

            let Some(k) = self.find_frame(ClosureKind::Try)? else {
                return Err(Error::Thrown(exception));
            };
            let frame = self.pop_frames_to(k)?;
            let handler = self.heap.get(frame)?.handler;
            self.restore_state()?;
            if self.trace {
                tracing::trace!(
                    target: TRACE_TARGET,
                    resume = self.ip,
                    exception = %exception.display(self.heap),
                    "caught"
                );
            }

            match self.invoke_handler(handler, exception) {
                Ok(()) => return Ok(()),
                Err(Error::Thrown(next)) => exception = next,
                Err(err) => return Err(err),
            }
        }
    }

    fn invoke_handler(&mut self, handler: Value, exception: Value) -> Result<()> {
        let base = self.thread()?.sp();
        self.push(handler)?;
        self.push(exception)?;
        match handler {
            Value::Lambda(c) => {
                let list = self.heap.list(&[exception])?;
                self.push(list)?;
                self.enter(c, list, base)
            }
            Value::NativeFunc(n) => self.call_native(n, &[exception], base),
            other => Err(function::not_applicable(self.heap, other)),
        }
    }

    // Dispatch

    fn trace_instruction(&mut self, at: usize) {
        let Ok(inst) = decode(&self.ops, at) else {
            return;
        };
        let heap: &Heap = self.heap;
        let Some(thread) = heap.threads.last() else {
            return;
        };
        let top = thread.values.last().copied().unwrap_or(Value::Nil);
        tracing::trace!(
            target: TRACE_TARGET,
            sp = thread.sp(),
            csp = thread.csp(),
            top = %top.display(heap),
            "{}",
            inst
        );
    }

    fn step(&mut self) -> Result<Flow> {
        // Any cycle since the last step counts, including ones run by a
        // failed allocation or a native.
        self.heap.collect_if_necessary();
        if self.heap.stats.cycles != self.cycles {
            self.cycles = self.heap.stats.cycles;
            self.check_interrupt()?;
        }

        let at = self.ip;
        let Some(&byte) = self.ops.get(at) else {
            return Err(self.raise(
                ExceptionKind::NoReturn,
                "code ended without a return",
                Value::Int(at as i64),
            ));
        };
        let op = match Opcode::try_from(byte) {
            Ok(op) => op,
            Err(byte) => {
                self.ip = at + 1;
                return Err(self.raise(
                    ExceptionKind::UnknownOpcode,
                    "unknown opcode",
                    Value::Int(i64::from(byte)),
                ));
            }
        };
        if at + op.encoded_len() > self.ops.len() {
            return Err(Error::bytecode(format!(
                "{} at {:#x} is truncated",
                op.mnemonic(),
                at
            )));
        }
        if self.trace {
            self.trace_instruction(at);
        }
        self.ip = at + op.encoded_len();

        match op {
            Opcode::Nop => {}
            Opcode::Ret => return self.ret(),
            Opcode::PushIntByte => {
                let n = self.byte_at(at + 1)? as i8;
                self.push(Value::Int(i64::from(n)))?;
            }
            Opcode::IntAdd => self.binary(arith::int_add)?,
            Opcode::Apply => {
                let argc = self.byte_at(at + 1)?;
                self.apply_stack(usize::from(argc))?;
            }
            Opcode::Get => {
                let sym = self.symbol_at(at + 1)?;
                let closure = self.current()?;
                let value = environment::get(self.heap, closure, sym)?;
                self.push(value)?;
            }
            Opcode::PushLiteral => {
                let value = self.literal_at(at + 1)?;
                self.push(value)?;
            }
            Opcode::Def => {
                let sym = self.symbol_at(at + 1)?;
                let value = self.peek()?;
                let closure = self.current()?;
                environment::define(self.heap, closure, sym, value)?;
            }
            Opcode::Set => {
                let sym = self.symbol_at(at + 1)?;
                let value = self.peek()?;
                let closure = self.current()?;
                if !environment::set(self.heap, closure, sym, value)? {
                    return Err(self.raise(
                        ExceptionKind::UnboundVariable,
                        "can't set unbound symbol",
                        Value::Symbol(sym),
                    ));
                }
            }
            Opcode::Jmp => {
                let target = self.target_at(at)?;
                self.jump(at, target)?;
            }
            Opcode::Jt | Opcode::Jf => {
                let target = self.target_at(at)?;
                let cond = self.pop()?.is_truthy();
                if cond == (op == Opcode::Jt) {
                    self.jump(at, target)?;
                }
            }
            Opcode::Dup => {
                let top = self.peek()?;
                self.push(top)?;
            }
            Opcode::Drop => {
                self.pop()?;
            }
            Opcode::Car => self.replace_top(|heap, v| heap.car(v))?,
            Opcode::Cdr => self.replace_top(|heap, v| heap.cdr(v))?,
            Opcode::Cadr => self.replace_top(|heap, v| {
                let rest = heap.cdr(v)?;
                heap.car(rest)
            })?,
            Opcode::ClosurePush => {
                let closure = self.current()?;
                self.push(Value::Environment(closure))?;
            }
            Opcode::Cons => self.binary(|heap, a, b| heap.cons(a, b))?,
            Opcode::Let => {
                let parent = self.current()?;
                let frame = self
                    .heap
                    .allocate(Closure::new(Some(parent), ClosureKind::Let))?;
                self.push_frame(frame)?;
            }
            Opcode::ClosurePop => {
                let csp = self.thread()?.csp();
                if csp <= 1 {
                    return Err(self.raise(
                        ExceptionKind::StackUnderflow,
                        "closure stack underflow",
                        Value::Nil,
                    ));
                }
                self.pop_frames_to(csp - 1)?;
            }
            Opcode::Fn | Opcode::Macro => {
                let name = self.literal_at(at + 1)?;
                let params = self.literal_at(at + 4)?;
                let docs = self.literal_at(at + 7)?;
                let body = self.literal_at(at + 10)?;
                let parent = self.current()?;
                let closure = function::lambda(self.heap, parent, name, params, docs, body)?;
                self.push(if op == Opcode::Fn {
                    Value::Lambda(closure)
                } else {
                    Value::Macro(closure)
                })?;
            }
            Opcode::Try => {
                let resume = self.target_at(at)?;
                let handler = self.pop()?;
                let sp = self.thread()?.sp();
                self.save_state(resume, sp)?;
                let parent = self.current()?;
                let mut frame = Closure::new(Some(parent), ClosureKind::Try);
                frame.handler = handler;
                let frame = self.heap.allocate(frame)?;
                self.push_frame(frame)?;
            }
            Opcode::PushTrue => self.push(Value::Bool(true))?,
            Opcode::PushFalse => self.push(Value::Bool(false))?,
            Opcode::PushNil => self.push(Value::Nil)?,
            Opcode::Eval => {
                let env = self.pop()?;
                let code = self.pop()?;
                let (Value::Environment(env), Value::Bytecode(code)) = (env, code) else {
                    return Err(self.raise(ExceptionKind::TypeError, "can't eval in that", env));
                };
                let sp = self.thread()?.sp();
                self.save_state(self.ip, sp)?;
                let mut frame = Closure::new(Some(env), ClosureKind::Call);
                frame.text = Some(code);
                let frame = self.heap.allocate(frame)?;
                self.push_frame(frame)?;
                self.load(code)?;
                self.ip = 0;
            }
            Opcode::Lt | Opcode::Le | Opcode::Ge | Opcode::Gt => {
                self.binary(|heap, a, b| {
                    let ordering = arith::compare(heap, a, b)?;
                    Ok(Value::Bool(ordering.is_some_and(|o| match op {
                        Opcode::Lt => o.is_lt(),
                        Opcode::Le => o.is_le(),
                        Opcode::Ge => o.is_ge(),
                        _ => o.is_gt(),
                    })))
                })?;
            }
            Opcode::Eq => self.binary(|heap, a, b| Ok(Value::Bool(arith::equal(heap, a, b))))?,
            Opcode::Ne => self.binary(|heap, a, b| Ok(Value::Bool(!arith::equal(heap, a, b))))?,
            Opcode::IncInt => self.replace_top(arith::inc_int)?,
            Opcode::Add => self.binary(arith::add)?,
            Opcode::Sub => self.binary(arith::sub)?,
            Opcode::Mul => self.binary(arith::mul)?,
            Opcode::Div => self.binary(arith::div)?,
            Opcode::Rem => self.binary(arith::rem)?,
            Opcode::ZeroPred => self.replace_top(|_, v| Ok(Value::Bool(arith::is_zero(v))))?,
            Opcode::List => {
                let n = usize::from(self.byte_at(at + 1)?);
                let sp = self.thread()?.sp();
                if sp < n {
                    return Err(self.underflow());
                }
                let items = self.thread()?.values[sp - n..].to_vec();
                let list = self.heap.list(&items)?;
                self.thread()?.values.truncate(sp - n);
                self.push(list)?;
            }
            Opcode::Throw => {
                let value = self.pop()?;
                let exception = self.heap.as_exception(value)?;
                return Err(Error::Thrown(exception));
            }
            Opcode::ApplyCollection => self.apply_list()?,
            Opcode::Shl => self.binary(|heap, a, b| arith::bits(heap, BitOp::Shl, a, b))?,
            Opcode::Shr => self.binary(|heap, a, b| arith::bits(heap, BitOp::Shr, a, b))?,
            Opcode::BitAnd => self.binary(|heap, a, b| arith::bits(heap, BitOp::And, a, b))?,
            Opcode::BitOr => self.binary(|heap, a, b| arith::bits(heap, BitOp::Or, a, b))?,
            Opcode::BitXor => self.binary(|heap, a, b| arith::bits(heap, BitOp::Xor, a, b))?,
            Opcode::BitNot => self.replace_top(arith::bit_not)?,
        }
        Ok(Flow::Continue)
    }

    fn jump(&mut self, at: usize, target: usize) -> Result<()> {
        self.ip = target;
        if target <= at {
            self.check_interrupt()?;
        }
        Ok(())
    }
}

/// Lambdas of the innermost thread's call frames, innermost first.
fn stack_trace(heap: &mut Heap) -> Result<Value> {
    let mut lambdas = Vec::new();
    if let Some(thread) = heap.threads.last() {
        for frame in thread.closures.iter().rev() {
            let frame = heap.get(*frame)?;
            if frame.kind != ClosureKind::Call {
                continue;
            }
            if let Some(parent) = frame.parent {
                if heap.get(parent)?.kind == ClosureKind::Lambda {
                    lambdas.push(Value::Lambda(parent));
                }
            }
        }
    }
    heap.list(&lambdas)
}
